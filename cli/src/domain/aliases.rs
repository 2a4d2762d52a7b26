//! Operator shell aliases and the managed block that installs them.

pub const BLOCK_BEGIN: &str = "# >>> hostprep aliases >>>";
pub const BLOCK_END: &str = "# <<< hostprep aliases <<<";

/// `(name, command)` pairs, in the order they are written.
pub const ALIASES: &[(&str, &str)] = &[
    ("ll", "ls -alF"),
    ("la", "ls -A"),
    ("l", "ls -CF"),
    ("ports", "ss -tulpn"),
    ("dps", "docker ps --format 'table {{.Names}}\\t{{.Status}}\\t{{.Ports}}'"),
    ("jlog", "journalctl -xe --no-pager | tail -n 100"),
    ("failed", "systemctl --failed --no-legend"),
    ("update", "sudo apt-get update && sudo apt-get -y upgrade"),
];

/// Quotes `value` for a POSIX shell single-quoted string.
fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `alias name='command'` lines, one per alias.
#[must_use]
pub fn render_aliases() -> String {
    ALIASES
        .iter()
        .map(|(name, cmd)| format!("alias {name}={}\n", single_quote(cmd)))
        .collect()
}

/// The aliases wrapped in begin/end markers.
#[must_use]
pub fn render_block() -> String {
    format!("{BLOCK_BEGIN}\n{}{BLOCK_END}\n", render_aliases())
}

/// Returns `existing` with the managed block replaced (or appended when
/// absent). Text outside the markers is preserved.
#[must_use]
pub fn install_block(existing: &str) -> String {
    let block = render_block();
    let span = existing
        .find(BLOCK_BEGIN)
        .and_then(|start| existing[start..].find(BLOCK_END).map(|rel| (start, rel)));
    if let Some((start, end_rel)) = span {
        let mut end = start + end_rel + BLOCK_END.len();
        if existing[end..].starts_with('\n') {
            end += 1;
        }
        return format!("{}{block}{}", &existing[..start], &existing[end..]);
    }
    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    out
}
