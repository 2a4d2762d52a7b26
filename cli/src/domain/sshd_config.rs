//! Structured model of an `sshd_config` document.
//!
//! Every line is kept verbatim so an untouched document renders byte-for-byte
//! identical. Edits only touch the global section: anything from the first
//! `Match` line onward applies conditionally and is left alone.

/// Directives hostprep rewrites.
pub const PASSWORD_AUTHENTICATION: &str = "PasswordAuthentication";
pub const PERMIT_ROOT_LOGIN: &str = "PermitRootLogin";
pub const PORT: &str = "Port";

/// What a single line of the document holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Blank line or free-form comment.
    Other,
    /// `Key value`, in force.
    Active { key: String, value: String },
    /// `#Key value`, a directive that has been commented out.
    Commented { key: String, value: String },
}

/// One line of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub raw: String,
    pub kind: LineKind,
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        let kind = if let Some(rest) = trimmed.strip_prefix('#') {
            match split_directive(rest) {
                Some((key, value)) => LineKind::Commented { key, value },
                None => LineKind::Other,
            }
        } else {
            match split_directive(trimmed) {
                Some((key, value)) => LineKind::Active { key, value },
                None => LineKind::Other,
            }
        };
        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    fn directive(key: &str, value: &str) -> Self {
        Self {
            raw: format!("{key} {value}"),
            kind: LineKind::Active {
                key: key.to_string(),
                value: value.to_string(),
            },
        }
    }

    fn key(&self) -> Option<&str> {
        match &self.kind {
            LineKind::Active { key, .. } | LineKind::Commented { key, .. } => Some(key),
            LineKind::Other => None,
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.kind, LineKind::Active { .. })
    }

    /// `#Key value` or `# Key value` for this particular key. Prose after
    /// `# ` only counts when it starts with the key itself.
    fn comments_out(&self, key: &str) -> bool {
        if let LineKind::Commented { key: k, .. } = &self.kind {
            return k.eq_ignore_ascii_case(key);
        }
        let Some(rest) = self.raw.trim_start().strip_prefix('#') else {
            return false;
        };
        let rest = rest.trim_start();
        rest.get(..key.len()).is_some_and(|head| head.eq_ignore_ascii_case(key))
            && split_directive(rest).is_some_and(|(k, _)| k.len() == key.len())
    }

    fn is_match_block(&self) -> bool {
        self.is_active() && self.key().is_some_and(|k| k.eq_ignore_ascii_case("Match"))
    }
}

/// Splits `Key value` / `Key=value`. The key must start the text and be a
/// single alphanumeric word, so `#Port 22` is a commented directive while
/// `# This is the sshd server` is prose.
fn split_directive(text: &str) -> Option<(String, String)> {
    let text = text.trim_end();
    let end = text.find(|c: char| c.is_whitespace() || c == '=')?;
    let key = &text[..end];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let value = text[end..]
        .trim_start()
        .strip_prefix('=')
        .unwrap_or_else(|| text[end..].trim_start())
        .trim();
    if value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Parsed `sshd_config`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SshdConfig {
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl SshdConfig {
    /// Parses a document. Never fails: unknown lines are carried as `Other`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trailing_newline = text.is_empty() || text.ends_with('\n');
        let lines = text.lines().map(Line::parse).collect();
        Self {
            lines,
            trailing_newline,
        }
    }

    /// Serializes the document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(|l| l.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Index of the first `Match` line, or the end of the document.
    fn global_end(&self) -> usize {
        self.lines
            .iter()
            .position(Line::is_match_block)
            .unwrap_or(self.lines.len())
    }

    /// Active value of `key` in the global section.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines[..self.global_end()].iter().find_map(|l| match &l.kind {
            LineKind::Active { key: k, value } if k.eq_ignore_ascii_case(key) => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    /// Number of active `key` lines in the global section.
    #[must_use]
    pub fn active_count(&self, key: &str) -> usize {
        self.lines[..self.global_end()]
            .iter()
            .filter(|l| l.is_active() && l.key().is_some_and(|k| k.eq_ignore_ascii_case(key)))
            .count()
    }

    /// Sets `key` to `value` in the global section.
    ///
    /// Rewrites the first active directive in place (dropping any later active
    /// duplicates), else the first commented-out one, else inserts a new line
    /// just before the first `Match` block.
    pub fn set(&mut self, key: &str, value: &str) {
        let end = self.global_end();
        let matches_key =
            |l: &Line| l.key().is_some_and(|k| k.eq_ignore_ascii_case(key));

        let active: Vec<usize> = (0..end)
            .filter(|&i| self.lines[i].is_active() && matches_key(&self.lines[i]))
            .collect();

        if let Some((&first, rest)) = active.split_first() {
            self.lines[first] = Line::directive(key, value);
            for &i in rest.iter().rev() {
                self.lines.remove(i);
            }
            return;
        }

        if let Some(i) = (0..end).find(|&i| self.lines[i].comments_out(key)) {
            self.lines[i] = Line::directive(key, value);
            return;
        }

        self.lines.insert(end, Line::directive(key, value));
    }
}
