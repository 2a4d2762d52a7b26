//! Pure input validation for `hostprep setup`: no I/O, no async.
//!
//! The host-dependent checks (root privilege, existing account) live in
//! `application::services::provision::validate`; everything decidable from the
//! arguments alone is here.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::ValidationError;

/// Login names accepted by `adduser` with its default `NAME_REGEX`.
pub static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern, cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z_][a-z0-9_-]*$").expect("valid regex")
});

/// Ports that belong to other well-known services and must not host sshd.
pub const RESTRICTED_PORTS: &[u16] = &[
    20, 21, 23, 25, 53, 80, 110, 143, 443, 465, 587, 993, 995, 3306, 5432, 6379, 27017,
];

/// Spellings of "yes" accepted for the sudo flag (compared case-insensitively).
pub const TRUTHY_FLAGS: &[&str] = &["yes", "true", "1", "y"];

/// Key type prefixes understood by OpenSSH `authorized_keys`.
const KEY_TYPE_PREFIXES: &[&str] = &["ssh-", "ecdsa-", "sk-"];

/// How the new account authenticates over SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Public-key only; the account has no usable password.
    Key,
    /// Password set interactively at creation time.
    Password,
}

/// Raw positional arguments of `hostprep setup`.
#[derive(Debug, Clone, Default)]
pub struct SetupArgs {
    pub username: String,
    pub public_key: Option<String>,
    pub ssh_port: Option<String>,
    pub add_to_sudo: Option<String>,
}

/// A validated, normalized provisioning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub username: String,
    /// Trimmed public key; `Some` exactly when `auth == AuthMode::Key`.
    pub public_key: Option<String>,
    pub port: Option<u16>,
    pub sudo: bool,
    pub auth: AuthMode,
}

impl ProvisionRequest {
    /// Passwordless sudo is only granted to key-only accounts that asked for
    /// sudo; a password account never gets it.
    #[must_use]
    pub fn grants_passwordless_sudo(&self) -> bool {
        self.sudo && self.auth == AuthMode::Key
    }
}

/// Validates a login name.
///
/// # Errors
///
/// Returns `Usage` for an empty name and `InvalidUsername` when the name does
/// not match [`USERNAME_RE`].
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Usage);
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

/// Parses and checks an SSH port argument.
///
/// # Errors
///
/// Returns `InvalidPort` for anything that is not an integer in `1..=65535`
/// and `RestrictedPort` for ports in [`RESTRICTED_PORTS`].
pub fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    let trimmed = raw.trim();
    let invalid = || ValidationError::InvalidPort(raw.to_string());
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let port: u16 = trimmed.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    if RESTRICTED_PORTS.contains(&port) {
        return Err(ValidationError::RestrictedPort(port));
    }
    Ok(port)
}

/// Normalizes the sudo flag; anything outside [`TRUTHY_FLAGS`] means "no".
#[must_use]
pub fn parse_sudo_flag(raw: Option<&str>) -> bool {
    raw.map(str::trim)
        .is_some_and(|v| TRUTHY_FLAGS.iter().any(|t| t.eq_ignore_ascii_case(v)))
}

/// Key-based when a non-empty key was supplied, password-based otherwise.
#[must_use]
pub fn auth_mode(public_key: Option<&str>) -> AuthMode {
    match public_key.map(str::trim) {
        Some(k) if !k.is_empty() => AuthMode::Key,
        _ => AuthMode::Password,
    }
}

/// Checks that a public key is a single `authorized_keys` entry.
///
/// # Errors
///
/// Returns `InvalidPublicKey` when the key spans several lines, does not start
/// with a known key type, or has no key material after the type.
pub fn validate_public_key(key: &str) -> Result<(), ValidationError> {
    if key.contains(['\n', '\r']) {
        return Err(ValidationError::InvalidPublicKey(
            "key must be a single line".to_string(),
        ));
    }
    let mut fields = key.split_whitespace();
    let key_type = fields.next().unwrap_or_default();
    if !KEY_TYPE_PREFIXES.iter().any(|p| key_type.starts_with(p)) {
        return Err(ValidationError::InvalidPublicKey(format!(
            "unsupported key type '{key_type}'"
        )));
    }
    if fields.next().is_none() {
        return Err(ValidationError::InvalidPublicKey(
            "key has no key material".to_string(),
        ));
    }
    Ok(())
}

/// Runs every argument-only check and builds the request.
///
/// Order: username presence, username syntax, public key, port.
///
/// # Errors
///
/// Returns the first `ValidationError` encountered.
pub fn validate_args(args: &SetupArgs) -> Result<ProvisionRequest, ValidationError> {
    validate_username(&args.username)?;

    let auth = auth_mode(args.public_key.as_deref());
    let public_key = match auth {
        AuthMode::Key => {
            let key = args.public_key.as_deref().unwrap_or_default().trim();
            validate_public_key(key)?;
            Some(key.to_string())
        }
        AuthMode::Password => None,
    };

    let port = match args.ssh_port.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_port(raw)?),
        _ => None,
    };

    Ok(ProvisionRequest {
        username: args.username.clone(),
        public_key,
        port,
        sudo: parse_sudo_flag(args.add_to_sudo.as_deref()),
        auth,
    })
}
