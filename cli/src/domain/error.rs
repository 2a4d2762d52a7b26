//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Validation errors ─────────────────────────────────────────────────────────

/// Printed on stdout when `setup` is invoked incorrectly or without root.
pub const SETUP_USAGE: &str =
    "Usage: hostprep setup <username> [public_key] [ssh_port] [add_to_sudo]";

/// Pre-flight rejections. Nothing on the host has been touched when one of
/// these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("This command must be run as root (try: sudo hostprep ...)")]
    Privilege,

    #[error("A username is required")]
    Usage,

    #[error("Invalid username '{0}': must match ^[a-z_][a-z0-9_-]*$")]
    InvalidUsername(String),

    #[error("User '{0}' already exists.")]
    DuplicateAccount(String),

    #[error("Invalid port '{0}': must be a number between 1 and 65535")]
    InvalidPort(String),

    #[error("Port {0} is reserved for another well-known service. Choose a different SSH port.")]
    RestrictedPort(u16),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl ValidationError {
    /// Whether the caller should be shown the command synopsis.
    #[must_use]
    pub fn wants_usage(&self) -> bool {
        matches!(self, Self::Usage | Self::Privilege)
    }
}

// ── Provisioning errors ───────────────────────────────────────────────────────

/// In-flight failures raised by a mutation step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("sshd configuration check failed:\n{0}")]
    InvalidDaemonConfig(String),

    #[error("SSH service is not active after restart (checked: {0})")]
    ServiceRestartFailed(String),

    #[error("could not restart SSH service (tried: {0})")]
    RestartFailed(String),

    #[error("{step}: {source:#}")]
    Host {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl StepError {
    /// Wrap an infrastructure failure with the name of the step it broke.
    #[must_use]
    pub fn host(step: &'static str, source: anyhow::Error) -> Self {
        Self::Host { step, source }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to the hostprep configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}\n\nExpected: {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}
