//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod aliases;
pub mod config;
pub mod error;
pub mod ledger;
pub mod maintenance;
pub mod sshd_config;
pub mod validate;

pub use config::{HostprepConfig, validate_config};
pub use error::{ConfigError, StepError, ValidationError};
pub use ledger::{RollbackLedger, Snapshot};
pub use sshd_config::SshdConfig;
pub use validate::{AuthMode, ProvisionRequest, SetupArgs};

/// Lowercase hex encoding of a digest.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
