//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`: never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;

use crate::domain::{AuthMode, HostprepConfig};

// ── Host Port Traits ──────────────────────────────────────────────────────────

/// Effective privilege of the running process.
#[allow(async_fn_in_trait)]
pub trait PrivilegeProbe {
    /// `true` when running with uid 0.
    async fn is_root(&self) -> Result<bool>;
}

/// Local account database operations.
#[allow(async_fn_in_trait)]
pub trait AccountManager {
    /// Whether an account named `username` exists.
    async fn exists(&self, username: &str) -> Result<bool>;
    /// Create the account with a home directory.
    ///
    /// `AuthMode::Key` creates it without a usable password;
    /// `AuthMode::Password` prompts for one on the controlling terminal.
    async fn create(&self, username: &str, auth: AuthMode) -> Result<()>;
    /// Append the account to a supplementary group.
    async fn add_to_group(&self, username: &str, group: &str) -> Result<()>;
    /// Home directory recorded in the account database.
    async fn home_dir(&self, username: &str) -> Result<PathBuf>;
    /// Give `path` and everything below it to `username`.
    async fn chown_recursive(&self, path: &Path, username: &str) -> Result<()>;
    /// Remove the account and its home directory.
    async fn remove(&self, username: &str) -> Result<()>;
}

/// Service manager operations on named units.
#[allow(async_fn_in_trait)]
pub trait ServiceManager {
    /// Reload unit files.
    async fn daemon_reload(&self) -> Result<()>;
    /// Restart a unit. Fails when the manager reports an error.
    async fn restart(&self, unit: &str) -> Result<()>;
    /// Whether the unit is currently active.
    async fn is_active(&self, unit: &str) -> Result<bool>;
    /// Whether a unit file with this name is installed.
    async fn unit_exists(&self, unit: &str) -> Result<bool>;
}

/// Outcome of the daemon's own configuration syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCheck {
    Valid,
    /// Diagnostic text reported by the checker.
    Invalid(String),
}

/// The SSH daemon's built-in configuration checker.
#[allow(async_fn_in_trait)]
pub trait DaemonConfigChecker {
    /// Check the configuration file at `path`.
    async fn check_config(&self, path: &Path) -> Result<ConfigCheck>;
}

/// Composite trait: everything provisioning needs from the host.
pub trait HostSystem: PrivilegeProbe + AccountManager + ServiceManager + DaemonConfigChecker {}

/// Blanket implementation: any type implementing all four sub-traits is a `HostSystem`.
impl<T> HostSystem for T where
    T: PrivilegeProbe + AccountManager + ServiceManager + DaemonConfigChecker
{
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with inherited stdio and return only its exit status.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<std::process::ExitStatus>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Filesystem Port ───────────────────────────────────────────────────────────

/// Abstracts the host files provisioning and maintenance touch.
pub trait HostFs {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write `content`, creating or truncating the file.
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    /// Replace `path` atomically, keeping its current permission bits.
    fn replace(&self, path: &Path, content: &str) -> Result<()>;
    /// Copy `from` to `to`, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;
    /// Hex SHA-256 of the file contents.
    fn sha256(&self, path: &Path) -> Result<String>;
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Abstracts loading of the hostprep configuration file.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults when the file is absent.
    fn load(&self) -> Result<HostprepConfig>;
    /// Path the configuration is read from.
    fn path(&self) -> PathBuf;
}
