//! Domain types and validators for hostprep configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `/etc/hostprep/config.yaml`.
///
/// Every field is optional in the file; absent fields take the defaults that
/// match a stock Debian/Ubuntu host.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HostprepConfig {
    pub ssh: SshConfig,
    pub sudo: SudoConfig,
    pub health: HealthConfig,
    pub maintenance: MaintenanceConfig,
}

/// SSH daemon locations and unit names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshConfig {
    /// Live daemon configuration file.
    pub config_path: PathBuf,
    /// Binary used for `-t -f <config>` syntax checks.
    pub daemon_binary: String,
    /// Service unit names tried in order when restarting.
    pub service_names: Vec<String>,
    /// Socket-activation unit restarted after a healthy restart, if present.
    pub socket_unit: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/ssh/sshd_config"),
            daemon_binary: "sshd".to_string(),
            service_names: vec!["ssh".to_string(), "sshd".to_string()],
            socket_unit: "ssh.socket".to_string(),
        }
    }
}

/// Privilege escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SudoConfig {
    /// Policy store that receives the passwordless entry.
    pub policy_path: PathBuf,
    /// Group granting sudo rights.
    pub admin_group: String,
}

impl Default for SudoConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("/etc/sudoers"),
            admin_group: "sudo".to_string(),
        }
    }
}

/// Post-restart health polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    /// Wait before the first `is-active` probe.
    pub settle_ms: u64,
    /// Number of `is-active` probes before giving up.
    pub attempts: u32,
    /// Delay between probes.
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            settle_ms: 1000,
            attempts: 5,
            interval_ms: 1000,
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Maintenance routine knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// `journalctl --vacuum-time` argument.
    pub journal_retention: String,
    /// Newest kernel packages kept besides the running one.
    pub kernels_to_keep: usize,
    /// Flag file written by the package manager when a reboot is pending.
    pub reboot_required_path: PathBuf,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            journal_retention: "7d".to_string(),
            kernels_to_keep: 2,
            reboot_required_path: PathBuf::from("/var/run/reboot-required"),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a loaded configuration.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for the first field that cannot work.
pub fn validate_config(config: &HostprepConfig) -> Result<()> {
    let invalid = |key: &str, value: String, expected: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
        expected: expected.to_string(),
    };

    if config.ssh.service_names.iter().all(|s| s.trim().is_empty()) {
        return Err(invalid("ssh.service_names", "[]".to_string(), "at least one unit name").into());
    }
    if config.ssh.daemon_binary.trim().is_empty() {
        return Err(invalid("ssh.daemon_binary", String::new(), "a binary name or path").into());
    }
    if config.sudo.admin_group.trim().is_empty() {
        return Err(invalid("sudo.admin_group", String::new(), "a group name").into());
    }
    if config.health.attempts == 0 {
        return Err(invalid("health.attempts", "0".to_string(), "1 or more").into());
    }
    if config.maintenance.kernels_to_keep == 0 {
        return Err(invalid("maintenance.kernels_to_keep", "0".to_string(), "1 or more").into());
    }
    let retention = &config.maintenance.journal_retention;
    let digits = retention.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(
            "maintenance.journal_retention",
            retention.clone(),
            "a journalctl time span such as 7d or 2weeks",
        )
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
