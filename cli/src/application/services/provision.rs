//! Application service: SSH account provisioning with rollback.
//!
//! Pre-flight validation runs before anything on the host changes. After the
//! daemon configuration has been snapshotted, every mutation step either
//! returns the ledger extended with what it did, or fails; the first failure
//! hands the ledger to [`rollback`], which undoes the recorded work.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use crate::application::ports::{
    AccountManager, ConfigCheck, HostFs, HostSystem, PrivilegeProbe, ProgressReporter,
    ServiceManager,
};
use crate::domain::ledger::{append_policy_line, remove_policy_line, sudoers_entry};
use crate::domain::sshd_config::{PASSWORD_AUTHENTICATION, PERMIT_ROOT_LOGIN, PORT};
use crate::domain::validate::validate_args;
use crate::domain::{
    AuthMode, HostprepConfig, ProvisionRequest, RollbackLedger, SetupArgs, Snapshot, SshdConfig,
    StepError, ValidationError,
};

// ── Outcome types ─────────────────────────────────────────────────────────────

/// What a successful run changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub username: String,
    pub auth: AuthMode,
    pub port: Option<u16>,
    pub sudo_group: bool,
    pub passwordless_sudo: bool,
    /// Service unit that was restarted and confirmed active.
    pub service: String,
}

/// Compensations performed by [`rollback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub completed: Vec<String>,
    pub failures: Vec<String>,
}

impl RollbackReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Why a provisioning run did not complete.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("could not back up {}: {source:#}", .path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{cause}\nAll changes were rolled back.")]
    RolledBack {
        cause: StepError,
        report: RollbackReport,
    },
}

/// A failed step together with the ledger as it stood when the step failed.
struct Failed {
    cause: StepError,
    ledger: RollbackLedger,
}

impl Failed {
    fn new(cause: StepError, ledger: &RollbackLedger) -> Self {
        Self {
            cause,
            ledger: ledger.clone(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Pre-flight checks: privilege, arguments, then account existence.
///
/// # Errors
///
/// Returns a `ValidationError` (wrapped in `anyhow`) on rejection, or the
/// underlying error if the host could not be queried.
pub async fn validate(
    host: &(impl PrivilegeProbe + AccountManager),
    args: &SetupArgs,
) -> Result<ProvisionRequest> {
    if !host.is_root().await? {
        return Err(ValidationError::Privilege.into());
    }
    let request = validate_args(args)?;
    if host.exists(&request.username).await? {
        return Err(ValidationError::DuplicateAccount(request.username).into());
    }
    Ok(request)
}

// ── Sequencer ─────────────────────────────────────────────────────────────────

/// Provision the account described by `request`.
///
/// # Errors
///
/// Returns `ProvisionError::Snapshot` if the daemon configuration could not be
/// backed up (nothing was changed), or `ProvisionError::RolledBack` after a
/// later step failed and the recorded changes were undone.
pub async fn provision(
    host: &impl HostSystem,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config: &HostprepConfig,
    request: &ProvisionRequest,
) -> Result<ProvisionOutcome, ProvisionError> {
    reporter.step("Backing up SSH daemon configuration...");
    let snapshot =
        take_snapshot(fs, &config.ssh.config_path).map_err(|source| ProvisionError::Snapshot {
            path: config.ssh.config_path.clone(),
            source,
        })?;
    tracing::info!(snapshot = %snapshot.path.display(), "configuration snapshot taken");
    let ledger = RollbackLedger::new().with_snapshot(snapshot);

    match apply(host, fs, reporter, config, request, ledger).await {
        Ok((ledger, service)) => {
            cleanup(fs, reporter, &ledger);
            Ok(ProvisionOutcome {
                username: request.username.clone(),
                auth: request.auth,
                port: request.port,
                sudo_group: request.sudo,
                passwordless_sudo: request.grants_passwordless_sudo(),
                service,
            })
        }
        Err(Failed { cause, ledger }) => {
            tracing::error!(error = %cause, "provisioning step failed, rolling back");
            reporter.warn(&format!("{cause}"));
            reporter.warn("Rolling back changes...");
            let report = rollback(host, fs, reporter, config, &ledger).await;
            Err(ProvisionError::RolledBack { cause, report })
        }
    }
}

/// Steps 2–8. Returns the final ledger and the healthy service name.
async fn apply(
    host: &impl HostSystem,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config: &HostprepConfig,
    request: &ProvisionRequest,
    ledger: RollbackLedger,
) -> Result<(RollbackLedger, String), Failed> {
    let ledger = create_account(host, reporter, request, ledger).await?;
    let ledger = grant_sudo(host, fs, reporter, config, request, ledger).await?;

    if let Some(key) = request.public_key.as_deref() {
        install_key(host, fs, reporter, &request.username, key)
            .await
            .map_err(|e| Failed::new(e, &ledger))?;
    }

    edit_daemon_config(fs, reporter, &config.ssh.config_path, request)
        .map_err(|e| Failed::new(e, &ledger))?;
    check_daemon_config(host, reporter, &config.ssh.config_path)
        .await
        .map_err(|e| Failed::new(e, &ledger))?;
    let service = restart_daemon(host, reporter, &config.ssh.service_names)
        .await
        .map_err(|e| Failed::new(e, &ledger))?;
    verify_health(host, reporter, config, &service)
        .await
        .map_err(|e| Failed::new(e, &ledger))?;

    Ok((ledger, service))
}

fn take_snapshot(fs: &impl HostFs, config_path: &Path) -> Result<Snapshot> {
    let path = snapshot_path(config_path);
    fs.copy(config_path, &path)?;
    match fs.sha256(&path) {
        Ok(sha256) => Ok(Snapshot { path, sha256 }),
        Err(e) => {
            if let Err(cleanup) = fs.remove_file(&path) {
                tracing::warn!(backup = %path.display(), error = %cleanup, "stray backup left behind");
            }
            Err(e)
        }
    }
}

/// `<config>.hostprep-<timestamp>-<pid>.bak`, next to the live file.
#[must_use]
pub fn snapshot_path(config_path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let mut name = config_path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".hostprep-{stamp}-{}.bak", std::process::id()));
    config_path.with_file_name(name)
}

async fn create_account(
    host: &impl AccountManager,
    reporter: &impl ProgressReporter,
    request: &ProvisionRequest,
    ledger: RollbackLedger,
) -> Result<RollbackLedger, Failed> {
    let user = &request.username;
    match request.auth {
        AuthMode::Key => reporter.step(&format!("Creating user '{user}' (key-only login)...")),
        AuthMode::Password => {
            reporter.step(&format!("Creating user '{user}' (you will be asked for a password)..."));
        }
    }
    match host.create(user, request.auth).await {
        Ok(()) => {
            reporter.success(&format!("User '{user}' created"));
            Ok(ledger.with_account(user))
        }
        Err(e) => {
            // adduser can fail after the account row is written (e.g. at the
            // password prompt); track it so rollback removes it. The account
            // was absent before the run, so an unanswered query counts as present.
            let ledger = if host.exists(user).await.unwrap_or(true) {
                ledger.with_account(user)
            } else {
                ledger
            };
            Err(Failed {
                cause: StepError::host("creating user", e),
                ledger,
            })
        }
    }
}

async fn grant_sudo(
    host: &impl AccountManager,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config: &HostprepConfig,
    request: &ProvisionRequest,
    ledger: RollbackLedger,
) -> Result<RollbackLedger, Failed> {
    if !request.sudo {
        return Ok(ledger);
    }
    let user = &request.username;
    let group = &config.sudo.admin_group;

    reporter.step(&format!("Adding '{user}' to group '{group}'..."));
    host.add_to_group(user, group)
        .await
        .map_err(|e| Failed::new(StepError::host("granting sudo", e), &ledger))?;

    if !request.grants_passwordless_sudo() {
        reporter.success(&format!("'{user}' can use sudo with a password"));
        return Ok(ledger);
    }

    let policy = &config.sudo.policy_path;
    let line = sudoers_entry(user);
    let current = fs
        .read_to_string(policy)
        .map_err(|e| Failed::new(StepError::host("reading sudo policy", e), &ledger))?;
    if current.lines().any(|l| l == line) {
        tracing::warn!(%line, "passwordless sudo entry already present, leaving it untouched");
        return Ok(ledger);
    }
    fs.replace(policy, &append_policy_line(&current, &line))
        .map_err(|e| Failed::new(StepError::host("writing sudo policy", e), &ledger))?;
    reporter.success(&format!("Passwordless sudo granted to '{user}'"));
    Ok(ledger.with_sudoers_line(&line))
}

async fn install_key(
    host: &impl AccountManager,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    username: &str,
    key: &str,
) -> Result<(), StepError> {
    const STEP: &str = "installing public key";
    reporter.step("Installing SSH public key...");
    let home = host
        .home_dir(username)
        .await
        .map_err(|e| StepError::host(STEP, e))?;
    let ssh_dir = home.join(".ssh");
    let authorized_keys = ssh_dir.join("authorized_keys");

    fs.create_dir_all(&ssh_dir)
        .and_then(|()| fs.set_mode(&ssh_dir, 0o700))
        .and_then(|()| fs.write(&authorized_keys, &format!("{key}\n")))
        .and_then(|()| fs.set_mode(&authorized_keys, 0o600))
        .map_err(|e| StepError::host(STEP, e))?;
    host.chown_recursive(&ssh_dir, username)
        .await
        .map_err(|e| StepError::host(STEP, e))?;
    reporter.success(&format!("Key installed in {}", authorized_keys.display()));
    Ok(())
}

fn edit_daemon_config(
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config_path: &Path,
    request: &ProvisionRequest,
) -> Result<(), StepError> {
    const STEP: &str = "editing sshd configuration";
    reporter.step("Hardening SSH daemon configuration...");
    let text = fs
        .read_to_string(config_path)
        .map_err(|e| StepError::host(STEP, e))?;
    let mut sshd = SshdConfig::parse(&text);

    if request.auth == AuthMode::Key {
        sshd.set(PASSWORD_AUTHENTICATION, "no");
    }
    sshd.set(PERMIT_ROOT_LOGIN, "no");
    if let Some(port) = request.port {
        sshd.set(PORT, &port.to_string());
    }

    fs.replace(config_path, &sshd.render())
        .map_err(|e| StepError::host(STEP, e))?;
    tracing::debug!(path = %config_path.display(), "sshd configuration rewritten");
    Ok(())
}

async fn check_daemon_config(
    host: &impl HostSystem,
    reporter: &impl ProgressReporter,
    config_path: &Path,
) -> Result<(), StepError> {
    reporter.step("Validating SSH daemon configuration...");
    match host
        .check_config(config_path)
        .await
        .map_err(|e| StepError::host("validating sshd configuration", e))?
    {
        ConfigCheck::Valid => {
            reporter.success("Configuration is valid");
            Ok(())
        }
        ConfigCheck::Invalid(diagnostic) => Err(StepError::InvalidDaemonConfig(diagnostic)),
    }
}

/// Reloads the service manager and restarts the first unit name that works.
async fn restart_daemon(
    host: &impl ServiceManager,
    reporter: &impl ProgressReporter,
    service_names: &[String],
) -> Result<String, StepError> {
    reporter.step("Restarting SSH service...");
    host.daemon_reload()
        .await
        .map_err(|e| StepError::host("reloading service manager", e))?;
    restart_first(host, service_names)
        .await
        .ok_or_else(|| StepError::RestartFailed(service_names.join(", ")))
}

async fn restart_first(host: &impl ServiceManager, service_names: &[String]) -> Option<String> {
    for name in service_names {
        match host.restart(name).await {
            Ok(()) => {
                tracing::info!(unit = %name, "service restarted");
                return Some(name.clone());
            }
            Err(e) => tracing::debug!(unit = %name, error = %e, "restart failed, trying next name"),
        }
    }
    None
}

/// Waits for the restarted daemon to report active; restarts the socket unit
/// afterwards when one is installed.
async fn verify_health(
    host: &impl ServiceManager,
    reporter: &impl ProgressReporter,
    config: &HostprepConfig,
    service: &str,
) -> Result<(), StepError> {
    reporter.step(&format!("Checking that {service} is running..."));
    tokio::time::sleep(config.health.settle()).await;

    let mut active = false;
    for attempt in 1..=config.health.attempts {
        active = host.is_active(service).await.unwrap_or(false);
        tracing::debug!(unit = %service, attempt, active, "health probe");
        if active {
            break;
        }
        if attempt < config.health.attempts {
            tokio::time::sleep(config.health.interval()).await;
        }
    }
    if !active {
        return Err(StepError::ServiceRestartFailed(service.to_string()));
    }
    reporter.success(&format!("{service} is active"));

    let socket = &config.ssh.socket_unit;
    if !socket.is_empty() && host.unit_exists(socket).await.unwrap_or(false) {
        if let Err(e) = host.restart(socket).await {
            tracing::warn!(unit = %socket, error = %e, "socket restart failed");
            reporter.warn(&format!("Could not restart {socket}: {e:#}"));
        }
    }
    Ok(())
}

fn cleanup(fs: &impl HostFs, reporter: &impl ProgressReporter, ledger: &RollbackLedger) {
    if let Some(path) = ledger.snapshot_path() {
        if let Err(e) = fs.remove_file(path) {
            reporter.warn(&format!("Could not delete backup {}: {e:#}", path.display()));
        }
    }
}

// ── Rollback ──────────────────────────────────────────────────────────────────

/// Undo what `ledger` records: remove the account, restore the daemon
/// configuration from the snapshot, remove the sudo policy line.
///
/// Every compensation runs regardless of earlier ones failing. Running this
/// twice with the same ledger is harmless: the snapshot is gone after the first
/// restore, and the policy line is only removed when present.
pub async fn rollback(
    host: &impl HostSystem,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config: &HostprepConfig,
    ledger: &RollbackLedger,
) -> RollbackReport {
    let mut report = RollbackReport::default();

    if let Some(user) = ledger.account() {
        // Absent already: an earlier rollback removed it.
        let present = host.exists(user).await.unwrap_or(true);
        let result = if present { host.remove(user).await } else { Ok(()) };
        match result {
            Ok(()) if !present => {}
            Ok(()) => report.completed.push(format!("removed user '{user}'")),
            Err(e) => {
                tracing::warn!(user, error = %e, "account removal failed");
                report.failures.push(format!("remove user '{user}': {e:#}"));
            }
        }
    }

    if let Some(snapshot) = ledger.snapshot() {
        if fs.exists(&snapshot.path) {
            restore_snapshot(host, fs, config, snapshot, &mut report).await;
        }
    }

    if let Some(line) = ledger.sudoers_line() {
        let policy = &config.sudo.policy_path;
        let result = fs.read_to_string(policy).and_then(|doc| {
            match remove_policy_line(&doc, line) {
                Some(updated) => fs.replace(policy, &updated).map(|()| true),
                None => Ok(false),
            }
        });
        match result {
            Ok(true) => report.completed.push("removed passwordless sudo entry".to_string()),
            Ok(false) => {}
            Err(e) => report.failures.push(format!("remove sudo entry: {e:#}")),
        }
    }

    for done in &report.completed {
        reporter.step(&format!("Rollback: {done}"));
    }
    for failure in &report.failures {
        reporter.warn(&format!("Rollback: {failure}"));
    }
    report
}

async fn restore_snapshot(
    host: &impl ServiceManager,
    fs: &impl HostFs,
    config: &HostprepConfig,
    snapshot: &Snapshot,
    report: &mut RollbackReport,
) {
    let live = &config.ssh.config_path;
    if let Err(e) = fs.copy(&snapshot.path, live) {
        tracing::error!(error = %e, backup = %snapshot.path.display(), "restore failed");
        report.failures.push(format!(
            "restore {} (backup kept at {}): {e:#}",
            live.display(),
            snapshot.path.display()
        ));
        return;
    }
    let mismatch = match fs.sha256(live) {
        Ok(digest) if digest == snapshot.sha256 => None,
        Ok(_) => Some("differs from backup".to_string()),
        Err(e) => Some(format!("could not be verified: {e:#}")),
    };
    if let Some(why) = mismatch {
        tracing::error!(backup = %snapshot.path.display(), "restored config {why}");
        report.failures.push(format!(
            "restored {} {why} (backup kept at {})",
            live.display(),
            snapshot.path.display()
        ));
        return;
    }
    report
        .completed
        .push(format!("restored {}", live.display()));

    if let Err(e) = fs.remove_file(&snapshot.path) {
        report.failures.push(format!(
            "delete backup {}: {e:#}",
            snapshot.path.display()
        ));
    }

    match restart_first(host, &config.ssh.service_names).await {
        Some(unit) => report.completed.push(format!("restarted {unit}")),
        None => report.failures.push(format!(
            "restart SSH service (tried: {})",
            config.ssh.service_names.join(", ")
        )),
    }
}
