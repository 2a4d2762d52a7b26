//! Tests for the provisioning service: validation, the mutation sequence and
//! rollback, against a fake host and a scratch directory.

#![allow(clippy::expect_used)]

use hostprep::application::ports::ConfigCheck;
use hostprep::application::services::provision::{
    ProvisionError, provision, rollback, validate,
};
use hostprep::application::ports::HostFs;
use hostprep::domain::ledger::sudoers_entry;
use hostprep::domain::{
    AuthMode, ProvisionRequest, RollbackLedger, SetupArgs, Snapshot, SshdConfig, StepError,
    ValidationError,
};
use hostprep::infra::fs::LocalHostFs;

use crate::helpers::{BadDigestFs, FakeHost, KEY, NoopReporter, RecordingReporter, SSHD_CONFIG, SUDOERS, Scratch};

fn setup_args(username: &str, key: &str, port: &str, sudo: &str) -> SetupArgs {
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    SetupArgs {
        username: username.to_string(),
        public_key: opt(key),
        ssh_port: opt(port),
        add_to_sudo: opt(sudo),
    }
}

fn key_request(username: &str, sudo: bool) -> ProvisionRequest {
    ProvisionRequest {
        username: username.to_string(),
        public_key: Some(KEY.to_string()),
        port: None,
        sudo,
        auth: AuthMode::Key,
    }
}

fn validation_error(err: &anyhow::Error) -> &ValidationError {
    err.downcast_ref::<ValidationError>()
        .expect("expected a ValidationError")
}

// ── Validation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_validate_rejects_non_root_before_anything_else() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.root = false;

    let err = validate(&host, &setup_args("BAD NAME", "", "80", ""))
        .await
        .expect_err("non-root must be rejected");
    assert_eq!(validation_error(&err), &ValidationError::Privilege);
}

#[tokio::test]
async fn test_validate_rejects_existing_account() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home()).with_accounts(&["john"]);

    let err = validate(&host, &setup_args("john", KEY, "", ""))
        .await
        .expect_err("duplicate must be rejected");
    assert_eq!(
        validation_error(&err),
        &ValidationError::DuplicateAccount("john".to_string())
    );
}

#[tokio::test]
async fn test_validate_empty_username_is_usage_error() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    let err = validate(&host, &setup_args("", "", "", ""))
        .await
        .expect_err("empty username must be rejected");
    assert_eq!(validation_error(&err), &ValidationError::Usage);
}

#[tokio::test]
async fn test_scenario_c_restricted_port_changes_nothing() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    let err = validate(&host, &setup_args("bob", KEY, "80", ""))
        .await
        .expect_err("port 80 must be rejected");
    assert_eq!(validation_error(&err), &ValidationError::RestrictedPort(80));
    assert!(host.created().is_empty());
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
    assert_eq!(scratch.sudoers(), SUDOERS);
}

// ── Happy paths ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_a_key_only_account() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());
    let request = validate(&host, &setup_args("john", KEY, "", ""))
        .await
        .expect("valid request");

    let outcome = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &request)
        .await
        .expect("provisioning succeeds");

    assert_eq!(outcome.auth, AuthMode::Key);
    assert!(!outcome.passwordless_sudo);
    assert_eq!(outcome.service, "ssh");
    assert_eq!(host.created(), vec![("john".to_string(), AuthMode::Key)]);

    let sshd = SshdConfig::parse(&scratch.sshd_config());
    assert_eq!(sshd.get("PasswordAuthentication"), Some("no"));
    assert_eq!(sshd.get("PermitRootLogin"), Some("no"));
    assert_eq!(sshd.active_count("PasswordAuthentication"), 1);
    assert!(
        scratch.sshd_config().contains("Match User backup\n    PasswordAuthentication yes\n"),
        "Match block untouched"
    );
    assert_eq!(sshd.get("Port"), None);

    assert_eq!(scratch.sudoers(), SUDOERS);
    let keys = std::fs::read_to_string(scratch.home().join("john/.ssh/authorized_keys"))
        .expect("authorized_keys written");
    assert_eq!(keys, format!("{KEY}\n"));
    assert!(scratch.leftover_backups().is_empty(), "snapshot deleted on success");
}

#[cfg(unix)]
#[tokio::test]
async fn test_key_install_sets_modes_and_ownership() {
    use std::os::unix::fs::PermissionsExt;

    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());
    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect("provisioning succeeds");

    let ssh_dir = scratch.home().join("john/.ssh");
    let mode = |p: &std::path::Path| {
        std::fs::metadata(p).expect("metadata").permissions().mode() & 0o777
    };
    assert_eq!(mode(&ssh_dir), 0o700);
    assert_eq!(mode(&ssh_dir.join("authorized_keys")), 0o600);
    assert_eq!(host.state.lock().expect("lock").chowned, vec![ssh_dir]);
}

#[tokio::test]
async fn test_scenario_b_password_account_with_sudo_and_port() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());
    let request = validate(&host, &setup_args("jane", "", "2222", "yes"))
        .await
        .expect("valid request");

    let outcome = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &request)
        .await
        .expect("provisioning succeeds");

    assert_eq!(outcome.auth, AuthMode::Password);
    assert!(outcome.sudo_group);
    assert!(!outcome.passwordless_sudo);
    assert_eq!(host.created(), vec![("jane".to_string(), AuthMode::Password)]);
    assert_eq!(
        host.state.lock().expect("lock").groups,
        vec![("jane".to_string(), "sudo".to_string())]
    );

    let sshd = SshdConfig::parse(&scratch.sshd_config());
    assert_eq!(sshd.get("Port"), Some("2222"));
    assert_eq!(sshd.get("PermitRootLogin"), Some("no"));
    assert_eq!(sshd.get("PasswordAuthentication"), Some("yes"), "password login kept");
    assert_eq!(scratch.sudoers(), SUDOERS, "no passwordless entry in password mode");
    assert!(!scratch.home().join("jane/.ssh").exists());
}

#[tokio::test]
async fn test_key_and_sudo_grants_passwordless_entry() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    let outcome = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect("provisioning succeeds");

    assert!(outcome.passwordless_sudo);
    assert_eq!(scratch.sudoers(), format!("{SUDOERS}{}\n", sudoers_entry("john")));
}

#[tokio::test]
async fn test_restart_falls_back_to_second_unit_name() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.restartable = vec!["sshd".to_string()];
    host.socket_installed = false;

    let outcome = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect("provisioning succeeds");

    assert_eq!(outcome.service, "sshd");
    assert_eq!(host.restarts(), vec!["sshd".to_string()]);
    assert_eq!(host.state.lock().expect("lock").daemon_reloads, 1);
}

#[tokio::test]
async fn test_socket_unit_restarted_after_healthy_service() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect("provisioning succeeds");

    assert_eq!(host.restarts(), vec!["ssh".to_string(), "ssh.socket".to_string()]);
}

#[tokio::test]
async fn test_socket_restart_failure_is_only_a_warning() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.restartable = vec!["ssh".to_string()];
    let reporter = RecordingReporter::default();

    provision(&host, &LocalHostFs, &reporter, &scratch.config, &key_request("john", false))
        .await
        .expect("socket failure does not fail provisioning");

    assert!(host.has_account("john"));
    let warnings = reporter.warnings.lock().expect("lock");
    assert!(warnings.iter().any(|w| w.contains("ssh.socket")), "got: {warnings:?}");
}

#[tokio::test]
async fn test_health_polls_until_active() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.active_from_probe = Some(3);

    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect("active on the last allowed probe");

    assert_eq!(host.state.lock().expect("lock").probes, 3);
}

// ── Failure and rollback ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_d_health_failure_rolls_everything_back() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.active_from_probe = None;

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect_err("health check fails");

    let ProvisionError::RolledBack { cause, report } = err else {
        panic!("expected RolledBack");
    };
    assert!(matches!(cause, StepError::ServiceRestartFailed(ref unit) if unit == "ssh"));
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(host.state.lock().expect("lock").probes, 3, "bounded retries");

    assert!(!host.has_account("john"));
    assert_eq!(host.removed(), vec!["john".to_string()]);
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG, "config byte-identical to snapshot");
    assert_eq!(scratch.sudoers(), SUDOERS, "sudoers entry removed");
    assert!(scratch.leftover_backups().is_empty(), "snapshot deleted after restore");
    // Service restarted for the edit, then again after the restore.
    assert_eq!(host.restarts(), vec!["ssh".to_string(), "ssh".to_string()]);
}

#[tokio::test]
async fn test_invalid_daemon_config_restores_snapshot() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.config_check = ConfigCheck::Invalid("line 4: Bad configuration option".to_string());

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect_err("config check fails");

    let ProvisionError::RolledBack { cause, .. } = err else {
        panic!("expected RolledBack");
    };
    assert!(cause.to_string().contains("Bad configuration option"), "got: {cause}");
    assert!(!host.has_account("john"));
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
    assert!(scratch.leftover_backups().is_empty());
    assert_eq!(host.restarts(), vec!["ssh".to_string()], "only the post-restore restart");
}

#[tokio::test]
async fn test_restart_failure_rolls_back() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.restartable = Vec::new();

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect_err("no unit restarts");

    let ProvisionError::RolledBack { cause, report } = err else {
        panic!("expected RolledBack");
    };
    assert!(matches!(cause, StepError::RestartFailed(_)));
    assert!(!host.has_account("john"));
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
    assert_eq!(scratch.sudoers(), SUDOERS);
    assert!(
        report.failures.iter().any(|f| f.contains("restart SSH service")),
        "post-restore restart failure is reported: {:?}",
        report.failures
    );
}

#[tokio::test]
async fn test_group_failure_removes_account_only() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.fail_add_to_group = true;

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect_err("usermod fails");

    let ProvisionError::RolledBack { report, .. } = err else {
        panic!("expected RolledBack");
    };
    assert!(report.is_clean());
    assert!(!host.has_account("john"));
    assert_eq!(scratch.sudoers(), SUDOERS);
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
    assert_eq!(host.restarts(), vec!["ssh".to_string()], "restart after restore");
}

#[tokio::test]
async fn test_partial_account_creation_is_rolled_back() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.fail_create = true;
    host.create_leaves_account = true;

    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect_err("adduser fails");

    assert_eq!(host.removed(), vec!["john".to_string()]);
}

#[tokio::test]
async fn test_partial_account_tracked_when_lookup_fails() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.fail_create = true;
    host.create_leaves_account = true;
    host.fail_exists = true;

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect_err("adduser fails");

    assert!(matches!(err, ProvisionError::RolledBack { .. }));
    assert_eq!(host.removed(), vec!["john".to_string()]);
    assert!(!host.has_account("john"));
}

#[tokio::test]
async fn test_failed_creation_without_account_removes_nothing() {
    let scratch = Scratch::new();
    let mut host = FakeHost::new(&scratch.home());
    host.fail_create = true;

    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect_err("adduser fails");

    assert!(host.removed().is_empty());
    assert!(scratch.leftover_backups().is_empty());
}

#[tokio::test]
async fn test_preexisting_sudoers_line_survives_rollback() {
    let scratch = Scratch::new();
    let existing = format!("{SUDOERS}{}\n", sudoers_entry("john"));
    std::fs::write(&scratch.config.sudo.policy_path, &existing).expect("seed sudoers");
    let mut host = FakeHost::new(&scratch.home());
    host.active_from_probe = None;

    provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect_err("health check fails");

    assert_eq!(scratch.sudoers(), existing, "line not written by this run is kept");
}

#[tokio::test]
async fn test_missing_daemon_config_fails_before_any_change() {
    let scratch = Scratch::new();
    std::fs::remove_file(&scratch.config.ssh.config_path).expect("remove config");
    let host = FakeHost::new(&scratch.home());

    let err = provision(&host, &LocalHostFs, &NoopReporter, &scratch.config, &key_request("john", true))
        .await
        .expect_err("snapshot fails");

    assert!(matches!(err, ProvisionError::Snapshot { .. }));
    assert!(host.created().is_empty());
    assert_eq!(scratch.sudoers(), SUDOERS);
}

#[tokio::test]
async fn test_snapshot_digest_failure_leaves_no_backup() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    let fs = BadDigestFs::Unreadable;
    let err = provision(&host, &fs, &NoopReporter, &scratch.config, &key_request("john", false))
        .await
        .expect_err("digest fails");

    assert!(matches!(err, ProvisionError::Snapshot { .. }));
    assert!(scratch.leftover_backups().is_empty(), "left: {:?}", scratch.leftover_backups());
    assert!(host.created().is_empty());
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
}

/// Live config edited, with a backup of the original next to it.
fn edited_with_backup(scratch: &Scratch) -> Snapshot {
    let path = scratch.dir.path().join("ssh/sshd_config.bak");
    std::fs::write(&path, SSHD_CONFIG).expect("write backup");
    std::fs::write(&scratch.config.ssh.config_path, "Port 2222\n").expect("edit live");
    let sha256 = LocalHostFs.sha256(&path).expect("digest");
    Snapshot { path, sha256 }
}

#[tokio::test]
async fn test_unverified_restore_keeps_backup() {
    for fs in [BadDigestFs::Wrong("deadbeef"), BadDigestFs::Unreadable] {
        let scratch = Scratch::new();
        let host = FakeHost::new(&scratch.home());
        let snapshot = edited_with_backup(&scratch);
        let ledger = RollbackLedger::new().with_snapshot(snapshot.clone());

        let report = rollback(&host, &fs, &NoopReporter, &scratch.config, &ledger).await;

        assert!(snapshot.path.exists(), "backup must survive an unverified restore");
        assert_eq!(report.failures.len(), 1, "failures: {:?}", report.failures);
        assert!(report.failures[0].contains("backup kept at"), "got: {}", report.failures[0]);
        assert!(
            !report.completed.iter().any(|c| c.starts_with("restored")),
            "completed: {:?}",
            report.completed
        );
        assert!(host.restarts().is_empty());
    }
}

#[tokio::test]
async fn test_verified_restore_deletes_backup() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());
    let snapshot = edited_with_backup(&scratch);
    let ledger = RollbackLedger::new().with_snapshot(snapshot.clone());

    let report = rollback(&host, &LocalHostFs, &NoopReporter, &scratch.config, &ledger).await;

    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(scratch.sshd_config(), SSHD_CONFIG);
    assert!(!snapshot.path.exists());
    assert_eq!(host.restarts(), vec!["ssh".to_string()]);
}

#[tokio::test]
async fn test_rollback_twice_is_harmless() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home()).with_accounts(&["john"]);
    let line = sudoers_entry("john");
    std::fs::write(&scratch.config.sudo.policy_path, format!("{SUDOERS}{line}\n"))
        .expect("seed sudoers");
    let ledger = RollbackLedger::new().with_account("john").with_sudoers_line(&line);

    let first = rollback(&host, &LocalHostFs, &NoopReporter, &scratch.config, &ledger).await;
    let second = rollback(&host, &LocalHostFs, &NoopReporter, &scratch.config, &ledger).await;

    assert!(first.is_clean());
    assert_eq!(first.completed.len(), 2);
    assert!(second.is_clean(), "failures: {:?}", second.failures);
    assert!(second.completed.is_empty());
    assert_eq!(host.removed(), vec!["john".to_string()]);
    assert_eq!(scratch.sudoers(), SUDOERS);
}

#[tokio::test]
async fn test_rollback_of_empty_ledger_does_nothing() {
    let scratch = Scratch::new();
    let host = FakeHost::new(&scratch.home());

    let report = rollback(&host, &LocalHostFs, &NoopReporter, &scratch.config, &RollbackLedger::new()).await;

    assert!(report.is_clean());
    assert!(report.completed.is_empty());
    assert!(host.restarts().is_empty());
}
