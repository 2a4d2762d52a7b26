//! `hostprep setup <username> [public_key] [ssh_port] [add_to_sudo]`

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::provision::{
    self, ProvisionError, ProvisionOutcome, RollbackReport,
};
use crate::domain::error::SETUP_USAGE;
use crate::domain::{AuthMode, SetupArgs, ValidationError};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::fs::LocalHostFs;
use crate::infra::host::SystemHost;
use crate::output::{OutputContext, TerminalReporter, progress};

/// Arguments for the setup command.
#[derive(Args)]
pub struct SetupCmd {
    /// Account to create
    pub username: Option<String>,

    /// Public key for key-only login (quote it); omit or pass "" for a password login
    pub public_key: Option<String>,

    /// New SSH port
    pub ssh_port: Option<String>,

    /// Add the user to the sudo group (yes/true/1/y)
    pub add_to_sudo: Option<String>,
}

impl From<SetupCmd> for SetupArgs {
    fn from(cmd: SetupCmd) -> Self {
        Self {
            username: cmd.username.unwrap_or_default(),
            public_key: cmd.public_key,
            ssh_port: cmd.ssh_port,
            add_to_sudo: cmd.add_to_sudo,
        }
    }
}

/// Run `hostprep setup`.
///
/// # Errors
///
/// Returns an error when validation rejects the request, when the daemon
/// configuration cannot be backed up, or when a step failed and the changes
/// were rolled back.
pub async fn run(app: &AppContext, cmd: SetupCmd) -> Result<()> {
    let config = app.config()?;
    let host = SystemHost::new(TokioCommandRunner::default(), &config.ssh.daemon_binary);
    let args = SetupArgs::from(cmd);

    let spinner = app
        .output
        .show_progress()
        .then(|| progress::spinner("Running pre-flight checks..."));
    let validated = provision::validate(&host, &args).await;
    if let Some(pb) = &spinner {
        match validated {
            Ok(_) => progress::finish_ok(pb, "Pre-flight checks passed"),
            Err(_) => progress::finish_clear(pb),
        }
    }
    if let Err(e) = &validated
        && e.downcast_ref::<ValidationError>().is_some_and(ValidationError::wants_usage)
    {
        println!("{SETUP_USAGE}");
    }
    let request = validated?;
    tracing::info!(username = %request.username, auth = ?request.auth, "request validated");

    let reporter = TerminalReporter::new(&app.output);
    match provision::provision(&host, &LocalHostFs, &reporter, &config, &request).await {
        Ok(outcome) => {
            print_outcome(&app.output, &outcome);
            Ok(())
        }
        Err(ProvisionError::RolledBack { cause, report }) => {
            print_rollback(&app.output, &report);
            if report.is_clean() {
                anyhow::bail!("{cause}; all changes were rolled back")
            }
            anyhow::bail!(
                "{cause}; rollback incomplete ({} step(s) failed), inspect the host manually",
                report.failures.len()
            )
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcome(ctx: &OutputContext, outcome: &ProvisionOutcome) {
    if ctx.quiet {
        return;
    }
    println!();
    ctx.header("Account ready");
    ctx.kv("user    ", &outcome.username);
    ctx.kv(
        "login   ",
        match outcome.auth {
            AuthMode::Key => "public key only",
            AuthMode::Password => "password",
        },
    );
    let port = outcome
        .port
        .map_or_else(|| "unchanged".to_string(), |p| p.to_string());
    ctx.kv("port    ", &port);
    let sudo = match (outcome.sudo_group, outcome.passwordless_sudo) {
        (true, true) => "yes (passwordless)",
        (true, false) => "yes",
        (false, _) => "no",
    };
    ctx.kv("sudo    ", sudo);
    ctx.kv("service ", &outcome.service);
    println!();
    if let Some(port) = outcome.port {
        ctx.info(&format!(
            "Keep this session open and test: ssh -p {port} {}@<host>",
            outcome.username
        ));
    } else {
        ctx.info(&format!(
            "Keep this session open and test: ssh {}@<host>",
            outcome.username
        ));
    }
}

fn print_rollback(ctx: &OutputContext, report: &RollbackReport) {
    for done in &report.completed {
        ctx.success(&format!("Rolled back: {done}"));
    }
    for failure in &report.failures {
        ctx.error(&format!("Rollback failed: {failure}"));
    }
}
