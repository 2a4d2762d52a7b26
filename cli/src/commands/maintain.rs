//! `hostprep maintain [--exec]`: routine host housekeeping.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::PrivilegeProbe;
use crate::application::services::maintenance::run_maintenance;
use crate::domain::ValidationError;
use crate::domain::maintenance::{MaintenanceReport, MaintenanceStep, StepOutcome};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::fs::LocalHostFs;
use crate::infra::host::SystemHost;
use crate::output::{OutputContext, TerminalReporter};

/// Arguments for the maintain command.
#[derive(Args)]
pub struct MaintainArgs {
    /// Actually run the steps (default only lists them)
    #[arg(long)]
    pub exec: bool,
}

/// Run `hostprep maintain`.
///
/// # Errors
///
/// Returns an error if `--exec` is given without root privileges, or the
/// configuration or confirmation prompt fails.
pub async fn run(app: &AppContext, args: &MaintainArgs) -> Result<()> {
    if !args.exec {
        print_plan(&app.output);
        return Ok(());
    }

    let config = app.config()?;
    let host = SystemHost::new(TokioCommandRunner::default(), &config.ssh.daemon_binary);
    if !host.is_root().await? {
        return Err(ValidationError::Privilege.into());
    }
    if !app.confirm("Run maintenance on this host now?", true)? {
        app.output.info("Cancelled.");
        return Ok(());
    }

    let reporter = TerminalReporter::new(&app.output);
    let report = run_maintenance(
        &TokioCommandRunner::default(),
        &LocalHostFs,
        &reporter,
        &config.maintenance,
    )
    .await;
    print_report(&app.output, &report);
    Ok(())
}

fn print_plan(ctx: &OutputContext) {
    if ctx.quiet {
        return;
    }
    ctx.header("Maintenance plan (dry run)");
    for (i, step) in MaintenanceStep::ALL.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step.describe());
    }
    println!();
    ctx.info("Run `hostprep maintain --exec` as root to apply.");
}

fn print_report(ctx: &OutputContext, report: &MaintenanceReport) {
    if !ctx.quiet {
        println!();
        ctx.header("Maintenance summary");
    }
    for (step, outcome) in &report.steps {
        match outcome {
            StepOutcome::Ok(msg) => ctx.success(&format!("{}: {msg}", step.describe())),
            StepOutcome::Skipped(why) => ctx.info(&format!("{}: skipped ({why})", step.describe())),
            StepOutcome::Failed(why) => ctx.error(&format!("{}: {why}", step.describe())),
        }
    }
    for unit in &report.failed_units {
        ctx.warn(&format!("failed unit: {unit}"));
    }
    if report.reboot_required {
        ctx.warn("A reboot is required to finish applying updates.");
    }
    let failures = report.failures();
    if failures > 0 {
        ctx.warn(&format!("{failures} step(s) failed; see messages above."));
    }
}
