//! Application service: single-host maintenance routine.
//!
//! Runs package, container, kernel, journal and snap housekeeping in a fixed
//! order. Every step is best-effort: a failure is recorded in the report and
//! the routine moves on.

use std::time::Duration;

use crate::application::ports::{CommandRunner, HostFs, ProgressReporter};
use crate::domain::config::MaintenanceConfig;
use crate::domain::maintenance::{
    MaintenanceReport, MaintenanceStep, StepOutcome, disabled_snaps, failed_units,
    installed_packages, kernels_to_remove,
};

/// Package manager operations can run for a long time on a stale host.
pub const PACKAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const APT: &[&str] = &["env", "DEBIAN_FRONTEND=noninteractive", "apt-get"];

/// Run every maintenance step and collect the outcomes.
pub async fn run_maintenance(
    runner: &impl CommandRunner,
    fs: &impl HostFs,
    reporter: &impl ProgressReporter,
    config: &MaintenanceConfig,
) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    for step in MaintenanceStep::ALL {
        reporter.step(&format!("{}...", step.describe()));
        let outcome = match step {
            MaintenanceStep::RefreshIndex => apt(runner, &["update"]).await,
            MaintenanceStep::Upgrade => {
                apt(
                    runner,
                    &["-y", "-o", "Dpkg::Options::=--force-confold", "upgrade"],
                )
                .await
            }
            MaintenanceStep::CleanCache => apt(runner, &["clean"]).await,
            MaintenanceStep::Autoremove => apt(runner, &["-y", "autoremove"]).await,
            MaintenanceStep::PruneContainers => prune_containers(runner).await,
            MaintenanceStep::PurgeOldKernels => {
                purge_old_kernels(runner, config.kernels_to_keep).await
            }
            MaintenanceStep::TrimJournal => {
                let arg = format!("--vacuum-time={}", config.journal_retention);
                run_step(runner, "journalctl", &[&arg], None).await
            }
            MaintenanceStep::RemoveDisabledSnaps => remove_disabled_snaps(runner).await,
            MaintenanceStep::ReportFailedServices => {
                let (outcome, units) = report_failed_services(runner).await;
                report.failed_units = units;
                outcome
            }
            MaintenanceStep::CheckRebootRequired => {
                report.reboot_required = fs.exists(&config.reboot_required_path);
                if report.reboot_required {
                    StepOutcome::Ok("reboot required".to_string())
                } else {
                    StepOutcome::Ok("no reboot required".to_string())
                }
            }
        };

        match &outcome {
            StepOutcome::Ok(msg) => reporter.success(&format!("{}: {msg}", step.describe())),
            StepOutcome::Skipped(why) => {
                reporter.step(&format!("{}: skipped ({why})", step.describe()));
            }
            StepOutcome::Failed(why) => {
                tracing::warn!(?step, error = %why, "maintenance step failed");
                reporter.warn(&format!("{}: {why}", step.describe()));
            }
        }
        report.steps.push((step, outcome));
    }

    report
}

async fn apt(runner: &impl CommandRunner, args: &[&str]) -> StepOutcome {
    let full: Vec<&str> = APT[1..].iter().chain(args).copied().collect();
    run_step(runner, APT[0], &full, Some(PACKAGE_TIMEOUT)).await
}

/// Run one command; success maps to `Ok("done")`, everything else to `Failed`.
async fn run_step(
    runner: &impl CommandRunner,
    program: &str,
    args: &[&str],
    timeout: Option<Duration>,
) -> StepOutcome {
    tracing::debug!(program, ?args, "running maintenance command");
    let result = match timeout {
        Some(t) => runner.run_with_timeout(program, args, t).await,
        None => runner.run(program, args).await,
    };
    match result {
        Ok(out) if out.status.success() => StepOutcome::Ok("done".to_string()),
        Ok(out) => StepOutcome::Failed(failure_text(program, &out)),
        Err(e) => StepOutcome::Failed(format!("{e:#}")),
    }
}

fn failure_text(program: &str, out: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let first = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    match out.status.code() {
        Some(code) if first.is_empty() => format!("{program} exited with status {code}"),
        Some(code) => format!("{program} exited with status {code}: {first}"),
        None => format!("{program} was terminated by a signal"),
    }
}

/// `true` when `program --version` can be spawned and succeeds.
async fn is_installed(runner: &impl CommandRunner, program: &str) -> bool {
    runner
        .run(program, &["--version"])
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn prune_containers(runner: &impl CommandRunner) -> StepOutcome {
    if !is_installed(runner, "docker").await {
        return StepOutcome::Skipped("docker not installed".to_string());
    }
    let prunes: [&[&str]; 3] = [
        &["container", "prune", "-f"],
        &["image", "prune", "-af"],
        &["volume", "prune", "-f"],
    ];
    let mut failures = Vec::new();
    for args in prunes {
        if let StepOutcome::Failed(why) = run_step(runner, "docker", args, None).await {
            failures.push(why);
        }
    }
    if failures.is_empty() {
        StepOutcome::Ok("done".to_string())
    } else {
        StepOutcome::Failed(failures.join("; "))
    }
}

async fn purge_old_kernels(runner: &impl CommandRunner, keep: usize) -> StepOutcome {
    let running = match runner.run("uname", &["-r"]).await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => return StepOutcome::Failed(failure_text("uname", &out)),
        Err(e) => return StepOutcome::Failed(format!("{e:#}")),
    };
    let listing = match runner
        .run(
            "dpkg-query",
            &["-W", "-f=${db:Status-Abbrev} ${Package}\n", "linux-image-[0-9]*"],
        )
        .await
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Err(e) => return StepOutcome::Failed(format!("{e:#}")),
    };

    let installed = installed_packages(&listing);
    let remove = kernels_to_remove(&installed, &running, keep);
    if remove.is_empty() {
        return StepOutcome::Ok(format!("nothing to remove (running {running})"));
    }
    tracing::info!(?remove, %running, "purging old kernels");

    let mut args = vec!["-y", "purge"];
    args.extend(remove.iter().map(String::as_str));
    match apt(runner, &args).await {
        StepOutcome::Ok(_) => StepOutcome::Ok(format!("removed {}", remove.join(", "))),
        other => other,
    }
}

async fn remove_disabled_snaps(runner: &impl CommandRunner) -> StepOutcome {
    if !is_installed(runner, "snap").await {
        return StepOutcome::Skipped("snap not installed".to_string());
    }
    let listing = match runner.run("snap", &["list", "--all"]).await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        Ok(out) => return StepOutcome::Failed(failure_text("snap", &out)),
        Err(e) => return StepOutcome::Failed(format!("{e:#}")),
    };

    let revisions = disabled_snaps(&listing);
    if revisions.is_empty() {
        return StepOutcome::Ok("no disabled revisions".to_string());
    }
    let mut failures = Vec::new();
    for rev in &revisions {
        let flag = format!("--revision={}", rev.revision);
        if let StepOutcome::Failed(why) =
            run_step(runner, "snap", &["remove", &rev.name, &flag], None).await
        {
            failures.push(why);
        }
    }
    if failures.is_empty() {
        StepOutcome::Ok(format!("removed {} revision(s)", revisions.len()))
    } else {
        StepOutcome::Failed(failures.join("; "))
    }
}

async fn report_failed_services(runner: &impl CommandRunner) -> (StepOutcome, Vec<String>) {
    match runner
        .run("systemctl", &["--failed", "--no-legend", "--plain"])
        .await
    {
        Ok(out) if out.status.success() => {
            let units = failed_units(&String::from_utf8_lossy(&out.stdout));
            let msg = if units.is_empty() {
                "no failed services".to_string()
            } else {
                format!("{} failed: {}", units.len(), units.join(", "))
            };
            (StepOutcome::Ok(msg), units)
        }
        Ok(out) => (StepOutcome::Failed(failure_text("systemctl", &out)), Vec::new()),
        Err(e) => (StepOutcome::Failed(format!("{e:#}")), Vec::new()),
    }
}
