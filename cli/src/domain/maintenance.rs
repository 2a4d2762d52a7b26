//! Pure helpers for the maintenance routine: step catalogue, kernel retention,
//! and parsers for `snap` / `systemctl` listings.

use std::cmp::Ordering;

/// Maintenance steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStep {
    RefreshIndex,
    Upgrade,
    CleanCache,
    Autoremove,
    PruneContainers,
    PurgeOldKernels,
    TrimJournal,
    RemoveDisabledSnaps,
    ReportFailedServices,
    CheckRebootRequired,
}

impl MaintenanceStep {
    pub const ALL: [Self; 10] = [
        Self::RefreshIndex,
        Self::Upgrade,
        Self::CleanCache,
        Self::Autoremove,
        Self::PruneContainers,
        Self::PurgeOldKernels,
        Self::TrimJournal,
        Self::RemoveDisabledSnaps,
        Self::ReportFailedServices,
        Self::CheckRebootRequired,
    ];

    /// Human description shown in the dry-run listing and in reports.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::RefreshIndex => "Refresh package index",
            Self::Upgrade => "Upgrade installed packages",
            Self::CleanCache => "Clean package cache",
            Self::Autoremove => "Remove unused packages",
            Self::PruneContainers => "Prune Docker containers, images and volumes",
            Self::PurgeOldKernels => "Purge old kernels (keep newest and running)",
            Self::TrimJournal => "Trim systemd journal",
            Self::RemoveDisabledSnaps => "Remove disabled snap revisions",
            Self::ReportFailedServices => "Report failed services",
            Self::CheckRebootRequired => "Check whether a reboot is required",
        }
    }
}

/// Result of a single maintenance step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ok(String),
    Skipped(String),
    Failed(String),
}

/// Per-step outcomes of one maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub steps: Vec<(MaintenanceStep, StepOutcome)>,
    pub failed_units: Vec<String>,
    pub reboot_required: bool,
}

impl MaintenanceReport {
    #[must_use]
    pub fn outcome(&self, step: MaintenanceStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| matches!(o, StepOutcome::Failed(_)))
            .count()
    }
}

// ── Kernel retention ─────────────────────────────────────────────────────────

const KERNEL_PREFIX: &str = "linux-image-";

/// Kernel release embedded in a `linux-image-<release>` package name.
#[must_use]
pub fn kernel_release(package: &str) -> Option<&str> {
    package
        .strip_prefix(KERNEL_PREFIX)
        .filter(|r| r.starts_with(|c: char| c.is_ascii_digit()))
}

/// Orders kernel releases by their numeric components (`6.8.0-45` < `6.8.0-100`).
#[must_use]
pub fn compare_releases(a: &str, b: &str) -> Ordering {
    let nums = |s: &str| -> Vec<u64> {
        s.split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse().ok())
            .collect()
    };
    nums(a).cmp(&nums(b)).then_with(|| a.cmp(b))
}

/// Kernel packages to purge: everything except the `keep` newest releases
/// and the running kernel. Non-kernel package names are ignored.
#[must_use]
pub fn kernels_to_remove(installed: &[String], running: &str, keep: usize) -> Vec<String> {
    let mut kernels: Vec<(&str, &String)> = installed
        .iter()
        .filter_map(|pkg| kernel_release(pkg).map(|r| (r, pkg)))
        .collect();
    kernels.sort_by(|a, b| compare_releases(b.0, a.0));
    kernels
        .into_iter()
        .skip(keep)
        .filter(|(release, _)| *release != running)
        .map(|(_, pkg)| pkg.clone())
        .collect()
}

// ── Listing parsers ──────────────────────────────────────────────────────────

/// Package names from `dpkg-query -W -f='${db:Status-Abbrev} ${Package}\n'`
/// whose status is installed (`ii`); removed-but-configured entries are dropped.
#[must_use]
pub fn installed_packages(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let status = cols.next()?;
            let package = cols.next()?;
            status.starts_with("ii").then(|| package.to_string())
        })
        .collect()
}

/// A snap revision marked `disabled` in `snap list --all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapRevision {
    pub name: String,
    pub revision: String,
}

/// Parses `snap list --all` and returns the disabled revisions.
#[must_use]
pub fn disabled_snaps(listing: &str) -> Vec<SnapRevision> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let notes = cols.last()?;
            if cols.len() < 3 || !notes.split(',').any(|n| n == "disabled") {
                return None;
            }
            Some(SnapRevision {
                name: cols[0].to_string(),
                revision: cols[2].to_string(),
            })
        })
        .collect()
}

/// Unit names from `systemctl --failed --no-legend --plain`.
#[must_use]
pub fn failed_units(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|l| l.trim_start().trim_start_matches('●').split_whitespace().next())
        .map(str::to_string)
        .collect()
}
