//! Rollback ledger: what a provisioning run has done so far.
//!
//! The ledger is a plain value. Each successful mutation step consumes the
//! previous ledger and returns a new one with its own entry recorded; the
//! failure path hands the last ledger to the rollback routine.

use std::path::{Path, PathBuf};

/// Pre-edit copy of the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Where the copy lives.
    pub path: PathBuf,
    /// Hex SHA-256 of the copied bytes.
    pub sha256: String,
}

/// Completed mutations of one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackLedger {
    snapshot: Option<Snapshot>,
    account: Option<String>,
    sudoers_line: Option<String>,
}

impl RollbackLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..self
        }
    }

    #[must_use]
    pub fn with_account(self, username: &str) -> Self {
        Self {
            account: Some(username.to_string()),
            ..self
        }
    }

    #[must_use]
    pub fn with_sudoers_line(self, line: &str) -> Self {
        Self {
            sudoers_line: Some(line.to_string()),
            ..self
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_ref().map(|s| s.path.as_path())
    }

    /// Username of the account created by this run, if any.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    #[must_use]
    pub fn account_created(&self) -> bool {
        self.account.is_some()
    }

    /// Exact policy line appended by this run, if any.
    #[must_use]
    pub fn sudoers_line(&self) -> Option<&str> {
        self.sudoers_line.as_deref()
    }

    #[must_use]
    pub fn sudoers_modified(&self) -> bool {
        self.sudoers_line.is_some()
    }

    /// `true` when there is nothing to undo.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.account.is_none() && self.sudoers_line.is_none()
    }
}

/// The passwordless sudo policy line for `username`.
#[must_use]
pub fn sudoers_entry(username: &str) -> String {
    format!("{username} ALL=(ALL) NOPASSWD:ALL")
}

/// Removes every line equal to `line` from a policy document, keeping the rest
/// byte-for-byte. Returns `None` when the line is not present.
#[must_use]
pub fn remove_policy_line(document: &str, line: &str) -> Option<String> {
    let mut found = false;
    let kept: String = document
        .split_inclusive('\n')
        .filter(|l| {
            let hit = l.trim_end_matches(['\n', '\r']) == line;
            found |= hit;
            !hit
        })
        .collect();
    found.then_some(kept)
}

/// Appends `line` to a policy document, adding a separating newline when the
/// document does not end with one.
#[must_use]
pub fn append_policy_line(document: &str, line: &str) -> String {
    let mut out = document.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}
