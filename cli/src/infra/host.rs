//! Host system tools: implements the account, service, privilege and
//! daemon-check ports by running the standard Debian/Ubuntu utilities.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};

use crate::application::ports::{
    AccountManager, CommandRunner, ConfigCheck, DaemonConfigChecker, PrivilegeProbe,
    ServiceManager,
};
use crate::domain::AuthMode;

/// Runs `adduser`, `usermod`, `systemctl`, `sshd -t` and friends through a
/// `CommandRunner`.
pub struct SystemHost<R: CommandRunner> {
    runner: R,
    daemon_binary: String,
}

impl<R: CommandRunner> SystemHost<R> {
    #[must_use]
    pub fn new(runner: R, daemon_binary: &str) -> Self {
        Self {
            runner,
            daemon_binary: daemon_binary.to_string(),
        }
    }

    async fn run_checked(&self, program: &str, args: &[&str]) -> Result<Output> {
        let out = self.runner.run(program, args).await?;
        ensure_success(program, &out)?;
        Ok(out)
    }
}

/// Turns a non-zero exit into an error carrying the command's stderr.
fn ensure_success(program: &str, out: &Output) -> Result<()> {
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    match out.status.code() {
        Some(code) if stderr.is_empty() => anyhow::bail!("{program} exited with status {code}"),
        Some(code) => anyhow::bail!("{program} exited with status {code}: {stderr}"),
        None => anyhow::bail!("{program} was terminated by a signal"),
    }
}

/// Home directory field of a `getent passwd` record.
fn home_from_passwd(record: &str) -> Option<PathBuf> {
    record
        .lines()
        .next()?
        .split(':')
        .nth(5)
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

impl<R: CommandRunner> PrivilegeProbe for SystemHost<R> {
    async fn is_root(&self) -> Result<bool> {
        let out = self.run_checked("id", &["-u"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim() == "0")
    }
}

impl<R: CommandRunner> AccountManager for SystemHost<R> {
    async fn exists(&self, username: &str) -> Result<bool> {
        let out = self.runner.run("getent", &["passwd", username]).await?;
        // getent exits 2 when the key is not found.
        match out.status.code() {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => ensure_success("getent", &out).map(|()| false),
        }
    }

    async fn create(&self, username: &str, auth: AuthMode) -> Result<()> {
        match auth {
            AuthMode::Key => {
                self.run_checked(
                    "adduser",
                    &["--disabled-password", "--gecos", "", username],
                )
                .await?;
            }
            AuthMode::Password => {
                // Inherited stdio: adduser prompts for the password itself.
                let status = self
                    .runner
                    .run_status("adduser", &["--gecos", "", username])
                    .await?;
                anyhow::ensure!(status.success(), "adduser exited with {status}");
            }
        }
        tracing::info!(username, ?auth, "account created");
        Ok(())
    }

    async fn add_to_group(&self, username: &str, group: &str) -> Result<()> {
        self.run_checked("usermod", &["-aG", group, username]).await?;
        Ok(())
    }

    async fn home_dir(&self, username: &str) -> Result<PathBuf> {
        let out = self.run_checked("getent", &["passwd", username]).await?;
        home_from_passwd(&String::from_utf8_lossy(&out.stdout))
            .with_context(|| format!("no home directory recorded for {username}"))
    }

    async fn chown_recursive(&self, path: &Path, username: &str) -> Result<()> {
        let owner = format!("{username}:{username}");
        let path = path.to_string_lossy();
        self.run_checked("chown", &["-R", &owner, &path]).await?;
        Ok(())
    }

    async fn remove(&self, username: &str) -> Result<()> {
        self.run_checked("userdel", &["--force", "--remove", username])
            .await?;
        tracing::info!(username, "account removed");
        Ok(())
    }
}

impl<R: CommandRunner> ServiceManager for SystemHost<R> {
    async fn daemon_reload(&self) -> Result<()> {
        self.run_checked("systemctl", &["daemon-reload"]).await?;
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<()> {
        self.run_checked("systemctl", &["restart", unit]).await?;
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        let out = self
            .runner
            .run("systemctl", &["is-active", "--quiet", unit])
            .await?;
        Ok(out.status.success())
    }

    async fn unit_exists(&self, unit: &str) -> Result<bool> {
        let out = self
            .runner
            .run("systemctl", &["list-unit-files", "--no-legend", unit])
            .await?;
        Ok(out.status.success() && !String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }
}

impl<R: CommandRunner> DaemonConfigChecker for SystemHost<R> {
    async fn check_config(&self, path: &Path) -> Result<ConfigCheck> {
        let path = path.to_string_lossy();
        let out = self
            .runner
            .run(&self.daemon_binary, &["-t", "-f", &path])
            .await?;
        if out.status.success() {
            return Ok(ConfigCheck::Valid);
        }
        let mut diagnostic = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = String::from_utf8_lossy(&out.stdout).trim().to_string();
        }
        Ok(ConfigCheck::Invalid(diagnostic))
    }
}
