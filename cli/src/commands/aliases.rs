//! `hostprep aliases [--install [<path>]]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::HostFs;
use crate::domain::aliases::{install_block, render_aliases};
use crate::infra::fs::LocalHostFs;

/// Arguments for the aliases command.
#[derive(Args)]
pub struct AliasesArgs {
    /// Write the aliases into a managed block of ~/.bash_aliases (or PATH)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub install: Option<Option<PathBuf>>,
}

/// Run `hostprep aliases`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined or the
/// aliases file cannot be read or written.
pub fn run(app: &AppContext, args: &AliasesArgs) -> Result<()> {
    let Some(target) = &args.install else {
        print!("{}", render_aliases());
        return Ok(());
    };
    let path = match target {
        Some(path) => path.clone(),
        None => dirs::home_dir()
            .context("cannot determine home directory")?
            .join(".bash_aliases"),
    };
    install(&LocalHostFs, &path)?;
    app.output
        .success(&format!("Aliases installed in {}", path.display()));
    app.output
        .info(&format!("Load them now with: source {}", path.display()));
    Ok(())
}

/// Replace (or append) the managed block in `path`, creating the file if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn install(fs: &impl HostFs, path: &std::path::Path) -> Result<()> {
    if fs.exists(path) {
        let current = fs.read_to_string(path)?;
        let updated = install_block(&current);
        if updated != current {
            fs.replace(path, &updated)?;
        }
    } else {
        fs.write(path, &install_block(""))?;
    }
    tracing::info!(path = %path.display(), "aliases installed");
    Ok(())
}
