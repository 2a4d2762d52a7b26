//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags};
use crate::commands;

/// Provision SSH accounts and maintain a single Linux host
#[derive(Parser)]
#[command(
    name = "hostprep",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file [default: $HOSTPREP_CONFIG or /etc/hostprep/config.yaml]
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a user, harden sshd, and roll everything back on failure
    Setup(commands::setup::SetupCmd),

    /// Run routine package, kernel, journal and container housekeeping
    Maintain(commands::maintain::MaintainArgs),

    /// Print or install operator shell aliases
    Aliases(commands::aliases::AliasesArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            config,
            quiet,
            no_color,
            yes,
            command,
        } = self;
        let app = AppContext::new(AppFlags {
            config,
            no_color,
            quiet,
            yes,
        });

        match command {
            Command::Setup(args) => commands::setup::run(&app, args).await,
            Command::Maintain(args) => commands::maintain::run(&app, &args).await,
            Command::Aliases(args) => commands::aliases::run(&app, &args),
            Command::Version => {
                commands::version::run();
                Ok(())
            }
        }
    }
}
