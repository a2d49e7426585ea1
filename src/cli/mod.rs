//! Administrative command line; subcommands live here.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use crate::{access::AccessManager, config, Result};

pub mod cleanup;
pub mod id;
pub mod lock;
pub mod status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub enum Command {
    Id(id::IdArgs),
    Status(status::StatusArgs),
    Lock(lock::LockArgs),
    Cleanup(cleanup::CleanupArgs),
    None,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub command: Command,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            command: Command::None,
        }
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Id(i) => id::execute(i),
        Command::Status(s) => status::execute(&manager(args.config)?, s),
        Command::Lock(l) => lock::execute(&manager(args.config)?, l),
        Command::Cleanup(c) => cleanup::execute(&manager(args.config)?, c),
        Command::None => Ok(()),
    }
}

fn manager(config_path: Option<PathBuf>) -> Result<AccessManager> {
    let config = config::load_or_default(config_path.as_deref())?;
    Ok(AccessManager::with_fs_store(config))
}

#[derive(Parser, Debug)]
#[command(name = "wcadm", version, about = "Working-copy admin area and lock tool")]
struct Cli {
    /// JSON file with access settings (target format, upgrade on open).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Decode a node-revision identifier.
    Id(id::IdArgs),
    /// Show lock and format state of a working copy.
    Status(status::StatusArgs),
    /// Write-lock a working copy and leave the locks in place.
    Lock(lock::LockArgs),
    /// Take over stale locks, replay pending logs and release the locks.
    Cleanup(cleanup::CleanupArgs),
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);
    let command = match cli.command {
        Some(Subcommands::Id(args)) => Command::Id(args),
        Some(Subcommands::Status(args)) => Command::Status(args),
        Some(Subcommands::Lock(args)) => Command::Lock(args),
        Some(Subcommands::Cleanup(args)) => Command::Cleanup(args),
        None => Command::None,
    };

    Ok(CliArgs {
        config: cli.config,
        command,
    })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
