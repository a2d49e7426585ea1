//! Implementation of `wcadm lock` subcommand.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::{
    access::{AccessManager, LockDepth},
    Error, Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct LockArgs {
    /// Working-copy directory to lock
    pub path: Option<PathBuf>,

    /// Levels of subdirectories to lock, or `infinity`
    #[arg(long = "depth", default_value = "infinity")]
    pub depth: LockDepth,
}

pub fn execute(manager: &AccessManager, args: LockArgs) -> Result<()> {
    let path = args.path.ok_or_else(|| Error::Cli("path is required".into()))?;
    let guard = manager.open(&path, true, args.depth, None)?;

    let locked = guard.registered_paths();
    for dir in &locked {
        if !guard.is_missing(dir) {
            println!("{}", dir.display());
        }
    }
    info!(path = %path.display(), depth = %args.depth, dirs = locked.len(), "locks left in place");

    guard.close(true)
}
