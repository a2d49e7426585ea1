//! Implementation of `wcadm cleanup` subcommand.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{debug, info};

use crate::{
    access::AccessManager,
    wc::{entries::lockable_subdirs, normalize_path},
    Error, Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct CleanupArgs {
    /// Working-copy directory to clean up, with all its subdirectories
    pub path: Option<PathBuf>,
}

pub fn execute(manager: &AccessManager, args: CleanupArgs) -> Result<()> {
    let path = args.path.ok_or_else(|| Error::Cli("path is required".into()))?;
    let path = normalize_path(&path)?;

    let cleaned = cleanup_dir(manager, &path)?;
    info!(path = %path.display(), dirs = cleaned, "cleanup finished");
    Ok(())
}

/// Steal the lock of `dir`, replay its log and release it, then do the same
/// for every versioned subdirectory. Returns the number of directories done.
pub fn cleanup_dir(manager: &AccessManager, dir: &Path) -> Result<usize> {
    let guard = manager.steal_write_lock(dir)?;
    if guard.is_stolen() {
        info!(path = %dir.display(), "removed stale lock");
    }
    guard.run_log()?;
    let entries = guard.entries()?;
    guard.close(false)?;

    let mut cleaned = 1;
    for (child, _) in lockable_subdirs(dir, &entries) {
        match cleanup_dir(manager, &child) {
            Ok(count) => cleaned += count,
            Err(err) if Error::is_not_a_working_copy(&err) => {
                debug!(path = %child.display(), "skipping unversioned or missing subdirectory");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(cleaned)
}
