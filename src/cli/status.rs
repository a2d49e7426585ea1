//! Implementation of `wcadm status` subcommand.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use super::OutputFormat;
use crate::{
    access::{AccessManager, AdmAccess, LockDepth},
    wc::{adm_child, check_path_kind, is_locked, LockMarker, NodeKind, LOG_FILE},
    Error, Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct StatusArgs {
    /// Working-copy directory to inspect
    pub path: Option<PathBuf>,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirStatus {
    pub path: PathBuf,
    pub missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<u32>,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<LockMarker>,
    pub cleanup_required: bool,
}

fn dir_status(root: &AdmAccess, path: &Path) -> Result<DirStatus> {
    if root.is_missing(path) {
        return Ok(DirStatus {
            path: path.to_path_buf(),
            missing: true,
            format: None,
            locked: false,
            lock_owner: None,
            cleanup_required: false,
        });
    }

    let access = root.retrieve(path)?;
    let locked = is_locked(path)?;
    Ok(DirStatus {
        path: path.to_path_buf(),
        missing: false,
        format: Some(access.format()),
        locked,
        // Markers are diagnostics only; an unreadable one is not an error.
        lock_owner: if locked { LockMarker::read(path).ok() } else { None },
        cleanup_required: check_path_kind(&adm_child(path, LOG_FILE))? == NodeKind::File,
    })
}

pub fn execute(manager: &AccessManager, args: StatusArgs) -> Result<()> {
    let path = args.path.ok_or_else(|| Error::Cli("path is required".into()))?;
    let guard = manager.open(&path, false, LockDepth::Infinite, None)?;

    let statuses = guard
        .registered_paths()
        .iter()
        .map(|dir| dir_status(&guard, dir))
        .collect::<Result<Vec<_>>>()?;
    guard.close(false)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Text => {
            for status in &statuses {
                if status.missing {
                    println!("{}  missing", status.path.display());
                    continue;
                }
                let mut line = format!(
                    "{}  format {}",
                    status.path.display(),
                    status.format.unwrap_or_default()
                );
                if status.locked {
                    line.push_str("  locked");
                    if let Some(owner) = &status.lock_owner {
                        line.push_str(&format!(" (pid {})", owner.pid));
                    }
                }
                if status.cleanup_required {
                    line.push_str("  cleanup required");
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}
