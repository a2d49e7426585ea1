//! Working-copy administrative area.
//!
//! Holds the on-disk layout of the per-directory admin area, the entries
//! model, and the collaborator traits the access batons are built on, plus
//! the file-backed store implementing them.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod adm;
pub mod entries;
pub mod log;
pub mod store;

pub use adm::{
    adm_area_exists, adm_child, create_adm_area, is_locked, LockMarker, ADM_DIR_NAME, LOCK_FILE,
    LOG_FILE,
};
pub use entries::{Depth, Entries, EntryMetadata, PropMap, THIS_DIR};
pub use log::LogCommand;
pub use store::{AdmStore, FsAdmStore, FsDbHandle, LogExecutor, MetadataHandle, MetadataReader};

/// Newest admin-area format; opening older formats for writing upgrades them.
pub const CURRENT_FORMAT: u32 = 10;
/// Oldest format that can still be read (and upgraded).
pub const MIN_SUPPORTED_FORMAT: u32 = 2;
/// Last format that kept wc properties in one file per entry.
pub const WCPROPS_MANY_FILES_FORMAT: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    None,
    File,
    Dir,
}

/// Report what kind of node, if any, lives at `path`. Symlinks are followed.
pub fn check_path_kind(path: &Path) -> Result<NodeKind> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(NodeKind::Dir),
        Ok(_) => Ok(NodeKind::File),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            Ok(NodeKind::None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Lexically normalize `path` into an absolute path without `.`/`..` parts.
///
/// Symlinks are not resolved so registry keys match what callers passed in.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Final component of `path` as text, or `""` for a root.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}
