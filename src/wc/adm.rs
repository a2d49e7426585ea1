use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    check_path_kind, display,
    entries::{Entries, EntryMetadata},
    NodeKind,
};
use crate::{Error, Result};

pub const ADM_DIR_NAME: &str = ".wc";
pub const FORMAT_FILE: &str = "format";
pub const ENTRIES_FILE: &str = "entries";
pub const LOCK_FILE: &str = "lock";
pub const LOG_FILE: &str = "log";
pub const ALL_WCPROPS_FILE: &str = "all-wcprops";
pub const LEGACY_WCPROPS_DIR: &str = "wcprops";
pub const LEGACY_DIR_WCPROPS_FILE: &str = "dir-wcprops";
pub const LEGACY_EMPTY_FILE: &str = "empty-file";
pub const LEGACY_README_FILE: &str = "README.txt";

/// Contents of a lock file. Only the file's existence carries meaning; the
/// marker helps an operator find out who left a lock behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockMarker {
    pub owner: Uuid,
    pub pid: u32,
}

impl LockMarker {
    pub fn current() -> Self {
        Self {
            owner: Uuid::new_v4(),
            pid: std::process::id(),
        }
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let data = fs::read(adm_child(dir, LOCK_FILE))?;
        let marker: LockMarker = serde_json::from_slice(&data)?;
        Ok(marker)
    }
}

/// Path of `name` inside the admin area of `dir`.
pub fn adm_child(dir: &Path, name: &str) -> PathBuf {
    let adm = dir.join(ADM_DIR_NAME);
    if name.is_empty() {
        adm
    } else {
        adm.join(name)
    }
}

pub fn adm_area_exists(dir: &Path) -> bool {
    adm_child(dir, "").is_dir()
}

/// Exclusively create the lock file of `dir`.
///
/// Fails with [`Error::Locked`] when the lock file already exists.
pub fn create_lock(dir: &Path) -> Result<()> {
    create_lock_with(dir, |file| {
        let data = serde_json::to_vec(&LockMarker::current()).map_err(Error::from)?;
        file.write_all(&data).map_err(Error::from)?;
        Ok(())
    })
}

fn create_lock_with(dir: &Path, write_marker: impl FnOnce(&mut fs::File) -> Result<()>) -> Result<()> {
    let lock_path = adm_child(dir, LOCK_FILE);
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::Locked(display(dir)).into());
        }
        Err(err) => return Err(Error::Io(err).into()),
    };

    if let Err(err) = write_marker(&mut file) {
        drop(file);
        if let Err(remove_err) = fs::remove_file(&lock_path) {
            warn!(dir = %dir.display(), error = %remove_err, "failed to remove partial lock file");
        }
        return Err(err);
    }
    debug!(dir = %dir.display(), "created lock file");
    Ok(())
}

pub fn remove_lock(dir: &Path) -> Result<()> {
    fs::remove_file(adm_child(dir, LOCK_FILE))?;
    debug!(dir = %dir.display(), "removed lock file");
    Ok(())
}

/// Whether `dir` carries a physical write lock.
pub fn is_locked(dir: &Path) -> Result<bool> {
    let lock_path = adm_child(dir, LOCK_FILE);
    match check_path_kind(&lock_path)? {
        NodeKind::File => Ok(true),
        NodeKind::None => Ok(false),
        NodeKind::Dir => Err(Error::LockNotFile(display(&lock_path)).into()),
    }
}

pub fn write_format(dir: &Path, format: u32) -> Result<()> {
    fs::write(adm_child(dir, FORMAT_FILE), format!("{format}\n"))?;
    Ok(())
}

pub fn write_entries(dir: &Path, entries: &Entries) -> Result<()> {
    let data = serde_json::to_vec_pretty(entries)?;
    fs::write(adm_child(dir, ENTRIES_FILE), data)?;
    Ok(())
}

/// Create the admin area of `dir` with only its own entry recorded.
///
/// The directory itself is created when missing. The format file is written
/// last, so a partially created area is not taken for a working copy.
pub fn create_adm_area(
    dir: &Path,
    format: u32,
    url: Option<&str>,
    revision: Option<u64>,
) -> Result<()> {
    fs::create_dir_all(adm_child(dir, ""))?;
    let mut entries = Entries::new();
    let this_dir = EntryMetadata::this_dir(url.map(str::to_string), revision);
    entries.insert(this_dir.name.clone(), this_dir);
    write_entries(dir, &entries)?;
    write_format(dir, format)?;
    debug!(dir = %dir.display(), format, "created admin area");
    Ok(())
}
