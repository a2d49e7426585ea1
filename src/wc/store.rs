//! Collaborator traits consumed by the access batons, and their file-backed
//! implementation.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{
    adm::{
        adm_child, ENTRIES_FILE, FORMAT_FILE, LEGACY_DIR_WCPROPS_FILE, LEGACY_EMPTY_FILE,
        LEGACY_README_FILE, LEGACY_WCPROPS_DIR, LOG_FILE,
    },
    check_path_kind, display,
    entries::{Entries, PropMap, THIS_DIR},
    log::{self, LogCommand},
    NodeKind,
};
use crate::{Error, Result};

/// Read access to the metadata recorded in admin areas.
pub trait MetadataReader: Send + Sync {
    /// Format number of the admin area of `dir`.
    ///
    /// Fails with [`Error::NotAWorkingCopy`] when `dir` has no admin area.
    /// Returns `0` while an admin area is still being constructed.
    fn check_format(&self, dir: &Path) -> Result<u32>;

    fn read_entries(&self, dir: &Path) -> Result<Entries>;

    /// Versioned wc properties of entry `name` of `dir` (`""` for `dir` itself).
    fn read_versioned_props(&self, dir: &Path, name: &str) -> Result<PropMap>;

    /// Open the metadata handle shared by every baton of one access set.
    fn open_db(&self, root: &Path) -> Result<Box<dyn MetadataHandle>>;
}

pub trait MetadataHandle: Send {
    fn root(&self) -> &Path;

    fn close(&mut self) -> Result<()>;
}

/// Durable deferred-command execution.
pub trait LogExecutor: Send + Sync {
    fn write_log(&self, dir: &Path, commands: &[LogCommand]) -> Result<()>;

    fn run_log(&self, dir: &Path) -> Result<()>;

    /// Whether `dir` has a log left behind that must be replayed first.
    fn log_pending(&self, dir: &Path) -> Result<bool>;
}

pub trait AdmStore: MetadataReader + LogExecutor {
    /// Remove the files of the one-file-per-entry wc property layout.
    fn remove_legacy_props(&self, dir: &Path) -> Result<()>;
}

/// Store reading and writing the admin areas on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAdmStore;

impl FsAdmStore {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for FsAdmStore {
    fn check_format(&self, dir: &Path) -> Result<u32> {
        let contents = match fs::read_to_string(adm_child(dir, FORMAT_FILE)) {
            Ok(contents) => contents,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(Error::NotAWorkingCopy(display(dir)).into());
            }
            Err(err) => return Err(Error::Io(err).into()),
        };

        contents.trim().parse::<u32>().map_err(|_| {
            Error::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("invalid format file in '{}'", dir.display()),
            ))
            .into()
        })
    }

    fn read_entries(&self, dir: &Path) -> Result<Entries> {
        let data = fs::read(adm_child(dir, ENTRIES_FILE))?;
        let entries: Entries = serde_json::from_slice(&data)?;
        Ok(entries)
    }

    fn read_versioned_props(&self, dir: &Path, name: &str) -> Result<PropMap> {
        let legacy = if name == THIS_DIR {
            adm_child(dir, LEGACY_DIR_WCPROPS_FILE)
        } else {
            adm_child(dir, LEGACY_WCPROPS_DIR).join(name)
        };
        if check_path_kind(&legacy)? == NodeKind::File {
            let data = fs::read(&legacy)?;
            let props: PropMap = serde_json::from_slice(&data)?;
            return Ok(props);
        }

        let mut all = log::read_all_wcprops(dir)?;
        Ok(all.remove(name).unwrap_or_default())
    }

    fn open_db(&self, root: &Path) -> Result<Box<dyn MetadataHandle>> {
        debug!(root = %root.display(), "opened metadata handle");
        Ok(Box::new(FsDbHandle {
            root: root.to_path_buf(),
            open: true,
        }))
    }
}

impl LogExecutor for FsAdmStore {
    fn write_log(&self, dir: &Path, commands: &[LogCommand]) -> Result<()> {
        log::write(dir, commands)
    }

    fn run_log(&self, dir: &Path) -> Result<()> {
        log::run(dir)
    }

    fn log_pending(&self, dir: &Path) -> Result<bool> {
        Ok(check_path_kind(&adm_child(dir, LOG_FILE))? == NodeKind::File)
    }
}

impl AdmStore for FsAdmStore {
    fn remove_legacy_props(&self, dir: &Path) -> Result<()> {
        let mut first_err = None;

        if let Err(err) = fs::remove_dir_all(adm_child(dir, LEGACY_WCPROPS_DIR)) {
            first_err.get_or_insert(err);
        }
        for name in [
            LEGACY_DIR_WCPROPS_FILE,
            LEGACY_EMPTY_FILE,
            LEGACY_README_FILE,
        ] {
            if let Err(err) = fs::remove_file(adm_child(dir, name)) {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Metadata handle of [`FsAdmStore`]; records only where it was opened.
#[derive(Debug)]
pub struct FsDbHandle {
    root: PathBuf,
    open: bool,
}

impl MetadataHandle for FsDbHandle {
    fn root(&self) -> &Path {
        &self.root
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            debug!(root = %self.root.display(), "closed metadata handle");
        }
        Ok(())
    }
}
