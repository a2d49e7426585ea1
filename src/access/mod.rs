//! Access batons over working-copy directories.
//!
//! A baton grants read-only or write-locked access to the admin area of one
//! directory. Batons opened together for one logical operation are joined
//! into a shared access set keyed by path, so that any of them can find its
//! siblings and closing a baton also closes the batons nested below it.
//!
//! The write lock itself is a file inside the admin area; its existence is
//! the only cross-process exclusion mechanism.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::{
    config::AccessConfig,
    wc::{normalize_path, AdmStore, FsAdmStore},
    Error, Result,
};

pub mod anchor;
pub mod baton;
pub mod close;
pub mod extend;
pub mod open;
pub mod registry;
pub mod retrieve;

pub use anchor::Anchor;
pub use baton::{AdmAccess, LockState};
pub use close::AccessGuard;

/// Polled between recursive steps; an error aborts the enclosing operation.
pub type CancelCheck<'a> = Option<&'a dyn Fn() -> Result<()>>;

/// How many levels of subdirectories a recursive open should lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockDepth {
    #[default]
    Infinite,
    Levels(u32),
}

impl LockDepth {
    pub const ZERO: LockDepth = LockDepth::Levels(0);

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Depth to use one level further down. `Infinite` stays infinite.
    pub fn descend(self) -> Self {
        match self {
            LockDepth::Infinite => LockDepth::Infinite,
            LockDepth::Levels(n) => LockDepth::Levels(n.saturating_sub(1)),
        }
    }
}

impl FromStr for LockDepth {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "infinity" | "infinite" | "-1" => Ok(LockDepth::Infinite),
            other => other
                .parse::<u32>()
                .map(LockDepth::Levels)
                .map_err(|_| Error::Cli(format!("invalid lock depth: {other}"))),
        }
    }
}

impl fmt::Display for LockDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockDepth::Infinite => f.write_str("infinity"),
            LockDepth::Levels(n) => write!(f, "{n}"),
        }
    }
}

pub(crate) struct AccessContext {
    pub(crate) store: Arc<dyn AdmStore>,
    pub(crate) config: AccessConfig,
}

/// Opens access batons against one admin-area store.
#[derive(Clone)]
pub struct AccessManager {
    ctx: Arc<AccessContext>,
}

impl AccessManager {
    pub fn new(store: Arc<dyn AdmStore>, config: AccessConfig) -> Self {
        Self {
            ctx: Arc::new(AccessContext { store, config }),
        }
    }

    pub fn with_fs_store(config: AccessConfig) -> Self {
        Self::new(Arc::new(FsAdmStore::new()), config)
    }

    pub fn config(&self) -> &AccessConfig {
        &self.ctx.config
    }

    /// Open `path`, and up to `depth` levels of versioned subdirectories.
    ///
    /// Fails with [`Error::NotAWorkingCopy`] when `path` has no admin area and
    /// with [`Error::Locked`] when a write lock is requested but already held.
    pub fn open(
        &self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelCheck<'_>,
    ) -> Result<AccessGuard> {
        let path = normalize_path(path.as_ref())?;
        let access = open::do_open(&self.ctx, &path, write_lock, depth, cancel)?;
        Ok(AccessGuard::new(access))
    }

    /// Open `path` and join it into the access set of `associated`.
    ///
    /// The new baton is torn down together with the set of `associated`.
    pub fn open_in(
        &self,
        associated: &AdmAccess,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelCheck<'_>,
    ) -> Result<AdmAccess> {
        let path = normalize_path(path.as_ref())?;
        open::open_in(&self.ctx, Some(associated), &path, write_lock, depth, cancel)
    }

    /// Write-lock a directory whose admin area is still being created.
    pub fn pre_open(&self, path: impl AsRef<Path>) -> Result<AccessGuard> {
        let path = normalize_path(path.as_ref())?;
        let access = AdmAccess::alloc(self.ctx.clone(), path, true)?;
        Ok(AccessGuard::new(access))
    }

    /// Write-lock `path`, taking over a lock left by somebody else.
    pub fn steal_write_lock(&self, path: impl AsRef<Path>) -> Result<AccessGuard> {
        let path = normalize_path(path.as_ref())?;
        let access = open::steal_write_lock(&self.ctx, &path)?;
        Ok(AccessGuard::new(access))
    }

    /// Open the directory containing `path`: `path` itself when it is a
    /// versioned directory, its parent otherwise.
    pub fn probe_open(
        &self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelCheck<'_>,
    ) -> Result<AccessGuard> {
        let access = open::probe_open(&self.ctx, None, path.as_ref(), write_lock, depth, cancel)?;
        Ok(AccessGuard::new(access))
    }

    /// Open the anchor/target pair for an operation on `path`.
    pub fn open_anchor(
        &self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelCheck<'_>,
    ) -> Result<Anchor> {
        anchor::open_anchor(&self.ctx, path.as_ref(), write_lock, depth, cancel)
    }
}

impl Default for AccessManager {
    fn default() -> Self {
        Self::with_fs_store(AccessConfig::default())
    }
}

/// Whether `path` is currently write-locked on disk.
pub fn is_locked(path: impl AsRef<Path>) -> Result<bool> {
    crate::wc::is_locked(path.as_ref())
}

pub(crate) fn parent_of(path: &Path) -> PathBuf {
    path.parent().unwrap_or(path).to_path_buf()
}
