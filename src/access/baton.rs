use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};

use super::{
    registry::{self, Registry},
    AccessContext,
};
use crate::{
    wc::{adm, display, Entries, MetadataHandle, PropMap},
    Error, NotLocked, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Read-only access, no lock held.
    Unlocked,
    WriteLocked,
    /// Terminal; the baton accepts no further changes.
    Closed,
}

pub(crate) struct BatonState {
    pub(crate) format: u32,
    pub(crate) lock_state: LockState,
    /// Set while this baton is responsible for an on-disk lock file.
    pub(crate) lock_exists: bool,
    pub(crate) lock_stolen: bool,
    pub(crate) owns_registry: bool,
    pub(crate) registry: Option<Registry>,
    pub(crate) entries: Option<Entries>,
    pub(crate) wcprops: Option<BTreeMap<String, PropMap>>,
}

struct BatonInner {
    path: PathBuf,
    ctx: Arc<AccessContext>,
    state: Mutex<BatonState>,
}

/// Handle to the access baton of one working-copy directory.
///
/// Handles are cheap to clone; all clones refer to the same baton.
#[derive(Clone)]
pub struct AdmAccess {
    inner: Arc<BatonInner>,
}

impl AdmAccess {
    pub(crate) fn new(ctx: Arc<AccessContext>, path: PathBuf, lock_state: LockState) -> Self {
        Self {
            inner: Arc::new(BatonInner {
                path,
                ctx,
                state: Mutex::new(BatonState {
                    format: 0,
                    lock_state,
                    lock_exists: false,
                    lock_stolen: false,
                    owns_registry: false,
                    registry: None,
                    entries: None,
                    wcprops: None,
                }),
            }),
        }
    }

    /// Create a baton, taking the physical lock when `write_lock` is set.
    pub(crate) fn alloc(ctx: Arc<AccessContext>, path: PathBuf, write_lock: bool) -> Result<Self> {
        if !write_lock {
            return Ok(Self::new(ctx, path, LockState::Unlocked));
        }
        adm::create_lock(&path)?;
        let access = Self::new(ctx, path, LockState::WriteLocked);
        access.state().lock_exists = true;
        Ok(access)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, BatonState> {
        self.inner.state.lock()
    }

    pub(crate) fn ctx(&self) -> &Arc<AccessContext> {
        &self.inner.ctx
    }

    pub(crate) fn registry(&self) -> Option<Registry> {
        self.state().registry.clone()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn ptr_eq(&self, other: &AdmAccess) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn format(&self) -> u32 {
        self.state().format
    }

    pub fn set_format(&self, format: u32) -> Result<()> {
        let mut state = self.state();
        if state.lock_state == LockState::Closed {
            return Err(Error::BatonClosed(display(self.path())).into());
        }
        state.format = format;
        Ok(())
    }

    pub fn lock_state(&self) -> LockState {
        self.state().lock_state
    }

    pub fn is_write_locked(&self) -> bool {
        self.lock_state() == LockState::WriteLocked
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state() == LockState::Closed
    }

    pub fn has_physical_lock(&self) -> bool {
        self.state().lock_exists
    }

    /// Whether the write lock was taken over from another holder.
    pub fn is_stolen(&self) -> bool {
        self.state().lock_stolen
    }

    pub fn owns_registry(&self) -> bool {
        self.state().owns_registry
    }

    /// Whether `path` was recorded as missing or obstructed during a recursive open.
    pub fn is_missing(&self, path: impl AsRef<Path>) -> bool {
        self.registry()
            .map(|registry| registry.is_missing(path.as_ref()))
            .unwrap_or(false)
    }

    /// Paths of every baton in this baton's access set, in path order.
    pub fn registered_paths(&self) -> Vec<PathBuf> {
        match self.registry() {
            Some(registry) => registry.paths(),
            None => vec![self.path().to_path_buf()],
        }
    }

    /// Entries of this directory, read through the store on first use.
    pub fn entries(&self) -> Result<Entries> {
        if let Some(entries) = &self.state().entries {
            return Ok(entries.clone());
        }
        let entries = self.ctx().store.read_entries(self.path())?;
        self.state().entries = Some(entries.clone());
        Ok(entries)
    }

    pub fn set_entries(&self, entries: Entries) -> Result<()> {
        let mut state = self.state();
        if state.lock_state == LockState::Closed {
            return Err(Error::BatonClosed(display(self.path())).into());
        }
        state.entries = Some(entries);
        Ok(())
    }

    /// Versioned wc properties of entry `name`, cached per entry.
    pub fn versioned_props(&self, name: &str) -> Result<PropMap> {
        if let Some(props) = self.state().wcprops.as_ref().and_then(|all| all.get(name)) {
            return Ok(props.clone());
        }
        let props = self.ctx().store.read_versioned_props(self.path(), name)?;
        self.state()
            .wcprops
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), props.clone());
        Ok(props)
    }

    pub fn set_versioned_props(&self, name: &str, props: PropMap) -> Result<()> {
        let mut state = self.state();
        if state.lock_state == LockState::Closed {
            return Err(Error::BatonClosed(display(self.path())).into());
        }
        state
            .wcprops
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), props);
        Ok(())
    }

    /// Run `f` with the metadata handle shared by this baton's access set,
    /// opening it on first use.
    pub fn with_db<R>(&self, f: impl FnOnce(&mut dyn MetadataHandle) -> R) -> Result<R> {
        if self.is_closed() {
            return Err(Error::BatonClosed(display(self.path())).into());
        }
        let registry = registry::ensure_set(self);
        registry.with_db(self.ctx().store.as_ref(), self.path(), f)
    }

    /// Whether a log left in this directory must be run before the lock may go.
    pub fn cleanup_required(&self) -> Result<bool> {
        if !self.is_write_locked() {
            return Ok(false);
        }
        self.ctx().store.log_pending(self.path())
    }

    /// Replay the log left in this directory, then re-read its format.
    pub fn run_log(&self) -> Result<()> {
        self.write_check()?;
        let store = &self.ctx().store;
        if !store.log_pending(self.path())? {
            return Ok(());
        }
        store.run_log(self.path())?;

        let format = store.check_format(self.path())?;
        let mut state = self.state();
        state.format = format;
        state.entries = None;
        state.wcprops = None;
        Ok(())
    }

    /// Fail unless this baton holds a write lock that is still present on disk.
    pub fn write_check(&self) -> Result<()> {
        let (lock_state, lock_exists) = {
            let state = self.state();
            (state.lock_state, state.lock_exists)
        };

        if lock_state != LockState::WriteLocked {
            return Err(Error::from(NotLocked::NoWriteLock(display(self.path()))).into());
        }
        if lock_exists && !adm::is_locked(self.path())? {
            return Err(Error::from(NotLocked::Stolen(display(self.path()))).into());
        }
        Ok(())
    }
}

impl fmt::Debug for AdmAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("AdmAccess")
            .field("path", &self.path())
            .field("format", &state.format)
            .field("lock_state", &state.lock_state)
            .field("lock_exists", &state.lock_exists)
            .field("owns_registry", &state.owns_registry)
            .finish()
    }
}
