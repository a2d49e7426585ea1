//! Access sets shared by batons opened for one logical operation.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::baton::{AdmAccess, LockState};
use crate::{
    logging::AccessSetSnapshot,
    wc::{AdmStore, MetadataHandle},
    Result,
};

/// What a registry knows about one path.
#[derive(Debug, Clone)]
pub enum Slot {
    Real(AdmAccess),
    /// The directory is versioned but was missing or obstructed when its
    /// parent was opened recursively.
    Missing,
}

impl Slot {
    pub fn as_real(&self) -> Option<&AdmAccess> {
        match self {
            Slot::Real(access) => Some(access),
            Slot::Missing => None,
        }
    }
}

#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) set: BTreeMap<PathBuf, Slot>,
    pub(crate) db: Option<Box<dyn MetadataHandle>>,
    pub(crate) owner_closed: bool,
}

/// Ordered path → baton map shared by every baton of one group.
#[derive(Clone, Default)]
pub struct Registry(Arc<Mutex<Shared>>);

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.0.lock()
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, path: &Path) -> Option<Slot> {
        self.lock().set.get(path).cloned()
    }

    pub fn is_missing(&self, path: &Path) -> bool {
        matches!(self.lock().set.get(path), Some(Slot::Missing))
    }

    pub fn len(&self) -> usize {
        self.lock().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().set.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().set.keys().cloned().collect()
    }

    /// Copy of the slots in path order, taken so that callers can work on
    /// the batons without holding the registry lock.
    pub(crate) fn snapshot(&self) -> Vec<(PathBuf, Slot)> {
        self.lock()
            .set
            .iter()
            .map(|(path, slot)| (path.clone(), slot.clone()))
            .collect()
    }

    pub(crate) fn insert(&self, access: &AdmAccess) {
        access.state().registry = Some(self.clone());
        self.lock()
            .set
            .insert(access.path().to_path_buf(), Slot::Real(access.clone()));
    }

    pub(crate) fn insert_missing(&self, path: &Path) {
        debug!(path = %path.display(), "recorded missing directory");
        self.lock().set.insert(path.to_path_buf(), Slot::Missing);
    }

    pub(crate) fn remove(&self, path: &Path) {
        self.lock().set.remove(path);
    }

    /// Remove the slot of `access`, leaving any other baton registered under
    /// the same path in place.
    pub(crate) fn detach(&self, access: &AdmAccess) {
        let mut shared = self.lock();
        let is_self = matches!(
            shared.set.get(access.path()),
            Some(Slot::Real(current)) if current.ptr_eq(access)
        );
        if is_self {
            shared.set.remove(access.path());
        }
    }

    pub(crate) fn purge_missing(&self) {
        self.lock()
            .set
            .retain(|_, slot| matches!(slot, Slot::Real(_)));
    }

    pub(crate) fn mark_owner_closed(&self) {
        self.lock().owner_closed = true;
    }

    /// Hand out the metadata handle once the owner has closed and the last
    /// baton has left the set.
    pub(crate) fn take_db_if_finished(&self) -> Option<Box<dyn MetadataHandle>> {
        let mut shared = self.lock();
        if shared.owner_closed && shared.set.is_empty() {
            shared.db.take()
        } else {
            None
        }
    }

    pub(crate) fn with_db<R>(
        &self,
        store: &dyn AdmStore,
        root: &Path,
        f: impl FnOnce(&mut dyn MetadataHandle) -> R,
    ) -> Result<R> {
        let existing = self.lock().db.take();
        let mut db = match existing {
            Some(db) => db,
            None => store.open_db(root)?,
        };

        let out = f(db.as_mut());

        if let Some(extra) = self.adopt_db(db) {
            close_db(extra);
        }
        Ok(out)
    }

    /// Install `db` as this registry's handle. Returns the handle that lost
    /// when one is already installed.
    fn adopt_db(&self, db: Box<dyn MetadataHandle>) -> Option<Box<dyn MetadataHandle>> {
        let mut shared = self.lock();
        if shared.db.is_some() {
            return Some(db);
        }
        shared.db = Some(db);
        None
    }

    fn drain(&self) -> (BTreeMap<PathBuf, Slot>, Option<Box<dyn MetadataHandle>>) {
        let mut shared = self.lock();
        (std::mem::take(&mut shared.set), shared.db.take())
    }

    pub(crate) fn stats(&self) -> AccessSetSnapshot {
        let mut snapshot = AccessSetSnapshot::default();
        for (_, slot) in self.snapshot() {
            match slot {
                Slot::Missing => snapshot.missing += 1,
                Slot::Real(access) => {
                    let state = access.state();
                    snapshot.batons += 1;
                    if state.lock_state == LockState::WriteLocked {
                        snapshot.write_locked += 1;
                    }
                    if state.lock_exists {
                        snapshot.physical_locks += 1;
                    }
                }
            }
        }
        snapshot
    }
}

pub(crate) fn close_db(mut db: Box<dyn MetadataHandle>) {
    if let Err(err) = db.close() {
        warn!(root = %db.root().display(), error = %err, "failed to close metadata handle");
    }
}

/// Registry of `access`, created with `access` as its owner when missing.
pub(crate) fn ensure_set(access: &AdmAccess) -> Registry {
    if let Some(registry) = access.registry() {
        return registry;
    }
    let registry = Registry::default();
    registry.insert(access);
    access.state().owns_registry = true;
    registry
}

/// Make `target` and everything already sharing its registry members of the
/// access set of `dst`.
pub(crate) fn join(dst: &AdmAccess, target: &AdmAccess) {
    let registry = ensure_set(dst);

    let Some(other) = target.registry() else {
        registry.insert(target);
        return;
    };
    if other.ptr_eq(&registry) {
        return;
    }

    let (slots, db) = other.drain();
    for (path, slot) in slots {
        if let Slot::Real(access) = &slot {
            let mut state = access.state();
            state.owns_registry = false;
            state.registry = Some(registry.clone());
        }
        registry.lock().set.insert(path, slot);
    }
    if let Some(extra) = db.and_then(|db| registry.adopt_db(db)) {
        close_db(extra);
    }
}
