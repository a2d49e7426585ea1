use std::ops::Deref;

use tracing::{debug, warn};

use super::{
    baton::{AdmAccess, LockState},
    registry::{close_db, Slot},
};
use crate::{logging::log_access_set_snapshot, wc::adm, Result};

/// Close `access`, and with `recurse` every baton of its access set nested
/// below it, deepest first.
///
/// The baton always ends up closed and detached from its set, even when
/// releasing a lock fails; the first error is returned.
pub(crate) fn do_close(access: &AdmAccess, preserve_lock: bool, recurse: bool) -> Result<()> {
    if access.is_closed() {
        return Ok(());
    }

    let registry = access.registry();
    let mut first_err = None;

    if let Some(registry) = &registry {
        if access.owns_registry() {
            log_access_set_snapshot(access.path(), &registry.stats());
        }

        if recurse {
            for (path, slot) in registry.snapshot().into_iter().rev() {
                if path == access.path() || !path.starts_with(access.path()) {
                    continue;
                }
                match slot {
                    Slot::Missing => registry.remove(&path),
                    Slot::Real(child) => {
                        if let Err(err) = do_close(&child, preserve_lock, false) {
                            first_err.get_or_insert(err);
                        }
                    }
                }
            }
        }
    }

    if let Err(err) = release_lock(access, preserve_lock) {
        first_err.get_or_insert(err);
    }

    {
        let mut state = access.state();
        state.lock_state = LockState::Closed;
        state.lock_exists = false;
        state.entries = None;
        state.wcprops = None;
    }

    if let Some(registry) = &registry {
        registry.detach(access);
        if access.owns_registry() {
            registry.mark_owner_closed();
        }
        if let Some(db) = registry.take_db_if_finished() {
            close_db(db);
        }
    }

    debug!(path = %access.path().display(), preserve_lock, "closed access baton");
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn release_lock(access: &AdmAccess, preserve_lock: bool) -> Result<()> {
    let (lock_state, lock_exists) = {
        let state = access.state();
        (state.lock_state, state.lock_exists)
    };
    if preserve_lock || lock_state != LockState::WriteLocked || !lock_exists {
        return Ok(());
    }

    match adm::remove_lock(access.path()) {
        Ok(()) => Ok(()),
        // Removing a directory takes its lock with it.
        Err(_) if !adm::adm_area_exists(access.path()) => {
            debug!(path = %access.path().display(), "admin area gone, lock already released");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

impl AdmAccess {
    /// Close this baton and every baton nested below it in its access set.
    ///
    /// Lock files are kept when `preserve_lock` is set. Closing a closed
    /// baton does nothing.
    pub fn close(&self, preserve_lock: bool) -> Result<()> {
        do_close(self, preserve_lock, true)
    }
}

/// Close everything opened so far after a failed operation.
///
/// A lock guarding a log that was never replayed stays on disk, and so does
/// a lock taken over from another holder.
pub(crate) fn discard(access: &AdmAccess) {
    if let Some(registry) = access.registry() {
        for (path, slot) in registry.snapshot().into_iter().rev() {
            if path == access.path() || !path.starts_with(access.path()) {
                continue;
            }
            if let Slot::Real(child) = slot {
                discard_one(&child);
            }
        }
    }
    discard_one(access);
}

fn discard_one(access: &AdmAccess) {
    let preserve_lock = keep_lock_after_failure(access);
    if preserve_lock && access.is_write_locked() {
        debug!(path = %access.path().display(), "keeping lock of failed open");
    }
    if let Err(err) = do_close(access, preserve_lock, true) {
        debug!(path = %access.path().display(), error = %err, "error while discarding access baton");
    }
}

fn keep_lock_after_failure(access: &AdmAccess) -> bool {
    access.is_stolen() || access.cleanup_required().unwrap_or(true)
}

/// Close every baton of the group of `access`: its own subtree deepest
/// first, then the rest of the set.
fn close_group(access: &AdmAccess, mut preserve_for: impl FnMut(&AdmAccess) -> bool) -> Result<()> {
    let mut order = Vec::new();
    let registry = access.registry();

    if let Some(registry) = &registry {
        let (own, rest): (Vec<_>, Vec<_>) = registry
            .snapshot()
            .into_iter()
            .rev()
            .filter_map(|(_, slot)| slot.as_real().cloned())
            .partition(|baton| baton.path().starts_with(access.path()));
        order.extend(own);
        order.extend(rest);
    }
    if !order.iter().any(|baton| baton.ptr_eq(access)) {
        order.push(access.clone());
    }

    let mut first_err = None;
    for baton in &order {
        let preserve_lock = preserve_for(baton);
        if let Err(err) = do_close(baton, preserve_lock, false) {
            first_err.get_or_insert(err);
        }
    }

    if let Some(registry) = &registry {
        registry.purge_missing();
        if let Some(db) = registry.take_db_if_finished() {
            close_db(db);
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Owner of a top-level open. Dropping the guard closes the whole access
/// set; locks of directories with a pending log are left in place.
#[derive(Debug)]
pub struct AccessGuard {
    access: AdmAccess,
    armed: bool,
}

impl AccessGuard {
    pub(crate) fn new(access: AdmAccess) -> Self {
        Self {
            access,
            armed: true,
        }
    }

    pub fn access(&self) -> &AdmAccess {
        &self.access
    }

    /// Close the access set, keeping the on-disk locks when `preserve_lock`.
    pub fn close(mut self, preserve_lock: bool) -> Result<()> {
        self.armed = false;
        close_group(&self.access, |_| preserve_lock)
    }
}

impl Deref for AccessGuard {
    type Target = AdmAccess;

    fn deref(&self) -> &AdmAccess {
        &self.access
    }
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let result = close_group(&self.access, |baton| match baton.cleanup_required() {
            Ok(required) => required,
            Err(err) => {
                warn!(path = %baton.path().display(), error = %err, "could not check for pending log, keeping lock");
                true
            }
        });
        if let Err(err) = result {
            warn!(path = %self.access.path().display(), error = %err, "failed to release access set");
        }
    }
}
