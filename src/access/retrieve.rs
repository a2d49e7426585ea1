//! Finding batons and entries inside an access set.

use std::path::Path;

use super::{baton::AdmAccess, open, parent_of, CancelCheck, LockDepth};
use crate::{
    wc::{
        adm_child, base_name, check_path_kind, display, normalize_path, EntryMetadata, NodeKind,
        THIS_DIR,
    },
    Error, NotLocked, Result,
};

/// Baton for `path` in the set of `access`, without diagnostics.
pub(crate) fn retrieve_internal(access: &AdmAccess, path: &Path) -> Option<AdmAccess> {
    match access.registry() {
        Some(registry) => registry.get(path).and_then(|slot| slot.as_real().cloned()),
        None if access.path() == path => Some(access.clone()),
        None => None,
    }
}

/// Work out why `path` has no baton in the set of `access`.
fn diagnose(access: &AdmAccess, path: &Path) -> NotLocked {
    let entry = access.entry(path).ok().flatten();
    let kind = match check_path_kind(path) {
        Ok(kind) => kind,
        Err(_) => return NotLocked::ProbeFailed(display(path)),
    };

    if let Some(entry) = entry {
        match (entry.kind, kind) {
            (NodeKind::Dir, NodeKind::File) => return NotLocked::ExpectedDirectory(display(path)),
            (NodeKind::File, NodeKind::Dir) => return NotLocked::ExpectedFile(display(path)),
            _ => {}
        }
    }

    match kind {
        NodeKind::None => NotLocked::Missing(display(path)),
        NodeKind::Dir => {
            let adm = adm_child(path, "");
            match check_path_kind(&adm) {
                Err(_) => NotLocked::ProbeFailed(display(&adm)),
                Ok(NodeKind::None) => NotLocked::AdminAreaMissing(display(&adm)),
                Ok(NodeKind::Dir) => NotLocked::UnableToLock(display(path)),
                Ok(NodeKind::File) => NotLocked::Generic(display(path)),
            }
        }
        NodeKind::File => NotLocked::Generic(display(path)),
    }
}

impl AdmAccess {
    /// Baton for directory `path` from the access set of this baton.
    ///
    /// Fails with [`Error::NotLocked`], carrying the most specific reason
    /// that can be found on disk, when the set has no baton for `path`.
    pub fn retrieve(&self, path: impl AsRef<Path>) -> Result<AdmAccess> {
        let path = normalize_path(path.as_ref())?;
        match retrieve_internal(self, &path) {
            Some(access) => Ok(access),
            None => Err(Error::from(diagnose(self, &path)).into()),
        }
    }

    /// Entry metadata of `path`: the directory's own entry when `path` has a
    /// baton in this set, otherwise the entry in its parent's baton.
    pub fn entry(&self, path: impl AsRef<Path>) -> Result<Option<EntryMetadata>> {
        let path = normalize_path(path.as_ref())?;

        if let Some(dir) = retrieve_internal(self, &path) {
            return Ok(dir.entries()?.remove(THIS_DIR));
        }

        let parent = parent_of(&path);
        if parent != path {
            if let Some(dir) = retrieve_internal(self, &parent) {
                return Ok(dir.entries()?.remove(&base_name(&path)));
            }
        }
        Err(Error::from(NotLocked::Generic(display(&path))).into())
    }

    /// Baton of the directory holding `path`, which may be a file.
    pub fn probe_retrieve(&self, path: impl AsRef<Path>) -> Result<AdmAccess> {
        let path = normalize_path(path.as_ref())?;

        let dir = match self.entry(&path).ok().flatten() {
            None => open::probe(self.ctx(), &path, &path)?.0,
            Some(entry) if entry.kind == NodeKind::Dir => path.clone(),
            Some(_) => parent_of(&path),
        };

        match self.retrieve(&dir) {
            Err(err) if Error::is_not_locked(&err) => {
                // The entries can disagree with the disk; trust the disk.
                let (dir, _) = open::probe(self.ctx(), &path, &path)?;
                self.retrieve(&dir)
            }
            result => result,
        }
    }

    /// Baton for the directory holding `path`, opening it into this set when
    /// it is not there yet. `None` when that directory is not a working copy.
    pub fn probe_open_or_reuse(
        &self,
        path: impl AsRef<Path>,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelCheck<'_>,
    ) -> Result<Option<AdmAccess>> {
        let path = path.as_ref();
        match self.probe_retrieve(path) {
            Ok(access) => Ok(Some(access)),
            Err(err) if Error::is_not_locked(&err) => {
                match open::probe_open(self.ctx(), Some(self), path, write_lock, depth, cancel) {
                    Ok(access) => Ok(Some(access)),
                    Err(err) if Error::is_not_a_working_copy(&err) => Ok(None),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}
