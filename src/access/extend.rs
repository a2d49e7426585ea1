use super::{baton::AdmAccess, retrieve::retrieve_internal, LockDepth};
use crate::{wc::entries::lockable_subdirs, Error, Result};

impl AdmAccess {
    /// Open every versioned subdirectory below this baton that is not in
    /// its access set yet, in the same mode as this baton.
    ///
    /// Directories locked by somebody else are skipped.
    pub fn extend_lock_to_tree(&self) -> Result<()> {
        let write_lock = self.is_write_locked();
        extend_dir(self, self, write_lock)
    }
}

fn extend_dir(root: &AdmAccess, dir: &AdmAccess, write_lock: bool) -> Result<()> {
    let entries = dir.entries()?;

    for (child_path, _) in lockable_subdirs(dir.path(), &entries) {
        match root.probe_open_or_reuse(&child_path, write_lock, LockDepth::Infinite, None) {
            Ok(_) => {}
            Err(err) if Error::is_locked(&err) => {
                tracing::debug!(path = %child_path.display(), "subdirectory already locked, skipping");
            }
            Err(err) => return Err(err),
        }

        if let Some(child) = retrieve_internal(root, &child_path) {
            extend_dir(root, &child, write_lock)?;
        }
    }
    Ok(())
}
