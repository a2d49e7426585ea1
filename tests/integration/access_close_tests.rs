//! Integration tests for closing batons and tearing down access sets.

#[path = "../support/mod.rs"]
mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use support::*;
use tempfile::tempdir;
use wcadm::access::{AccessManager, LockDepth, LockState};
use wcadm::config::AccessConfig;
use wcadm::wc::{
    AdmStore, Entries, FsAdmStore, LogCommand, LogExecutor, MetadataHandle, MetadataReader,
    PropMap, ADM_DIR_NAME,
};
use wcadm::Error;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    pending_checks: Mutex<Vec<PathBuf>>,
}

/// File store that counts metadata handle opens and closes, and records the
/// directories checked for a pending log.
struct CountingStore {
    inner: FsAdmStore,
    counters: Arc<Counters>,
}

struct CountingHandle {
    inner: Box<dyn MetadataHandle>,
    counters: Arc<Counters>,
}

impl MetadataHandle for CountingHandle {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn close(&mut self) -> wcadm::Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

impl MetadataReader for CountingStore {
    fn check_format(&self, dir: &Path) -> wcadm::Result<u32> {
        self.inner.check_format(dir)
    }

    fn read_entries(&self, dir: &Path) -> wcadm::Result<Entries> {
        self.inner.read_entries(dir)
    }

    fn read_versioned_props(&self, dir: &Path, name: &str) -> wcadm::Result<PropMap> {
        self.inner.read_versioned_props(dir, name)
    }

    fn open_db(&self, root: &Path) -> wcadm::Result<Box<dyn MetadataHandle>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingHandle {
            inner: self.inner.open_db(root)?,
            counters: self.counters.clone(),
        }))
    }
}

impl LogExecutor for CountingStore {
    fn write_log(&self, dir: &Path, commands: &[LogCommand]) -> wcadm::Result<()> {
        self.inner.write_log(dir, commands)
    }

    fn run_log(&self, dir: &Path) -> wcadm::Result<()> {
        self.inner.run_log(dir)
    }

    fn log_pending(&self, dir: &Path) -> wcadm::Result<bool> {
        self.counters
            .pending_checks
            .lock()
            .unwrap()
            .push(dir.to_path_buf());
        self.inner.log_pending(dir)
    }
}

impl AdmStore for CountingStore {
    fn remove_legacy_props(&self, dir: &Path) -> wcadm::Result<()> {
        self.inner.remove_legacy_props(dir)
    }
}

fn counting_manager() -> (AccessManager, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let store = CountingStore {
        inner: FsAdmStore::new(),
        counters: counters.clone(),
    };
    (
        AccessManager::new(Arc::new(store), AccessConfig::default()),
        counters,
    )
}

#[test]
fn preserving_close_keeps_lock_files() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, _) = make_tree(root.path());

    let guard = AccessManager::default().open(root.path(), true, LockDepth::Infinite, None)?;
    let handle = guard.access().clone();
    let child = guard.retrieve(&a)?;
    guard.close(true)?;

    assert!(handle.is_closed());
    assert!(child.is_closed());
    assert!(!handle.has_physical_lock());
    for dir in [root.path(), &a, &b] {
        assert!(lock_file(dir).is_file());
    }

    // A second close is a no-op, and closed batons refuse changes.
    handle.close(false)?;
    assert!(lock_file(root.path()).is_file());
    let err = handle.set_format(3).unwrap_err();
    assert!(matches!(Error::of(&err), Some(Error::BatonClosed(_))));
    Ok(())
}

#[test]
fn closing_subtree_leaves_rest_of_set_open() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, c) = make_tree(root.path());

    let guard = AccessManager::default().open(root.path(), true, LockDepth::Infinite, None)?;
    let child_a = guard.retrieve(&a)?;
    let child_b = guard.retrieve(&b)?;
    child_a.close(false)?;

    assert!(child_a.is_closed());
    assert!(child_b.is_closed());
    assert!(!lock_file(&a).exists());
    assert!(!lock_file(&b).exists());
    assert_eq!(
        guard.registered_paths(),
        vec![root.path().to_path_buf(), c.clone()]
    );
    assert_eq!(guard.retrieve(&c)?.lock_state(), LockState::WriteLocked);
    Ok(())
}

#[test]
fn recursive_close_drops_missing_placeholders() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let gone = add_dir_entry(root.path(), "gone");

    let guard = AccessManager::default().open(root.path(), false, LockDepth::Infinite, None)?;
    let handle = guard.access().clone();
    assert!(handle.is_missing(&gone));
    guard.close(false)?;
    assert!(!handle.is_missing(&gone));
    Ok(())
}

#[test]
fn dropped_guard_keeps_lock_when_log_pending() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, _, c) = make_tree(root.path());

    {
        let guard = AccessManager::default().open(root.path(), true, LockDepth::Infinite, None)?;
        FsAdmStore::new().write_log(&a, &[LogCommand::UpgradeFormat { format: 10 }])?;
        assert!(guard.retrieve(&a)?.cleanup_required()?);
        assert!(!guard.cleanup_required()?);
    }

    assert!(lock_file(&a).is_file());
    assert!(!lock_file(root.path()).exists());
    assert!(!lock_file(&c).exists());
    Ok(())
}

#[test]
fn dropped_guard_closes_batons_joined_later() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, _, c) = make_tree(root.path());
    let manager = AccessManager::default();

    let guard = manager.open(&a, true, LockDepth::ZERO, None)?;
    let other = manager.open_in(&guard, &c, true, LockDepth::ZERO, None)?;
    drop(guard);

    assert!(other.is_closed());
    assert!(!lock_file(&a).exists());
    assert!(!lock_file(&c).exists());
    Ok(())
}

#[test]
fn close_tolerates_removed_directory() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, _, _) = make_tree(root.path());

    let guard = AccessManager::default().open(root.path(), true, LockDepth::Infinite, None)?;
    fs::remove_dir_all(&a)?;
    guard.close(false)?;
    assert!(!lock_file(root.path()).exists());
    Ok(())
}

#[test]
fn close_reports_lock_vanished_from_existing_area() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);

    let guard = AccessManager::default().open(root.path(), true, LockDepth::ZERO, None)?;
    let handle = guard.access().clone();
    fs::remove_file(lock_file(root.path()))?;

    assert!(guard.close(false).is_err());
    assert!(handle.is_closed());
    assert!(root.path().join(ADM_DIR_NAME).is_dir());
    Ok(())
}

#[test]
fn metadata_handle_closes_once_after_last_baton() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, _, _) = make_tree(root.path());
    let (manager, counters) = counting_manager();

    let guard = manager.open(root.path(), true, LockDepth::Infinite, None)?;
    let child = guard.retrieve(&a)?;

    let seen = child.with_db(|db| db.root().to_path_buf())?;
    assert_eq!(seen, a);
    guard.with_db(|_| ())?;
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);

    child.close(false)?;
    assert_eq!(counters.closed.load(Ordering::SeqCst), 0);

    guard.close(false)?;
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let err = child.with_db(|_| ()).unwrap_err();
    assert!(matches!(Error::of(&err), Some(Error::BatonClosed(_))));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn metadata_handle_waits_for_batons_outside_owner_subtree() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, _, c) = make_tree(root.path());
    let (manager, counters) = counting_manager();

    let guard = manager.open(&a, false, LockDepth::ZERO, None)?;
    let other = manager.open_in(&guard, &c, false, LockDepth::ZERO, None)?;
    guard.with_db(|_| ())?;

    let owner = guard.access().clone();
    owner.close(false)?;
    assert_eq!(counters.closed.load(Ordering::SeqCst), 0);

    other.close(false)?;
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    guard.close(false)?;
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn lone_baton_gets_its_own_handle() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let (manager, counters) = counting_manager();

    let guard = manager.open(root.path(), false, LockDepth::ZERO, None)?;
    guard.with_db(|_| ())?;
    drop(guard);

    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn guard_drop_closes_deepest_first() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, c) = make_tree(root.path());
    let (manager, counters) = counting_manager();

    let guard = manager.open(root.path(), true, LockDepth::Infinite, None)?;
    counters.pending_checks.lock().unwrap().clear();
    drop(guard);

    let order = counters.pending_checks.lock().unwrap().clone();
    let position = |dir: &Path| {
        order
            .iter()
            .position(|checked| checked == dir)
            .unwrap_or_else(|| panic!("{} never closed", dir.display()))
    };
    assert_eq!(order.len(), 4);
    assert!(position(&b) < position(&a));
    assert!(position(&a) < position(root.path()));
    assert!(position(&c) < position(root.path()));
    for dir in [root.path(), &a, &b, &c] {
        assert!(!lock_file(dir).exists());
    }
    Ok(())
}

#[test]
fn guard_drop_closes_own_subtree_before_joined_batons() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, c) = make_tree(root.path());
    let (manager, counters) = counting_manager();

    let guard = manager.open(&a, true, LockDepth::Infinite, None)?;
    let joined = manager.open_in(&guard, &c, true, LockDepth::ZERO, None)?;
    counters.pending_checks.lock().unwrap().clear();
    drop(guard);

    let order = counters.pending_checks.lock().unwrap().clone();
    assert_eq!(order, vec![b.clone(), a.clone(), c.clone()]);
    assert!(joined.is_closed());
    Ok(())
}
