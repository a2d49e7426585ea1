//! Integration tests for anchor/target resolution.

#[path = "../support/mod.rs"]
mod support;

use support::*;
use tempfile::tempdir;
use wcadm::access::{AccessManager, LockDepth};
use wcadm::Error;

#[test]
fn anchor_is_parent_of_versioned_subdirectory() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, c) = make_tree(root.path());

    let opened = AccessManager::default().open_anchor(&a, true, LockDepth::Infinite, None)?;
    assert_eq!(opened.anchor.path(), root.path());
    assert_eq!(opened.target.path(), a.as_path());
    assert_eq!(opened.target_name, "a");
    assert!(opened.anchor.retrieve(&a)?.ptr_eq(&opened.target));
    assert!(opened.target.retrieve(root.path())?.ptr_eq(&opened.anchor));

    assert!(lock_file(root.path()).is_file());
    assert!(lock_file(&a).is_file());
    assert!(lock_file(&b).is_file());
    assert!(!lock_file(&c).exists());

    drop(opened);
    for dir in [root.path(), &a, &b] {
        assert!(!lock_file(dir).exists());
    }
    Ok(())
}

#[test]
fn working_copy_root_anchors_itself() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_tree(root.path());

    let opened =
        AccessManager::default().open_anchor(root.path(), false, LockDepth::Infinite, None)?;
    assert!(opened.anchor.ptr_eq(&opened.target));
    assert_eq!(opened.target_name, "");
    Ok(())
}

#[test]
fn file_target_anchors_in_its_directory() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let file = add_file(root.path(), "f.txt");

    let opened = AccessManager::default().open_anchor(&file, true, LockDepth::Infinite, None)?;
    assert!(opened.anchor.ptr_eq(&opened.target));
    assert_eq!(opened.anchor.path(), root.path());
    assert_eq!(opened.target_name, "f.txt");
    assert!(!opened.anchor.is_missing(&file));
    Ok(())
}

#[test]
fn missing_directory_target_gets_placeholder() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let gone = add_dir_entry(root.path(), "gone");

    let opened = AccessManager::default().open_anchor(&gone, true, LockDepth::Infinite, None)?;
    assert_eq!(opened.anchor.path(), root.path());
    assert_eq!(opened.target_name, "gone");
    assert!(opened.anchor.is_missing(&gone));
    Ok(())
}

#[test]
fn switched_target_drops_parent() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let sw = add_subdir_with_url(
        root.path(),
        "sw",
        "http://svn.example.com/repo/branches/feature",
    );

    let opened = AccessManager::default().open_anchor(&sw, true, LockDepth::Infinite, None)?;
    assert!(opened.anchor.ptr_eq(&opened.target));
    assert_eq!(opened.anchor.path(), sw.as_path());
    assert_eq!(opened.target_name, "");
    assert!(!lock_file(root.path()).exists());
    assert!(lock_file(&sw).is_file());
    Ok(())
}

#[test]
fn escaped_child_url_is_not_switched() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let spaced = add_subdir_with_url(root.path(), "with space", &format!("{REPO_URL}/with%20space"));

    let opened = AccessManager::default().open_anchor(&spaced, false, LockDepth::ZERO, None)?;
    assert_eq!(opened.anchor.path(), root.path());
    assert_eq!(opened.target_name, "with space");
    Ok(())
}

#[test]
fn disjoint_target_drops_parent() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let nested = make_wc(&root.path().join("nested"), "http://other.example.com/repo");

    let opened = AccessManager::default().open_anchor(&nested, true, LockDepth::ZERO, None)?;
    assert!(opened.anchor.ptr_eq(&opened.target));
    assert_eq!(opened.target_name, "");
    assert!(!lock_file(root.path()).exists());
    Ok(())
}

#[test]
fn parent_lock_contention_fails_when_parent_needed() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, _) = make_tree(root.path());
    let manager = AccessManager::default();
    let _holder = manager.open(root.path(), true, LockDepth::ZERO, None)?;

    let err = manager
        .open_anchor(&a, true, LockDepth::Infinite, None)
        .unwrap_err();
    assert!(matches!(Error::of(&err), Some(Error::Locked(_))));
    assert!(lock_file(root.path()).is_file());
    assert!(!lock_file(&a).exists());
    assert!(!lock_file(&b).exists());
    Ok(())
}

#[test]
fn parent_lock_contention_ignored_for_switched_target() -> wcadm::Result<()> {
    let root = tempdir()?;
    make_wc(root.path(), REPO_URL);
    let sw = add_subdir_with_url(root.path(), "sw", "http://svn.example.com/repo/tags/1.0");
    let manager = AccessManager::default();
    let _holder = manager.open(root.path(), true, LockDepth::ZERO, None)?;

    let opened = manager.open_anchor(&sw, true, LockDepth::ZERO, None)?;
    assert_eq!(opened.anchor.path(), sw.as_path());
    assert!(opened.anchor.is_write_locked());
    Ok(())
}

#[test]
fn dot_dot_path_anchors_itself() -> wcadm::Result<()> {
    let root = tempdir()?;
    let (a, b, _) = make_tree(root.path());

    let opened =
        AccessManager::default().open_anchor(b.join(".."), false, LockDepth::ZERO, None)?;
    assert_eq!(opened.anchor.path(), a.as_path());
    assert!(opened.anchor.ptr_eq(&opened.target));
    assert_eq!(opened.target_name, "");
    Ok(())
}

#[test]
fn unversioned_target_outside_working_copy_fails() -> wcadm::Result<()> {
    let root = tempdir()?;
    let plain = root.path().join("plain");
    std::fs::create_dir(&plain)?;

    let err = AccessManager::default()
        .open_anchor(&plain, false, LockDepth::ZERO, None)
        .unwrap_err();
    assert!(Error::is_not_a_working_copy(&err));
    Ok(())
}

#[cfg(unix)]
mod read_only_parent {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use wcadm::wc::adm_child;

    /// Make the admin area of `dir` read-only. Returns false when the
    /// process can write there anyway (running as root).
    fn deny_lock_creation(dir: &Path) -> bool {
        let adm = adm_child(dir, "");
        fs::set_permissions(&adm, fs::Permissions::from_mode(0o555)).unwrap();
        let scratch = adm.join("write-test");
        if fs::write(&scratch, b"").is_ok() {
            fs::remove_file(&scratch).unwrap();
            restore(dir);
            return false;
        }
        true
    }

    fn restore(dir: &Path) {
        fs::set_permissions(adm_child(dir, ""), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn unwritable_parent_fails_when_needed() -> wcadm::Result<()> {
        let root = tempdir()?;
        let (a, _, _) = make_tree(root.path());
        if !deny_lock_creation(root.path()) {
            return Ok(());
        }

        let result = AccessManager::default().open_anchor(&a, true, LockDepth::ZERO, None);
        restore(root.path());

        let err = result.unwrap_err();
        assert!(matches!(
            Error::of(&err),
            Some(Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::PermissionDenied
        ));
        assert!(!lock_file(&a).exists());
        assert!(!lock_file(root.path()).exists());
        Ok(())
    }

    #[test]
    fn unwritable_parent_ignored_for_switched_target() -> wcadm::Result<()> {
        let root = tempdir()?;
        make_wc(root.path(), REPO_URL);
        let sw = add_subdir_with_url(root.path(), "sw", "http://svn.example.com/repo/tags/2.0");
        if !deny_lock_creation(root.path()) {
            return Ok(());
        }

        let result = AccessManager::default().open_anchor(&sw, true, LockDepth::ZERO, None);
        restore(root.path());

        let opened = result?;
        assert_eq!(opened.anchor.path(), sw.as_path());
        assert!(opened.anchor.is_write_locked());
        assert_eq!(opened.target_name, "");
        Ok(())
    }
}
