use std::{io, path::Path, sync::Arc};

use tracing::debug;
use url::Url;

use super::{
    baton::AdmAccess,
    close::{discard, AccessGuard},
    open::{do_open, dot_base_name},
    parent_of,
    registry::{ensure_set, join},
    AccessContext, CancelCheck, LockDepth,
};
use crate::{
    wc::{base_name, normalize_path, NodeKind, THIS_DIR},
    Error, Result,
};

/// Batons for an operation on a path: the directory the operation is
/// anchored in, and the baton for the path itself.
///
/// When the path's parent is not part of the same working copy, `anchor`
/// and `target` are the same baton and `target_name` is empty.
#[derive(Debug)]
pub struct Anchor {
    pub anchor: AccessGuard,
    pub target: AdmAccess,
    pub target_name: String,
}

impl Anchor {
    fn single(access: AdmAccess) -> Self {
        Self {
            target: access.clone(),
            anchor: AccessGuard::new(access),
            target_name: String::new(),
        }
    }
}

fn is_write_contention(err: &anyhow::Error) -> bool {
    match Error::of(err) {
        Some(Error::Locked(_)) => true,
        Some(Error::Io(io_err)) => io_err.kind() == io::ErrorKind::PermissionDenied,
        _ => err
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::PermissionDenied),
    }
}

/// `parent_url` with `name` appended as one encoded path segment.
fn child_url(parent_url: &str, name: &str) -> String {
    if let Ok(mut url) = Url::parse(parent_url) {
        let pushed = match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(name);
                true
            }
            Err(()) => false,
        };
        if pushed {
            return url.into();
        }
    }
    format!("{}/{}", parent_url.trim_end_matches('/'), name)
}

fn is_switched(parent_url: &str, name: &str, target_url: &str) -> bool {
    let expected = child_url(parent_url, name);
    let actual = Url::parse(target_url)
        .map(String::from)
        .unwrap_or_else(|_| target_url.to_string());
    expected.trim_end_matches('/') != actual.trim_end_matches('/')
}

/// Whether the parent baton is of no use as an anchor for `target`.
fn parent_unrelated(parent: &AdmAccess, target: &AdmAccess, name: &str) -> Result<bool> {
    if parent.entry(target.path())?.is_none() {
        debug!(path = %target.path().display(), "target not versioned in parent");
        return Ok(true);
    }

    let parent_url = parent.entries()?.remove(THIS_DIR).and_then(|entry| entry.url);
    let target_url = target.entries()?.remove(THIS_DIR).and_then(|entry| entry.url);
    if let (Some(parent_url), Some(target_url)) = (parent_url, target_url) {
        if is_switched(&parent_url, name, &target_url) {
            debug!(path = %target.path().display(), url = %target_url, "target is switched");
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn open_anchor(
    ctx: &Arc<AccessContext>,
    raw: &Path,
    write_lock: bool,
    depth: LockDepth,
    cancel: CancelCheck<'_>,
) -> Result<Anchor> {
    let path = normalize_path(raw)?;
    let raw_text = raw.as_os_str();
    if raw_text.is_empty()
        || raw_text == "."
        || path.parent().is_none()
        || dot_base_name(raw) == Some("..")
    {
        let access = do_open(ctx, &path, write_lock, depth, cancel)?;
        return Ok(Anchor::single(access));
    }

    let parent_path = parent_of(&path);
    let name = base_name(&path);

    let mut parent_err = None;
    let mut parent = match do_open(ctx, &parent_path, write_lock, LockDepth::ZERO, cancel) {
        Ok(access) => Some(access),
        Err(err) if Error::is_not_a_working_copy(&err) => None,
        Err(err) if write_lock && is_write_contention(&err) => {
            // A read-only parent still tells us whether it is needed at all.
            match do_open(ctx, &parent_path, false, LockDepth::ZERO, cancel) {
                Ok(access) => {
                    parent_err = Some(err);
                    Some(access)
                }
                Err(_) => return Err(err),
            }
        }
        Err(err) => return Err(err),
    };

    let target = match do_open(ctx, &path, write_lock, depth, cancel) {
        Ok(access) => Some(access),
        Err(err) if parent.is_some() && Error::is_not_a_working_copy(&err) => None,
        Err(err) => {
            if let Some(parent) = &parent {
                discard(parent);
            }
            return Err(err);
        }
    };

    let unrelated = match (&parent, &target) {
        (Some(p), Some(t)) => match parent_unrelated(p, t, &name) {
            Ok(unrelated) => unrelated,
            Err(err) => {
                discard(t);
                discard(p);
                return Err(err);
            }
        },
        _ => false,
    };
    if unrelated {
        if let Some(p) = parent.take() {
            discard(&p);
        }
    }

    if let (Some(p), Some(err)) = (&parent, parent_err) {
        if let Some(t) = &target {
            discard(t);
        }
        discard(p);
        return Err(err);
    }
    finish(parent, target, &path, name)
}

fn finish(
    parent: Option<AdmAccess>,
    target: Option<AdmAccess>,
    path: &Path,
    name: String,
) -> Result<Anchor> {
    match (parent, target) {
        (None, Some(target)) => Ok(Anchor::single(target)),
        (Some(parent), Some(target)) => {
            join(&parent, &target);
            Ok(Anchor {
                anchor: AccessGuard::new(parent),
                target,
                target_name: name,
            })
        }
        (Some(parent), None) => {
            let entry = match parent.entry(path) {
                Ok(entry) => entry,
                Err(err) => {
                    discard(&parent);
                    return Err(err);
                }
            };
            if entry.is_some_and(|entry| entry.kind == NodeKind::Dir) {
                ensure_set(&parent).insert_missing(path);
            }
            Ok(Anchor {
                target: parent.clone(),
                anchor: AccessGuard::new(parent),
                target_name: name,
            })
        }
        (None, None) => Err(Error::NotAWorkingCopy(crate::wc::display(path)).into()),
    }
}
