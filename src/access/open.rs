use std::{
    path::{is_separator, Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use super::{
    baton::{AdmAccess, LockState},
    close::discard,
    parent_of,
    registry::{ensure_set, join, Slot},
    AccessContext, CancelCheck, LockDepth,
};
use crate::{
    wc::{
        adm, check_path_kind, display, entries::lockable_subdirs, normalize_path, LogCommand,
        NodeKind, CURRENT_FORMAT, MIN_SUPPORTED_FORMAT, WCPROPS_MANY_FILES_FORMAT,
    },
    Error, Result,
};

/// Format of the admin area of `path`; an area still under construction
/// counts as no working copy at all.
fn read_format(ctx: &AccessContext, path: &Path) -> Result<u32> {
    match ctx.store.check_format(path)? {
        0 => Err(Error::NotAWorkingCopy(display(path)).into()),
        format => Ok(format),
    }
}

pub(crate) fn do_open(
    ctx: &Arc<AccessContext>,
    path: &Path,
    write_lock: bool,
    depth: LockDepth,
    cancel: CancelCheck<'_>,
) -> Result<AdmAccess> {
    let format = read_format(ctx, path)?;
    let access = AdmAccess::alloc(ctx.clone(), path.to_path_buf(), write_lock)?;
    access.state().format = format;

    if write_lock {
        if let Err(err) = maybe_upgrade_format(&access) {
            discard(&access);
            return Err(err);
        }
    }

    if !depth.is_zero() {
        if let Err(err) = open_children(ctx, &access, write_lock, depth.descend(), cancel) {
            discard(&access);
            return Err(err);
        }
    }

    debug!(
        path = %path.display(),
        write_lock,
        depth = %depth,
        format = access.format(),
        "opened access baton"
    );
    Ok(access)
}

fn open_children(
    ctx: &Arc<AccessContext>,
    access: &AdmAccess,
    write_lock: bool,
    depth: LockDepth,
    cancel: CancelCheck<'_>,
) -> Result<()> {
    let entries = access.entries()?;
    let registry = ensure_set(access);

    for (child_path, _) in lockable_subdirs(access.path(), &entries) {
        if let Some(cancel) = cancel {
            cancel()?;
        }

        match do_open(ctx, &child_path, write_lock, depth, cancel) {
            Ok(child) => join(access, &child),
            Err(err) if Error::is_not_a_working_copy(&err) => registry.insert_missing(&child_path),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Open `path`, joining it into the access set of `associated` when given.
pub(crate) fn open_in(
    ctx: &Arc<AccessContext>,
    associated: Option<&AdmAccess>,
    path: &Path,
    write_lock: bool,
    depth: LockDepth,
    cancel: CancelCheck<'_>,
) -> Result<AdmAccess> {
    if let Some(associated) = associated {
        let registry = ensure_set(associated);
        if let Some(Slot::Real(_)) = registry.get(path) {
            return Err(Error::AlreadyOpen(display(path)).into());
        }
    }

    let access = do_open(ctx, path, write_lock, depth, cancel)?;
    if let Some(associated) = associated {
        join(associated, &access);
    }
    Ok(access)
}

pub(crate) fn steal_write_lock(ctx: &Arc<AccessContext>, path: &Path) -> Result<AdmAccess> {
    let access = AdmAccess::new(ctx.clone(), path.to_path_buf(), LockState::WriteLocked);

    match adm::create_lock(path) {
        Ok(()) => {}
        Err(err) if matches!(Error::of(&err), Some(Error::Locked(_))) => {
            warn!(path = %path.display(), "stealing write lock");
            access.state().lock_stolen = true;
        }
        Err(_) if !adm::adm_area_exists(path) => {
            return Err(Error::NotAWorkingCopy(display(path)).into());
        }
        Err(err) => return Err(err),
    }
    access.state().lock_exists = true;

    let format = match ctx.store.check_format(path) {
        Ok(format) => format,
        Err(err) => {
            discard(&access);
            return Err(err);
        }
    };
    access.state().format = format;

    if let Err(err) = maybe_upgrade_format(&access) {
        discard(&access);
        return Err(err);
    }
    Ok(access)
}

fn check_supported_format(path: &Path, format: u32) -> Result<()> {
    if (MIN_SUPPORTED_FORMAT..=CURRENT_FORMAT).contains(&format) {
        Ok(())
    } else {
        Err(Error::UnsupportedFormat {
            path: display(path),
            format,
        }
        .into())
    }
}

/// Bring the admin area of a write-locked baton up to the configured format.
pub(crate) fn maybe_upgrade_format(access: &AdmAccess) -> Result<()> {
    let format = access.format();
    if format == 0 {
        return Ok(());
    }
    let path = access.path();
    check_supported_format(path, format)?;

    let ctx = access.ctx();
    let target = ctx.config.target_format;
    if !ctx.config.upgrade_on_open || format >= target {
        return Ok(());
    }
    if ctx.store.log_pending(path)? {
        debug!(path = %path.display(), format, "log pending, upgrade deferred to cleanup");
        return Ok(());
    }

    let mut commands = vec![LogCommand::UpgradeFormat { format: target }];
    let many_files = format <= WCPROPS_MANY_FILES_FORMAT;
    if many_files {
        commands.extend(convert_wcprops(access)?);
    }
    ctx.store.write_log(path, &commands)?;

    if many_files {
        if let Err(err) = ctx.store.remove_legacy_props(path) {
            debug!(path = %path.display(), error = %err, "leaving legacy wc property files behind");
        }
    }

    ctx.store.run_log(path)?;
    access.set_format(target)?;
    info!(path = %path.display(), from = format, to = target, "upgraded working copy");
    Ok(())
}

/// Log commands re-recording the per-entry wc properties of files and of
/// the directory itself in the single-file layout.
fn convert_wcprops(access: &AdmAccess) -> Result<Vec<LogCommand>> {
    let entries = access.entries()?;
    let mut commands = Vec::new();

    for entry in entries
        .values()
        .filter(|entry| entry.kind == NodeKind::File || entry.is_this_dir())
    {
        for (name, value) in access.versioned_props(&entry.name)? {
            commands.push(LogCommand::ModifyWcprop {
                entry: entry.name.clone(),
                name,
                value,
            });
        }
    }
    Ok(commands)
}

/// Last component of `raw` when it is `.` or `..`.
pub(crate) fn dot_base_name(raw: &Path) -> Option<&'static str> {
    let text = raw.to_string_lossy();
    let trimmed = text.trim_end_matches(is_separator);
    match trimmed.rsplit(is_separator).next() {
        Some(".") => Some("."),
        Some("..") => Some(".."),
        _ => None,
    }
}

/// Directory that holds `path`: `path` itself when it is a versioned
/// directory, its parent otherwise. Also returns the format found.
pub(crate) fn probe(ctx: &AccessContext, path: &Path, raw: &Path) -> Result<(PathBuf, u32)> {
    let mut format = 0;
    if check_path_kind(path)? == NodeKind::Dir {
        format = match ctx.store.check_format(path) {
            Ok(format) => format,
            Err(err) if Error::is_not_a_working_copy(&err) => 0,
            Err(err) => return Err(err),
        };
    }
    if format != 0 {
        return Ok((path.to_path_buf(), format));
    }

    if let Some(base_name) = dot_base_name(raw) {
        return Err(Error::BadPath {
            path: display(raw),
            base_name: base_name.to_string(),
        }
        .into());
    }
    Ok((parent_of(path), 0))
}

pub(crate) fn probe_open(
    ctx: &Arc<AccessContext>,
    associated: Option<&AdmAccess>,
    raw: &Path,
    write_lock: bool,
    depth: LockDepth,
    cancel: CancelCheck<'_>,
) -> Result<AdmAccess> {
    let path = normalize_path(raw)?;
    let (dir, _) = probe(ctx, &path, raw)?;
    let moved = dir != path;
    let depth = if moved { LockDepth::ZERO } else { depth };

    match open_in(ctx, associated, &dir, write_lock, depth, cancel) {
        Ok(access) => Ok(access),
        Err(err) => {
            // An unversioned directory makes its parent look unversioned too;
            // report the child instead.
            if moved
                && Error::is_not_a_working_copy(&err)
                && check_path_kind(&path)? == NodeKind::Dir
            {
                return Err(Error::NotAWorkingCopy(display(&path)).into());
            }
            Err(err)
        }
    }
}
