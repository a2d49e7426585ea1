//! Deferred-command log used for all-or-nothing admin-area changes.
//!
//! Commands are first written durably to the `log` file of a directory and
//! then executed. If the process dies in between, the log stays behind and
//! marks the directory as needing cleanup; running it again is idempotent.

use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    adm::{adm_child, write_format, ALL_WCPROPS_FILE, LOG_FILE},
    entries::PropMap,
};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum LogCommand {
    UpgradeFormat {
        format: u32,
    },
    ModifyWcprop {
        entry: String,
        name: String,
        value: String,
    },
}

pub(crate) fn write(dir: &Path, commands: &[LogCommand]) -> Result<()> {
    let log_path = adm_child(dir, LOG_FILE);
    let tmp_path = log_path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(commands)?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, &log_path)?;

    debug!(dir = %dir.display(), commands = commands.len(), "wrote admin log");
    Ok(())
}

pub(crate) fn read(dir: &Path) -> Result<Option<Vec<LogCommand>>> {
    match fs::read(adm_child(dir, LOG_FILE)) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn read_all_wcprops(dir: &Path) -> Result<BTreeMap<String, PropMap>> {
    match fs::read(adm_child(dir, ALL_WCPROPS_FILE)) {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn write_all_wcprops(dir: &Path, props: &BTreeMap<String, PropMap>) -> Result<()> {
    let data = serde_json::to_vec_pretty(props)?;
    fs::write(adm_child(dir, ALL_WCPROPS_FILE), data)?;
    Ok(())
}

/// Execute the pending log of `dir`, if any, and remove it.
pub(crate) fn run(dir: &Path) -> Result<()> {
    let Some(commands) = read(dir)? else {
        return Ok(());
    };

    // Property changes are applied in memory and written once.
    let touches_props = commands
        .iter()
        .any(|command| matches!(command, LogCommand::ModifyWcprop { .. }));
    let mut wcprops = if touches_props {
        Some(read_all_wcprops(dir)?)
    } else {
        None
    };
    let mut new_format = None;

    for command in &commands {
        match command {
            LogCommand::UpgradeFormat { format } => new_format = Some(*format),
            LogCommand::ModifyWcprop { entry, name, value } => {
                if let Some(props) = wcprops.as_mut() {
                    props
                        .entry(entry.clone())
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
            }
        }
    }

    if let Some(props) = &wcprops {
        write_all_wcprops(dir, props)?;
    }
    if let Some(format) = new_format {
        write_format(dir, format)?;
        info!(dir = %dir.display(), format, "upgraded admin area format");
    }

    fs::remove_file(adm_child(dir, LOG_FILE))?;
    debug!(dir = %dir.display(), commands = commands.len(), "ran admin log");
    Ok(())
}
