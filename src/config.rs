//! Config loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::wc::{CURRENT_FORMAT, MIN_SUPPORTED_FORMAT};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Format that write-locked opens upgrade older admin areas to.
    pub target_format: u32,
    pub upgrade_on_open: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            target_format: CURRENT_FORMAT,
            upgrade_on_open: true,
        }
    }
}

impl AccessConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SUPPORTED_FORMAT..=CURRENT_FORMAT).contains(&self.target_format) {
            return Err(config_error(format!(
                "target_format {} outside supported range {MIN_SUPPORTED_FORMAT}..={CURRENT_FORMAT}",
                self.target_format
            )));
        }
        Ok(())
    }
}

pub fn load(path: &Path) -> Result<AccessConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
    let config: AccessConfig = serde_json::from_str(&contents)
        .map_err(|e| config_error(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Config from `path` when given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<AccessConfig> {
    match path {
        Some(path) => load(path),
        None => Ok(AccessConfig::default()),
    }
}

fn config_error(message: String) -> anyhow::Error {
    Error::Config(message).into()
}
