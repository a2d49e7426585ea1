use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::NodeKind;

/// Name of the entry describing the directory itself.
pub const THIS_DIR: &str = "";

pub type Entries = BTreeMap<String, EntryMetadata>;
pub type PropMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Empty,
    Files,
    Immediates,
    #[default]
    Infinity,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(default)]
    pub depth: Depth,
}

impl EntryMetadata {
    pub fn this_dir(url: Option<String>, revision: Option<u64>) -> Self {
        Self {
            name: THIS_DIR.to_string(),
            kind: NodeKind::Dir,
            url,
            revision,
            depth: Depth::Infinity,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            url: None,
            revision: None,
            depth: Depth::Infinity,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Dir,
            url: None,
            revision: None,
            depth: Depth::Infinity,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn is_this_dir(&self) -> bool {
        self.name == THIS_DIR
    }

    /// Versioned subdirectory that a recursive open should descend into.
    pub fn is_lockable_subdir(&self) -> bool {
        self.kind == NodeKind::Dir && !self.is_this_dir() && self.depth != Depth::Exclude
    }
}

/// Subdirectory entries of `dir` that a recursive lock should descend into,
/// in name order, paired with their full paths.
pub fn lockable_subdirs<'a>(
    dir: &'a Path,
    entries: &'a Entries,
) -> impl Iterator<Item = (std::path::PathBuf, &'a EntryMetadata)> + 'a {
    entries
        .values()
        .filter(|entry| entry.is_lockable_subdir())
        .map(move |entry| (dir.join(&entry.name), entry))
}
