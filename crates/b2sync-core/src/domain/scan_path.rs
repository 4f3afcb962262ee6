//! Scanned entries
//!
//! A scan yields one [`ScanPath`] per distinct relative path. Local entries
//! have exactly one version; remote entries aggregate every stored version
//! under the same name, newest first.

use std::path::PathBuf;

use serde::Serialize;

use super::file_version::{FileAction, FileVersion};

/// A file found on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalPath {
    /// OS-native full path
    pub absolute_path: PathBuf,
    /// `/`-separated path relative to the scan root
    pub relative_path: String,
    /// Modification time in milliseconds since the epoch
    pub mod_time: i64,
    /// Size in bytes
    pub size: u64,
}

/// A remote name together with its version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePath {
    /// `/`-separated path relative to the scanned folder
    pub relative_path: String,
    /// The most recent version
    pub selected_version: FileVersion,
    /// Every version under this name, newest first, hide markers included
    pub all_versions: Vec<FileVersion>,
}

impl RemotePath {
    /// Build from a newest-first version list.
    ///
    /// Returns `None` when `all_versions` is empty.
    #[must_use]
    pub fn from_versions(relative_path: String, all_versions: Vec<FileVersion>) -> Option<Self> {
        let selected_version = all_versions.first()?.clone();
        Some(Self {
            relative_path,
            selected_version,
            all_versions,
        })
    }
}

/// One entry produced by a folder scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScanPath {
    /// Local file
    Local(LocalPath),
    /// Remote file with history
    Remote(RemotePath),
}

impl ScanPath {
    /// Path relative to the scan root, `/`-separated
    #[must_use]
    pub fn relative_path(&self) -> &str {
        match self {
            Self::Local(p) => &p.relative_path,
            Self::Remote(p) => &p.relative_path,
        }
    }

    /// Modification time in milliseconds of the (selected) version
    #[must_use]
    pub fn mod_time(&self) -> i64 {
        match self {
            Self::Local(p) => p.mod_time,
            Self::Remote(p) => p.selected_version.mod_time_millis(),
        }
    }

    /// Size in bytes of the (selected) version
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Local(p) => p.size,
            Self::Remote(p) => p.selected_version.size,
        }
    }

    /// Whether the entry counts as present.
    ///
    /// A remote entry whose newest version is a hide marker is not visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        match self {
            Self::Local(_) => true,
            Self::Remote(p) => p.selected_version.action != FileAction::Hide,
        }
    }

    /// The local variant, if this is one
    #[must_use]
    pub fn as_local(&self) -> Option<&LocalPath> {
        match self {
            Self::Local(p) => Some(p),
            Self::Remote(_) => None,
        }
    }

    /// The remote variant, if this is one
    #[must_use]
    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            Self::Local(_) => None,
            Self::Remote(p) => Some(p),
        }
    }
}
