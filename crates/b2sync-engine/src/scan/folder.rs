//! Folder abstraction and folder URI parsing
//!
//! A sync side is either a local directory or a prefix inside a bucket.
//! Remote folders are written `b2://bucket/path` or `b2:bucket/path`;
//! anything else names a local directory.

use std::path::PathBuf;

use b2sync_core::ports::IBucketProvider;

use crate::report::ScanReporter;
use crate::scan::local::LocalFolder;
use crate::scan::policies::ScanPolicy;
use crate::scan::remote::RemoteFolder;
use crate::scan::ScanIter;
use crate::{Result, SyncError};

// ============================================================================
// FolderUri
// ============================================================================

/// A parsed folder argument, before any bucket lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderUri {
    /// Local directory
    Local(PathBuf),
    /// Prefix inside a bucket
    Remote {
        bucket_name: String,
        /// Prefix without a trailing `/`; empty for the whole bucket
        folder_name: String,
    },
}

impl FolderUri {
    /// Parse a folder argument.
    ///
    /// # Errors
    /// [`SyncError::InvalidArgument`] when a remote path contains `//`.
    pub fn parse(folder_name: &str) -> Result<Self> {
        if let Some(rest) = folder_name.strip_prefix("b2://") {
            return Self::parse_bucket_and_folder(rest);
        }
        if let Some(rest) = folder_name.strip_prefix("b2:") {
            if rest.chars().next().is_some_and(char::is_alphanumeric) {
                return Self::parse_bucket_and_folder(rest);
            }
        }
        Ok(Self::Local(PathBuf::from(folder_name)))
    }

    fn parse_bucket_and_folder(bucket_and_path: &str) -> Result<Self> {
        if bucket_and_path.contains("//") {
            return Err(SyncError::invalid_argument(
                "folder_name",
                "'//' not allowed in path names",
            ));
        }
        let (bucket_name, folder_name) = bucket_and_path
            .split_once('/')
            .unwrap_or((bucket_and_path, ""));
        let folder_name = folder_name.strip_suffix('/').unwrap_or(folder_name);
        Ok(Self::Remote {
            bucket_name: bucket_name.to_string(),
            folder_name: folder_name.to_string(),
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

// ============================================================================
// Folder
// ============================================================================

/// One side of a sync
#[derive(Debug, Clone)]
pub enum Folder {
    Local(LocalFolder),
    Remote(RemoteFolder),
}

impl Folder {
    /// `"local"` or `"b2"`
    pub fn folder_type(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "b2",
        }
    }

    /// Lazily scan every entry, in relative-path order.
    ///
    /// `reporter` receives local scan problems; remote scans report errors
    /// through the returned items instead.
    pub fn all_files<'a>(
        &'a self,
        reporter: Option<&'a dyn ScanReporter>,
        policy: &'a ScanPolicy,
    ) -> ScanIter<'a> {
        match self {
            Self::Local(folder) => Box::new(folder.all_files(reporter, policy)),
            Self::Remote(folder) => Box::new(folder.all_files(policy)),
        }
    }

    pub fn as_local(&self) -> Option<&LocalFolder> {
        match self {
            Self::Local(folder) => Some(folder),
            Self::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteFolder> {
        match self {
            Self::Local(_) => None,
            Self::Remote(folder) => Some(folder),
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(folder) => write!(f, "LocalFolder({})", folder.root().display()),
            Self::Remote(folder) => write!(
                f,
                "B2Folder({}, {})",
                folder.bucket_name(),
                folder.folder_name()
            ),
        }
    }
}

/// Parse a folder argument and resolve its bucket if it is remote.
pub fn parse_folder(folder_name: &str, provider: &dyn IBucketProvider) -> Result<Folder> {
    match FolderUri::parse(folder_name)? {
        FolderUri::Local(path) => Ok(Folder::Local(LocalFolder::new(path)?)),
        FolderUri::Remote {
            bucket_name,
            folder_name,
        } => Ok(Folder::Remote(RemoteFolder::new(
            &bucket_name,
            &folder_name,
            provider,
        )?)),
    }
}
