//! Remote folder scanner
//!
//! Lists every version under a bucket prefix and groups consecutive
//! versions of the same name into one [`RemotePath`]. The listing is
//! expected in name order, newest version first within a name.

use std::sync::{Arc, OnceLock};

use b2sync_core::domain::{FileAction, FileVersion, RemotePath, ScanPath};
use b2sync_core::ports::{IBucket, IBucketProvider, VersionListing};
use regex::Regex;
use tracing::warn;

use crate::scan::policies::ScanPolicy;
use crate::{Result, SyncError};

// ============================================================================
// Name checks
// ============================================================================

// Patterns are literals; test_name_patterns_compile covers every one.
fn relative_path_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(\.\.[/\\])|",
            r"^(\.[/\\])|",
            r"([/\\]\.\.[/\\])|",
            r"([/\\]\.[/\\])|",
            r"([/\\]\.\.)$|",
            r"([/\\]\.)$|",
            r"^(\.\.)$|",
            r"([/\\][/\\])|",
            r"^(\.)$",
        ))
        .expect("valid regex")
    })
}

fn absolute_path_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(/)|^(\\)").expect("valid regex"))
}

fn drive_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]):([/\\])").expect("valid regex"))
}

/// Rejects remote names that cannot be mapped safely below a local root.
///
/// # Errors
/// [`SyncError::UnsupportedFilename`] for relative segments (`.`, `..`,
/// doubled separators), a leading separator, or (on Windows) a drive letter.
pub fn validate_remote_file_name(file_name: &str) -> Result<()> {
    if relative_path_matcher().is_match(file_name) {
        return Err(SyncError::unsupported_filename(
            "scan does not support file names that include relative paths",
            file_name,
        ));
    }
    if absolute_path_matcher().is_match(file_name) {
        return Err(SyncError::unsupported_filename(
            "scan does not support file names with absolute paths",
            file_name,
        ));
    }
    if cfg!(windows) && drive_matcher().is_match(file_name) {
        return Err(SyncError::unsupported_filename(
            "scan does not support file names with drive letters",
            file_name,
        ));
    }
    Ok(())
}

/// Parent "directory" of a remote name; empty at the top level.
fn parent_dir(file_name: &str) -> &str {
    file_name.rsplit_once('/').map_or("", |(dir, _)| dir)
}

// ============================================================================
// RemoteFolder
// ============================================================================

/// A prefix inside a bucket
#[derive(Clone)]
pub struct RemoteFolder {
    bucket_name: String,
    folder_name: String,
    prefix: String,
    bucket: Arc<dyn IBucket>,
}

impl std::fmt::Debug for RemoteFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFolder")
            .field("bucket_name", &self.bucket_name)
            .field("folder_name", &self.folder_name)
            .finish_non_exhaustive()
    }
}

impl RemoteFolder {
    /// Resolve the bucket and create the folder.
    pub fn new(
        bucket_name: &str,
        folder_name: &str,
        provider: &dyn IBucketProvider,
    ) -> Result<Self> {
        let bucket = provider.get_bucket_by_name(bucket_name)?;
        Ok(Self::with_bucket(bucket, folder_name))
    }

    /// Create a folder on an already resolved bucket.
    pub fn with_bucket(bucket: Arc<dyn IBucket>, folder_name: &str) -> Self {
        let mut prefix = folder_name.to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self {
            bucket_name: bucket.name().to_string(),
            folder_name: folder_name.to_string(),
            prefix,
            bucket,
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn bucket(&self) -> &Arc<dyn IBucket> {
        &self.bucket
    }

    /// Full remote name for a relative name
    pub fn make_full_path(&self, file_name: &str) -> String {
        if self.folder_name.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.folder_name, file_name)
        }
    }

    /// Lazily scan every name under the folder.
    pub fn all_files<'a>(&'a self, policy: &'a ScanPolicy) -> RemoteScan<'a> {
        let listing: VersionListing<'a> = match self.bucket.ls_versions(&self.prefix) {
            Ok(listing) => listing,
            Err(e) => Box::new(std::iter::once(Err(e))),
        };
        RemoteScan {
            listing,
            prefix: &self.prefix,
            policy,
            last_ignored_dir: None,
            current_name: String::new(),
            current_versions: Vec::new(),
            done: false,
        }
    }
}

// ============================================================================
// RemoteScan
// ============================================================================

/// Lazy iterator over the names of a [`RemoteFolder`]
pub struct RemoteScan<'a> {
    listing: VersionListing<'a>,
    prefix: &'a str,
    policy: &'a ScanPolicy,
    last_ignored_dir: Option<String>,
    current_name: String,
    current_versions: Vec<FileVersion>,
    done: bool,
}

impl RemoteScan<'_> {
    fn take_current(&mut self) -> Option<ScanPath> {
        let versions = std::mem::take(&mut self.current_versions);
        let name = std::mem::take(&mut self.current_name);
        RemotePath::from_versions(name, versions).map(ScanPath::Remote)
    }

    fn fail(&mut self, error: SyncError) -> Option<Result<ScanPath>> {
        self.done = true;
        Some(Err(error))
    }
}

impl Iterator for RemoteScan<'_> {
    type Item = Result<ScanPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let version = match self.listing.next() {
                None => {
                    self.done = true;
                    return self.take_current().map(Ok);
                }
                Some(Err(e)) => return self.fail(SyncError::Remote(e)),
                Some(Ok(version)) => version,
            };

            if version.action == FileAction::Start {
                continue;
            }
            let Some(file_name) = version.file_name.strip_prefix(self.prefix) else {
                warn!(
                    file_name = %version.file_name,
                    prefix = %self.prefix,
                    "listing returned a name outside the folder"
                );
                continue;
            };
            let file_name = file_name.to_string();

            if matches!(&self.last_ignored_dir, Some(dir) if file_name.starts_with(dir.as_str())) {
                continue;
            }
            let dir_name = parent_dir(&file_name);
            if self.policy.should_exclude_remote_directory(dir_name) {
                self.last_ignored_dir = Some(format!("{dir_name}/"));
                continue;
            }
            self.last_ignored_dir = None;

            if self
                .policy
                .should_exclude_remote_file_version(&version, &file_name)
            {
                continue;
            }
            if let Err(e) = validate_remote_file_name(&file_name) {
                return self.fail(e);
            }

            if file_name != self.current_name && !self.current_versions.is_empty() {
                let finished = self.take_current();
                self.current_name = file_name;
                self.current_versions.push(version);
                if let Some(path) = finished {
                    return Some(Ok(path));
                }
                continue;
            }
            self.current_name = file_name;
            self.current_versions.push(version);
        }
    }
}
