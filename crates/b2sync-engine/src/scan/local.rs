//! Local folder scanner
//!
//! Walks a directory tree lazily and yields one [`LocalPath`] per file, in
//! the order the same names would be listed by a bucket. Each directory is
//! listed and sorted before any of its entries is yielded, with directory
//! names sorted as if they ended in `/`. For `a/`, `a.txt` and `a0.txt`
//! that gives `a.txt`, `a/...`, `a0.txt`.
//!
//! Only one sorted listing per directory level is held in memory.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use b2sync_core::domain::{validate_file_name, DomainError, LocalPath, ScanPath};
use tracing::{debug, warn};

use crate::report::ScanReporter;
use crate::scan::policies::ScanPolicy;
use crate::{Result, SyncError};

// ============================================================================
// LocalFolder
// ============================================================================

/// A directory on the local machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    /// Create a folder rooted at `root`, made absolute and normalized.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self {
            root: normalize(&absolute),
        })
    }

    /// Absolute root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for a `/`-separated relative name.
    ///
    /// # Errors
    /// [`SyncError::UnsupportedFilename`] if the name escapes the root.
    pub fn make_full_path(&self, file_name: &str) -> Result<PathBuf> {
        let native: PathBuf = file_name.split('/').collect();
        let full_path = normalize(&self.root.join(native));
        if !full_path.starts_with(&self.root) {
            return Err(SyncError::unsupported_filename(
                "illegal file name",
                full_path.to_string_lossy(),
            ));
        }
        Ok(full_path)
    }

    /// Make sure the root exists, creating it if needed.
    pub fn ensure_present(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir(&self.root)
                .map_err(|_| SyncError::UnableToCreateDirectory(self.root.clone()))?;
            debug!(path = %self.root.display(), "created destination directory");
        } else if !self.root.is_dir() {
            return Err(SyncError::NotADirectory(self.root.clone()));
        }
        Ok(())
    }

    /// Make sure the root exists and has at least one entry.
    pub fn ensure_non_empty(&self) -> Result<()> {
        self.ensure_present()?;
        if fs::read_dir(&self.root)?.next().is_none() {
            return Err(SyncError::EmptyDirectory(self.root.clone()));
        }
        Ok(())
    }

    /// Lazily scan every file under the root.
    pub fn all_files<'a>(
        &self,
        reporter: Option<&'a dyn ScanReporter>,
        policy: &'a ScanPolicy,
    ) -> LocalScan<'a> {
        LocalScan::new(self.clone(), reporter, policy)
    }
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(unix)]
fn resolved_inode(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|m| m.ino())
}

#[cfg(not(unix))]
fn resolved_inode(_path: &Path) -> Option<u64> {
    None
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}

fn mod_time_millis(metadata: &fs::Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    let millis = match modified.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Ok(millis)
}

// ============================================================================
// LocalScan
// ============================================================================

/// One listed directory entry
#[derive(Debug)]
struct Entry {
    path: PathBuf,
    name: Option<String>,
    is_symlink: bool,
    is_dir: bool,
}

/// A directory being yielded from
struct Frame {
    entries: std::vec::IntoIter<Entry>,
    relative_dir: String,
    visited: HashSet<u64>,
}

/// Lazy iterator over the files of a [`LocalFolder`]
pub struct LocalScan<'a> {
    folder: LocalFolder,
    reporter: Option<&'a dyn ScanReporter>,
    policy: &'a ScanPolicy,
    stack: Vec<Frame>,
    started: bool,
}

impl<'a> LocalScan<'a> {
    fn new(
        folder: LocalFolder,
        reporter: Option<&'a dyn ScanReporter>,
        policy: &'a ScanPolicy,
    ) -> Self {
        Self {
            folder,
            reporter,
            policy,
            stack: Vec::new(),
            started: false,
        }
    }

    /// Pushes a frame for `dir` unless it is a symlink already visited on this branch.
    fn enter_directory(&mut self, dir: &Path, relative_dir: String, mut visited: HashSet<u64>) {
        if dir.is_symlink() {
            if let Some(inode) = resolved_inode(dir) {
                if !visited.insert(inode) {
                    if let Some(reporter) = self.reporter {
                        reporter.circular_symlink_skipped(dir);
                    }
                    return;
                }
            }
        }
        let entries = self.list_sorted(dir);
        self.stack.push(Frame {
            entries: entries.into_iter(),
            relative_dir,
            visited,
        });
    }

    fn list_sorted(&self, dir: &Path) -> Vec<Entry> {
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "could not list directory");
                return Vec::new();
            }
        };

        let mut keyed: Vec<(String, Entry)> = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "could not read directory entry");
                    continue;
                }
            };
            let path = dir_entry.path();
            let os_name = dir_entry.file_name();
            let name = os_name.to_str().map(str::to_string);
            let is_symlink = dir_entry
                .file_type()
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            let is_dir = path.is_dir();

            let mut key = name
                .clone()
                .unwrap_or_else(|| os_name.to_string_lossy().into_owned());
            if is_dir {
                key.push('/');
            }
            keyed.push((
                key,
                Entry {
                    path,
                    name,
                    is_symlink,
                    is_dir,
                },
            ));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, entry)| entry).collect()
    }
}

/// What to do with one listed entry
enum Visit {
    Skip,
    Enter { path: PathBuf, relative_path: String },
    Yield(LocalPath),
}

fn report(reporter: Option<&dyn ScanReporter>, f: impl FnOnce(&dyn ScanReporter)) {
    if let Some(reporter) = reporter {
        f(reporter);
    }
}

/// Applies symlink, name and policy checks to one entry.
fn visit(
    entry: Entry,
    relative_dir: &str,
    policy: &ScanPolicy,
    reporter: Option<&dyn ScanReporter>,
) -> Visit {
    if policy.exclude_all_symlinks() && entry.is_symlink {
        report(reporter, |r| r.symlink_skipped(&entry.path));
        return Visit::Skip;
    }

    let Some(name) = entry.name else {
        report(reporter, |r| {
            r.invalid_name(&entry.path, "file name must be valid Unicode, check locale")
        });
        return Visit::Skip;
    };
    // The whole relative path becomes the remote name
    let relative_path = join_relative(relative_dir, &name);
    if let Err(e) = validate_file_name(&relative_path) {
        let message = match e {
            DomainError::InvalidFileName(msg) => msg,
            other => other.to_string(),
        };
        report(reporter, |r| r.invalid_name(&entry.path, &message));
        return Visit::Skip;
    }

    if entry.is_dir {
        if policy.should_exclude_local_directory(&relative_path) {
            debug!(path = %relative_path, "directory excluded by policy");
            return Visit::Skip;
        }
        return Visit::Enter {
            path: entry.path,
            relative_path,
        };
    }

    if policy.should_exclude_relative_path(&relative_path) {
        return Visit::Skip;
    }

    let stat = fs::metadata(&entry.path)
        .and_then(|m| mod_time_millis(&m).map(|t| (t, m.len())));
    let (mod_time, size) = match stat {
        Ok(stat) => stat,
        Err(_) => {
            report(reporter, |r| r.local_access_error(&entry.path));
            return Visit::Skip;
        }
    };

    let local_path = LocalPath {
        absolute_path: entry.path,
        relative_path,
        mod_time,
        size,
    };
    if policy.should_exclude_local_path(&local_path) {
        return Visit::Skip;
    }
    if !is_readable(&local_path.absolute_path) {
        report(reporter, |r| r.local_permission_error(&local_path.absolute_path));
        return Visit::Skip;
    }
    Visit::Yield(local_path)
}

impl Iterator for LocalScan<'_> {
    type Item = Result<ScanPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let root = self.folder.root.clone();
            self.enter_directory(&root, String::new(), HashSet::new());
        }
        loop {
            let frame = self.stack.last_mut()?;
            let Some(entry) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };
            match visit(entry, &frame.relative_dir, self.policy, self.reporter) {
                Visit::Skip => {}
                Visit::Enter {
                    path,
                    relative_path,
                } => {
                    let visited = frame.visited.clone();
                    self.enter_directory(&path, relative_path, visited);
                }
                Visit::Yield(local_path) => return Some(Ok(ScanPath::Local(local_path))),
            }
        }
    }
}
