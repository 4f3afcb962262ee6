//! Folder scanning
//!
//! Scanners turn a folder into a lazy, strictly increasing sequence of
//! [`ScanPath`] entries; [`zip_folders`] joins two such sequences by
//! relative path.

pub mod folder;
pub mod local;
pub mod merge;
pub mod policies;
pub mod remote;

use b2sync_core::domain::ScanPath;

use crate::Result;

pub use folder::{parse_folder, Folder, FolderUri};
pub use local::LocalFolder;
pub use merge::{zip_folders, ScanPair, ZipFolders};
pub use policies::{ScanPolicy, ScanPolicyOptions};
pub use remote::{validate_remote_file_name, RemoteFolder};

/// Lazy sequence of scan results
pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<ScanPath>> + 'a>;
