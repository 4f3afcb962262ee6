//! Domain entities and business logic
//!
//! This module contains the core value types for b2sync:
//! - Remote file versions and their actions
//! - Scanned entries (local files and remote version histories)
//! - Synchronization mode selectors
//! - Remote file-name rules
//! - Server-side encryption settings
//! - Domain-specific error types

pub mod encryption;
pub mod errors;
pub mod file_name;
pub mod file_version;
pub mod modes;
pub mod scan_path;

// Re-export commonly used types
pub use encryption::{EncryptionMode, EncryptionSetting};
pub use errors::DomainError;
pub use file_name::validate_file_name;
pub use file_version::{
    FileAction, FileVersion, LARGE_FILE_SHA1, SRC_LAST_MODIFIED_MILLIS, UNVERIFIED_CHECKSUM_PREFIX,
};
pub use modes::{CompareVersionMode, KeepOrDeleteMode, NewerFileSyncMode, UploadMode};
pub use scan_path::{LocalPath, RemotePath, ScanPath};
