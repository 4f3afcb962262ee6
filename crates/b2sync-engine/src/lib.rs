//! b2sync Engine - Folder scanning and synchronization
//!
//! Provides:
//! - Local and remote folder scanners with regex/time filtering
//! - Sorted merge of two scans into source/destination pairs
//! - Per-file sync policies (transfer decision plus retention cleanup)
//! - Executable sync actions with dry-run support
//! - Bounded-queue worker pool and thread-safe progress reporting
//!
//! ## Modules
//!
//! - [`scan`] - Scan policy, folders, scanners and `zip_folders`
//! - [`policy`] - Transfer and cleanup decisions per path pair
//! - [`action`] - Upload/download/copy/hide/delete actions
//! - [`synchronizer`] - Orchestration of a whole sync run
//! - [`executor`] - Bounded queue executor
//! - [`report`] - Progress and sync reports
//! - [`simulator`] - In-memory bucket implementing the storage ports

pub mod action;
pub mod encryption;
pub mod executor;
pub mod format;
pub mod policy;
pub mod report;
pub mod scan;
pub mod simulator;
pub mod synchronizer;
pub mod upload_source;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during scanning and synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// An option or option combination is not acceptable
    #[error("{parameter} {message}")]
    InvalidArgument {
        /// Offending parameter name
        parameter: String,
        /// What is wrong with it
        message: String,
    },

    /// A file name cannot be represented safely on the other side
    #[error("{message}: {filename}")]
    UnsupportedFilename {
        /// Rule that was violated
        message: String,
        /// Offending name or path
        filename: String,
    },

    /// The destination is newer than the source under `RAISE_ERROR`
    #[error(
        "source file is older than destination: {source_prefix}{source_path} with a time of {source_mod_time} cannot be synced to {dest_prefix}{dest_path} with a time of {dest_mod_time}, unless a valid newer_file_mode is provided"
    )]
    DestFileNewer {
        /// URI prefix of the source side (`local://` or `b2://`)
        source_prefix: &'static str,
        /// Source relative path
        source_path: String,
        /// Source modification time in milliseconds
        source_mod_time: i64,
        /// URI prefix of the destination side
        dest_prefix: &'static str,
        /// Destination relative path
        dest_path: String,
        /// Destination modification time in milliseconds
        dest_mod_time: i64,
    },

    /// One or more actions failed while the run continued
    #[error("Incomplete sync: {failed} file(s) failed")]
    IncompleteSync {
        /// Number of failed actions
        failed: usize,
    },

    /// Source and destination kinds cannot be synced
    #[error("Unsupported sync direction: {source_kind} to {dest_kind}")]
    UnsupportedSyncDirection {
        /// Source folder kind
        source_kind: &'static str,
        /// Destination folder kind
        dest_kind: &'static str,
    },

    /// The local source folder has no entries
    #[error("Directory {0} is empty")]
    EmptyDirectory(PathBuf),

    /// The local destination folder could not be created
    #[error("unable to create directory {0}")]
    UnableToCreateDirectory(PathBuf),

    /// The local folder path exists but is not a directory
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from b2sync-core
    #[error("Domain error: {0}")]
    Domain(#[from] b2sync_core::domain::errors::DomainError),

    /// A storage port implementation reported a failure
    #[error("Remote error: {0:#}")]
    Remote(#[from] anyhow::Error),
}

impl SyncError {
    /// Shorthand for [`SyncError::InvalidArgument`]
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SyncError::UnsupportedFilename`]
    pub fn unsupported_filename(message: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::UnsupportedFilename {
            message: message.into(),
            filename: filename.into(),
        }
    }
}

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, SyncError>;
