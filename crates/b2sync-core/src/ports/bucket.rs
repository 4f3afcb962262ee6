//! Bucket port (driven/secondary port)
//!
//! This module defines the interface to the object-storage client that the
//! sync engine drives: listing all versions under a prefix, writing new
//! versions from local files or server-side copies, reading content back,
//! hiding names and deleting versions.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Methods are blocking. The engine calls them from its own worker threads,
//!   so an implementation may block on network I/O freely.
//! - Retries of transient failures belong to the implementation; the engine
//!   only needs to know whether a call ultimately succeeded.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::encryption::EncryptionSetting;
use crate::domain::file_version::FileVersion;
use crate::ports::progress::IProgressListener;

// ============================================================================
// OutboundSource
// ============================================================================

/// One piece of content that makes up a new remote version
///
/// A plain upload has a single [`OutboundSource::LocalFile`]. An incremental
/// upload concatenates a server-side [`OutboundSource::Copy`] of the bytes
/// that are already stored with a [`OutboundSource::LocalFileRange`] holding
/// the new tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundSource {
    /// A whole local file
    LocalFile {
        /// Full local path
        path: PathBuf,
        /// Size in bytes
        length: u64,
        /// Hex SHA1, when already computed
        content_sha1: Option<String>,
    },
    /// A byte range of a local file
    LocalFileRange {
        /// Full local path
        path: PathBuf,
        /// First byte to send
        offset: u64,
        /// Number of bytes to send
        length: u64,
    },
    /// A byte range of an existing remote version
    Copy {
        /// Version to copy from
        file_id: String,
        /// First byte to copy
        offset: u64,
        /// Number of bytes to copy
        length: u64,
        /// Encryption needed to read the source, if any
        encryption: Option<EncryptionSetting>,
        /// File info of the source version
        file_info: BTreeMap<String, String>,
        /// Content type of the source version
        content_type: Option<String>,
    },
}

impl OutboundSource {
    /// Number of bytes this source contributes
    #[must_use]
    pub fn length(&self) -> u64 {
        match self {
            Self::LocalFile { length, .. }
            | Self::LocalFileRange { length, .. }
            | Self::Copy { length, .. } => *length,
        }
    }

    /// Returns true for server-side copy sources
    #[must_use]
    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Copy { .. })
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Parameters for writing a new version from one or more sources
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Pieces to concatenate, in order
    pub sources: Vec<OutboundSource>,
    /// Name of the new version
    pub file_name: String,
    /// User metadata to store
    pub file_info: BTreeMap<String, String>,
    /// Encryption for the new version (`None` lets the server decide)
    pub encryption: Option<EncryptionSetting>,
    /// Whole-file SHA1 for multi-source uploads
    pub large_file_sha1: Option<String>,
}

/// Parameters for a server-side copy of a whole version
#[derive(Debug, Clone)]
pub struct CopyRequest {
    /// Version to copy
    pub file_id: String,
    /// Name of the new version
    pub new_file_name: String,
    /// Number of bytes to copy
    pub length: u64,
    /// Encryption needed to read the source
    pub source_encryption: Option<EncryptionSetting>,
    /// Encryption for the new version
    pub destination_encryption: Option<EncryptionSetting>,
    /// File info of the source version
    pub source_file_info: BTreeMap<String, String>,
    /// Content type of the source version
    pub source_content_type: Option<String>,
}

/// Content stream returned by a download
pub struct DownloadedFile {
    /// The version being read
    pub file_version: FileVersion,
    /// Content stream
    pub content: Box<dyn Read + Send>,
}

impl std::fmt::Debug for DownloadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedFile")
            .field("file_version", &self.file_version)
            .finish_non_exhaustive()
    }
}

/// Ordered listing of file versions
pub type VersionListing<'a> = Box<dyn Iterator<Item = anyhow::Result<FileVersion>> + Send + 'a>;

// ============================================================================
// IBucket trait
// ============================================================================

/// Port trait for one storage bucket
pub trait IBucket: Send + Sync {
    /// Bucket name
    fn name(&self) -> &str;

    /// Lists every version whose name starts with `prefix`
    ///
    /// Versions are ordered by file name (byte-wise), and newest first within
    /// a name. Hide markers and unfinished large files are included.
    ///
    /// # Arguments
    /// * `prefix` - Name prefix; an empty string lists the whole bucket
    fn ls_versions(&self, prefix: &str) -> anyhow::Result<VersionListing<'_>>;

    /// Writes a new version by concatenating `request.sources`
    ///
    /// # Arguments
    /// * `request` - Sources, name and metadata of the new version
    /// * `progress` - Optional listener receiving cumulative byte counts
    ///
    /// # Returns
    /// The stored version
    fn concatenate(
        &self,
        request: UploadRequest,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<FileVersion>;

    /// Opens the content of a version for reading
    ///
    /// # Arguments
    /// * `file_id` - Version to read
    /// * `encryption` - Setting needed to read it, if any
    /// * `progress` - Optional listener receiving cumulative byte counts
    fn download_file_by_id(
        &self,
        file_id: &str,
        encryption: Option<&EncryptionSetting>,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<DownloadedFile>;

    /// Copies a version server-side into this bucket
    ///
    /// # Arguments
    /// * `request` - Source version and destination name
    /// * `progress` - Optional listener receiving cumulative byte counts
    fn copy(
        &self,
        request: CopyRequest,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<FileVersion>;

    /// Writes a hide marker for `file_name`
    fn hide_file(&self, file_name: &str) -> anyhow::Result<FileVersion>;

    /// Permanently deletes one version
    fn delete_file_version(&self, file_id: &str, file_name: &str) -> anyhow::Result<()>;
}

// ============================================================================
// IBucketProvider trait
// ============================================================================

/// Port trait resolving bucket names to bucket handles
pub trait IBucketProvider: Send + Sync {
    /// Looks up a bucket by name
    ///
    /// # Errors
    /// Returns an error if the bucket does not exist or cannot be accessed.
    fn get_bucket_by_name(&self, name: &str) -> anyhow::Result<Arc<dyn IBucket>>;
}
