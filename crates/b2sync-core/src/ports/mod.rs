//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IBucket`] - Object storage operations on one bucket
//! - [`IBucketProvider`] - Bucket lookup by name
//! - [`IEncryptionSettingsProvider`] - Per-action encryption decisions
//! - [`IProgressListener`] - Per-file transfer progress

pub mod bucket;
pub mod encryption;
pub mod progress;

pub use bucket::{
    CopyRequest, DownloadedFile, IBucket, IBucketProvider, OutboundSource, UploadRequest,
    VersionListing,
};
pub use encryption::IEncryptionSettingsProvider;
pub use progress::IProgressListener;
