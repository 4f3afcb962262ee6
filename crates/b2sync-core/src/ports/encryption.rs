//! Encryption settings provider port
//!
//! Decides, per bucket and per file, which server-side encryption setting
//! each sync action should pass to the storage client. `None` means "let
//! the server decide" for writes and "no setting needed" for reads.

use std::collections::BTreeMap;

use crate::domain::encryption::EncryptionSetting;
use crate::domain::file_version::FileVersion;

/// Port trait for per-action encryption decisions
pub trait IEncryptionSettingsProvider: Send + Sync {
    /// Setting for uploading a new version
    ///
    /// # Arguments
    /// * `bucket_name` - Bucket receiving the upload
    /// * `file_name` - Name of the new version
    /// * `file_info` - Metadata that will be stored
    /// * `length` - Size in bytes
    fn setting_for_upload(
        &self,
        bucket_name: &str,
        file_name: &str,
        file_info: &BTreeMap<String, String>,
        length: u64,
    ) -> Option<EncryptionSetting>;

    /// Setting needed to read the source of a server-side copy
    fn source_setting_for_copy(
        &self,
        bucket_name: &str,
        source_version: &FileVersion,
    ) -> Option<EncryptionSetting>;

    /// Setting for the version written by a server-side copy
    fn destination_setting_for_copy(
        &self,
        bucket_name: &str,
        dest_file_name: &str,
        source_version: &FileVersion,
    ) -> Option<EncryptionSetting>;

    /// Setting needed to download a version
    fn setting_for_download(
        &self,
        bucket_name: &str,
        file_version: &FileVersion,
    ) -> Option<EncryptionSetting>;
}
