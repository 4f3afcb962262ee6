//! Remote file versions
//!
//! A bucket keeps every version written under a name: uploads, hide markers
//! and unfinished large files. [`FileVersion`] is the listing record for one
//! of them.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::encryption::EncryptionSetting;

/// File-info key carrying the source modification time in milliseconds.
pub const SRC_LAST_MODIFIED_MILLIS: &str = "src_last_modified_millis";

/// File-info key carrying the whole-file SHA1 of a multi-part upload.
pub const LARGE_FILE_SHA1: &str = "large_file_sha1";

/// Prefix marking a content hash the service did not verify.
pub const UNVERIFIED_CHECKSUM_PREFIX: &str = "unverified:";

// ============================================================================
// FileAction
// ============================================================================

/// Kind of record a version represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Regular stored content
    Upload,
    /// Hide marker: the name is deleted as of this version
    Hide,
    /// Large file upload in progress, no retrievable content
    Start,
    /// Cancelled large file upload
    Cancel,
    /// Virtual folder entry (non-recursive listings only)
    Folder,
}

impl Display for FileAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upload => "upload",
            Self::Hide => "hide",
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Folder => "folder",
        };
        f.write_str(s)
    }
}

// ============================================================================
// FileVersion
// ============================================================================

/// One stored version of a remote file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    /// Service-assigned version identifier
    pub id: String,
    /// Full name inside the bucket
    pub file_name: String,
    /// Size in bytes (zero for hide markers)
    pub size: u64,
    /// MIME type recorded at upload time
    pub content_type: Option<String>,
    /// Raw content hash as listed, possibly `none` or `unverified:`-prefixed
    pub content_sha1: Option<String>,
    /// User metadata
    pub file_info: BTreeMap<String, String>,
    /// Upload time in milliseconds since the epoch
    pub upload_timestamp: i64,
    /// What this version represents
    pub action: FileAction,
    /// Server-side encryption of the stored content
    pub server_side_encryption: Option<EncryptionSetting>,
}

impl FileVersion {
    /// Modification time in milliseconds.
    ///
    /// Uses the `src_last_modified_millis` file info recorded by the
    /// uploader when present and parseable, otherwise the upload timestamp.
    #[must_use]
    pub fn mod_time_millis(&self) -> i64 {
        self.file_info
            .get(SRC_LAST_MODIFIED_MILLIS)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(self.upload_timestamp)
    }

    /// Modification time as a UTC timestamp, if representable
    #[must_use]
    pub fn mod_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.mod_time_millis())
    }

    /// Hex SHA1 of the whole content, if known.
    ///
    /// An `unverified:` prefix is stripped and the literal `none` means
    /// unknown; in that case the `large_file_sha1` file info is consulted.
    #[must_use]
    pub fn content_sha1(&self) -> Option<&str> {
        let listed = self
            .content_sha1
            .as_deref()
            .map(|s| s.strip_prefix(UNVERIFIED_CHECKSUM_PREFIX).unwrap_or(s))
            .filter(|s| !s.is_empty() && *s != "none");
        listed.or_else(|| self.file_info.get(LARGE_FILE_SHA1).map(String::as_str))
    }

    /// Returns true for hide markers
    #[must_use]
    pub fn is_hide_marker(&self) -> bool {
        self.action == FileAction::Hide
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(action: FileAction) -> FileVersion {
        FileVersion {
            id: "id_1".to_string(),
            file_name: "folder/a.txt".to_string(),
            size: 10,
            content_type: Some("text/plain".to_string()),
            content_sha1: None,
            file_info: BTreeMap::new(),
            upload_timestamp: 5_000,
            action,
            server_side_encryption: None,
        }
    }

    #[test]
    fn test_mod_time_prefers_file_info() {
        let mut v = version(FileAction::Upload);
        assert_eq!(v.mod_time_millis(), 5_000);

        v.file_info
            .insert(SRC_LAST_MODIFIED_MILLIS.to_string(), "1234".to_string());
        assert_eq!(v.mod_time_millis(), 1_234);

        v.file_info
            .insert(SRC_LAST_MODIFIED_MILLIS.to_string(), "garbage".to_string());
        assert_eq!(v.mod_time_millis(), 5_000);
    }

    #[test]
    fn test_content_sha1_normalization() {
        let mut v = version(FileAction::Upload);
        assert_eq!(v.content_sha1(), None);

        v.content_sha1 = Some("none".to_string());
        assert_eq!(v.content_sha1(), None);

        v.file_info
            .insert(LARGE_FILE_SHA1.to_string(), "abc".to_string());
        assert_eq!(v.content_sha1(), Some("abc"));

        v.content_sha1 = Some("unverified:def".to_string());
        assert_eq!(v.content_sha1(), Some("def"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(FileAction::Hide.to_string(), "hide");
        assert!(version(FileAction::Hide).is_hide_marker());
        assert!(!version(FileAction::Upload).is_hide_marker());
    }
}
