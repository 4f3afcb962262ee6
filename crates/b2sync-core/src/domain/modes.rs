//! Synchronization mode selectors
//!
//! Each mode is a closed enum that serializes to its upper-case name
//! (`RAISE_ERROR`, `KEEP_BEFORE_DELETE`, ...) so that configuration files
//! and command-line flags share one spelling.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Uppercase and replace `-` with `_` so `keep-before-delete` parses.
fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace('-', "_")
}

// ============================================================================
// NewerFileSyncMode
// ============================================================================

/// How to handle a destination file that is newer than its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewerFileSyncMode {
    /// Leave the newer destination untouched
    Skip,
    /// Overwrite the destination with the older source
    Replace,
    /// Abort the whole sync
    #[default]
    RaiseError,
}

impl NewerFileSyncMode {
    /// Every variant, in declaration order.
    pub const ALL: &'static [Self] = &[Self::Skip, Self::Replace, Self::RaiseError];

    /// Canonical upper-case spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "SKIP",
            Self::Replace => "REPLACE",
            Self::RaiseError => "RAISE_ERROR",
        }
    }
}

impl Display for NewerFileSyncMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewerFileSyncMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "SKIP" => Ok(Self::Skip),
            "REPLACE" => Ok(Self::Replace),
            "RAISE_ERROR" => Ok(Self::RaiseError),
            _ => Err(DomainError::InvalidEnumValue {
                kind: "newer file mode",
                value: s.to_string(),
                expected: "SKIP, REPLACE, RAISE_ERROR",
            }),
        }
    }
}

// ============================================================================
// CompareVersionMode
// ============================================================================

/// How source and destination versions are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareVersionMode {
    /// Modification time, in milliseconds
    #[default]
    Modtime,
    /// Byte size
    Size,
    /// Name only: a present destination is never replaced
    None,
}

impl CompareVersionMode {
    /// Every variant, in declaration order.
    pub const ALL: &'static [Self] = &[Self::Modtime, Self::Size, Self::None];

    /// Canonical upper-case spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Modtime => "MODTIME",
            Self::Size => "SIZE",
            Self::None => "NONE",
        }
    }
}

impl Display for CompareVersionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareVersionMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "MODTIME" => Ok(Self::Modtime),
            "SIZE" => Ok(Self::Size),
            "NONE" => Ok(Self::None),
            _ => Err(DomainError::InvalidEnumValue {
                kind: "compare version mode",
                value: s.to_string(),
                expected: "MODTIME, SIZE, NONE",
            }),
        }
    }
}

// ============================================================================
// KeepOrDeleteMode
// ============================================================================

/// What happens to destination versions the source no longer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeepOrDeleteMode {
    /// Delete old versions as soon as a new one is in place
    Delete,
    /// Keep old versions for `keep_days`, then delete them
    KeepBeforeDelete,
    /// Never delete anything
    #[default]
    NoDelete,
}

impl KeepOrDeleteMode {
    /// Every variant, in declaration order.
    pub const ALL: &'static [Self] = &[Self::Delete, Self::KeepBeforeDelete, Self::NoDelete];

    /// Canonical upper-case spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::KeepBeforeDelete => "KEEP_BEFORE_DELETE",
            Self::NoDelete => "NO_DELETE",
        }
    }
}

impl Display for KeepOrDeleteMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeepOrDeleteMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "DELETE" => Ok(Self::Delete),
            "KEEP_BEFORE_DELETE" => Ok(Self::KeepBeforeDelete),
            "NO_DELETE" => Ok(Self::NoDelete),
            _ => Err(DomainError::InvalidEnumValue {
                kind: "keep or delete mode",
                value: s.to_string(),
                expected: "DELETE, KEEP_BEFORE_DELETE, NO_DELETE",
            }),
        }
    }
}

// ============================================================================
// UploadMode
// ============================================================================

/// Whether uploads may reuse an unchanged prefix already stored remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadMode {
    /// Always send the whole file
    #[default]
    Full,
    /// Copy the unchanged prefix server-side and upload only the tail
    Incremental,
}

impl UploadMode {
    /// Every variant, in declaration order.
    pub const ALL: &'static [Self] = &[Self::Full, Self::Incremental];

    /// Canonical upper-case spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Incremental => "INCREMENTAL",
        }
    }
}

impl Display for UploadMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "FULL" => Ok(Self::Full),
            "INCREMENTAL" => Ok(Self::Incremental),
            _ => Err(DomainError::InvalidEnumValue {
                kind: "upload mode",
                value: s.to_string(),
                expected: "FULL, INCREMENTAL",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(NewerFileSyncMode::default(), NewerFileSyncMode::RaiseError);
        assert_eq!(CompareVersionMode::default(), CompareVersionMode::Modtime);
        assert_eq!(KeepOrDeleteMode::default(), KeepOrDeleteMode::NoDelete);
        assert_eq!(UploadMode::default(), UploadMode::Full);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "keep-before-delete".parse::<KeepOrDeleteMode>().unwrap(),
            KeepOrDeleteMode::KeepBeforeDelete
        );
        assert_eq!(
            "Raise_Error".parse::<NewerFileSyncMode>().unwrap(),
            NewerFileSyncMode::RaiseError
        );
        assert_eq!(
            "size".parse::<CompareVersionMode>().unwrap(),
            CompareVersionMode::Size
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "sometimes".parse::<UploadMode>().unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidEnumValue {
                kind: "upload mode",
                ..
            }
        ));
    }

    #[test]
    fn test_display_matches_serde() {
        for mode in KeepOrDeleteMode::ALL {
            let yaml = serde_yaml::to_string(mode).unwrap();
            assert_eq!(yaml.trim(), mode.to_string());
        }
        for mode in CompareVersionMode::ALL {
            let json = serde_json::to_string(mode).unwrap();
            assert_eq!(json, format!("\"{mode}\""));
        }
    }

    #[test]
    fn test_deserialize_strict() {
        let parsed: UploadMode = serde_yaml::from_str("INCREMENTAL").unwrap();
        assert_eq!(parsed, UploadMode::Incremental);
        assert!(serde_yaml::from_str::<UploadMode>("incremental").is_err());
    }
}
