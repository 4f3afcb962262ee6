//! Server-side encryption settings
//!
//! Only the shape needed to pass settings between the sync engine and a
//! storage client is modelled here; key negotiation is the client's job.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Server-side encryption mode of a stored version or a write request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionMode {
    /// Stored in plain form
    None,
    /// Encrypted with keys managed by the service
    SseB2,
    /// Encrypted with a customer-supplied key
    SseC,
    /// The listing did not say (e.g. missing permissions)
    Unknown,
}

/// An encryption setting attached to a version or a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSetting {
    /// Encryption mode
    pub mode: EncryptionMode,
    /// Algorithm name, e.g. `AES256`
    pub algorithm: Option<String>,
    /// Identifier of a customer-supplied key
    pub key_id: Option<String>,
}

impl EncryptionSetting {
    /// Setting for versions stored without encryption
    #[must_use]
    pub fn none() -> Self {
        Self {
            mode: EncryptionMode::None,
            algorithm: None,
            key_id: None,
        }
    }

    /// Service-managed AES256 encryption
    #[must_use]
    pub fn sse_b2() -> Self {
        Self {
            mode: EncryptionMode::SseB2,
            algorithm: Some("AES256".to_string()),
            key_id: None,
        }
    }

    /// Returns true if the listing did not reveal the actual setting
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.mode == EncryptionMode::Unknown
    }
}

impl Display for EncryptionSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.mode)?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, "/{algorithm}")?;
        }
        if let Some(key_id) = &self.key_id {
            write!(f, " key={key_id}")?;
        }
        Ok(())
    }
}
