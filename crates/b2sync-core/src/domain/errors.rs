//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as rejected file names and unparseable mode values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A name that the remote storage cannot hold
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// A textual mode value that matches no variant
    #[error("Invalid {kind} value '{value}'; valid options: {expected}")]
    InvalidEnumValue {
        /// Name of the enum being parsed
        kind: &'static str,
        /// The rejected input
        value: String,
        /// Comma-separated list of accepted values
        expected: &'static str,
    },
}
