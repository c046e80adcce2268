//! Core error model.

use thiserror::Error;

/// Result type used across the core data model.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core-level error.
///
/// Keep this focused on the data model itself (identifiers, codec framing,
/// layouts). Storage and pipeline failures belong to their own layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A value could not be serialized through the codec.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// A byte buffer could not be decoded back into a value.
    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// A fingerprint string was not valid hex of the expected width.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn serialize(msg: impl Into<String>) -> Self {
        Self::Serialize(msg.into())
    }

    pub fn deserialize(msg: impl Into<String>) -> Self {
        Self::Deserialize(msg.into())
    }
}
