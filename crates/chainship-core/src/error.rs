//! Error types for the ChainShip codec and schema persistence.

use thiserror::Error;

/// Errors that can occur while encoding or decoding a single value.
///
/// Every variant is scoped to the record being processed: callers abandon
/// that record and keep the connection open.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },

    #[error("Malformed encoding: {reason}")]
    MalformedEncoding { reason: String },

    #[error("Type not found: {name}")]
    TypeNotFound { name: String },

    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Missing field '{field}' in {type_name}")]
    MissingField { type_name: String, field: String },

    #[error("Variant {variant} has no option '{option}'")]
    UnknownVariantOption { variant: String, option: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEncoding {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::TypeNotFound { name: name.into() }
    }

    pub(crate) fn invalid_schema(reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error came from the bytes themselves rather than
    /// from the schema (truncated or corrupt input).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderrun { .. } | Self::MalformedEncoding { .. }
        )
    }

    /// Codec failures are scoped to one record; the stream keeps going.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Errors from an external schema store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
