//! Error types for the transport and the block reader.

use chainship_core::CodecError;
use thiserror::Error;

/// Socket-level failures. All of them end in the reconnect path.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Handshake with {endpoint} failed: {reason}")]
    HandshakeFailed { endpoint: String, reason: String },

    #[error("No handshake from {endpoint} within {ms}ms")]
    HandshakeTimeout { endpoint: String, ms: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if trying another connection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::HandshakeFailed { .. }
                | Self::HandshakeTimeout { .. }
                | Self::WebSocket(_)
                | Self::Closed
        )
    }
}

/// Errors surfaced by the block reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("No block handler registered")]
    MissingHandler,

    #[error("No state-history schema available; the handshake has not completed")]
    SchemaUnavailable,

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid block range [{start}, {end})")]
    InvalidRange { start: u32, end: u32 },

    #[error("Unhandled message: {reason}")]
    UnhandledMessage { reason: String },

    #[error("Unhandled message type '{message_type}'")]
    UnhandledMessageType { message_type: String },

    #[error("Block handler failed: {0}")]
    Handler(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ReaderError {
    /// Errors caused by the caller rather than by the stream.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::MissingHandler
                | Self::SchemaUnavailable
                | Self::NotConnected
                | Self::InvalidRange { .. }
        )
    }
}
