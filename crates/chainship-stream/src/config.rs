//! Reader configuration.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for a [`BlockReader`](crate::reader::BlockReader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// State-history endpoints, tried round-robin, e.g. "ws://127.0.0.1:8080"
    pub endpoints: Vec<String>,
    /// Delay before the next attempt after a failed connection
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long to wait for the schema handshake after the socket opens
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Reconnect after a remote close or a failed attempt
    #[serde(default = "bool_true")]
    pub auto_reconnect: bool,
}

fn default_reconnect_delay_ms() -> u64 { 1_000 }
fn default_handshake_timeout_ms() -> u64 { 10_000 }
fn bool_true() -> bool { true }

impl ReaderConfig {
    /// Create a config for a single endpoint with default timings.
    pub fn single_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoints: vec![endpoint.into()],
            reconnect_delay_ms: default_reconnect_delay_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            auto_reconnect: true,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Checks that at least one endpoint exists and every endpoint is a
    /// `ws://` or `wss://` URL.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.endpoints.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        for endpoint in &self.endpoints {
            let parsed = url::Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(TransportError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
        Ok(())
    }
}

/// Which payloads to request with each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    #[serde(default = "bool_true")]
    pub fetch_traces: bool,
    #[serde(default = "bool_true")]
    pub fetch_deltas: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fetch_traces: true,
            fetch_deltas: true,
        }
    }
}
