//! Socket collaborator traits.
//!
//! The transport only needs to open a connection, send binary payloads,
//! receive whole messages and close. [`WsConnector`](crate::ws::WsConnector)
//! is the production implementation; [`MemoryConnector`](crate::memory::MemoryConnector)
//! drives the protocol without a network.

use crate::error::TransportError;
use async_trait::async_trait;

/// An open, message-framed connection.
#[async_trait]
pub trait Socket: Send {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Next inbound message; `None` once the connection has closed.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sockets to endpoints.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Socket>, TransportError>;
}
