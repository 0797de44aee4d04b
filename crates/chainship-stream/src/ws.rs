//! `WsConnector`: WebSocket socket collaborator on `tokio-tungstenite`.
//!
//! # Usage
//! ```no_run
//! use chainship_stream::{config::ReaderConfig, reader::BlockReader, ws::WsConnector};
//! use chainship_registry::SchemaCache;
//! use std::sync::Arc;
//!
//! let reader = BlockReader::new(
//!     ReaderConfig::single_endpoint("ws://127.0.0.1:8080"),
//!     Arc::new(WsConnector::new()),
//!     SchemaCache::new(),
//! );
//! ```

use crate::error::TransportError;
use crate::socket::{Socket, SocketConnector};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Socket>, TransportError> {
        let (stream, _) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        info!("WebSocket connected: {}", endpoint);
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WsStream,
}

fn ws_err(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::WebSocket(e.to_string())
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.stream
            .send(Message::Binary(payload))
            .await
            .map_err(ws_err)
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.stream.next().await? {
                Err(e) => return Some(Err(ws_err(e))),
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                // nodes send the schema handshake as a text frame
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Close(frame)) => {
                    info!("WebSocket closed by server: {:?}", frame);
                    return None;
                }
                // tungstenite queues the pong reply to a ping on its own
                Ok(other) => debug!("WS control frame: {:?}", other),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ws_err(e)),
        }
    }
}
