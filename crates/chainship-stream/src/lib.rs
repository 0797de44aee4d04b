//! # chainship-stream
//!
//! State-history streaming client.
//!
//! ## Layers
//! ```text
//! SocketConnector   WsConnector (tokio-tungstenite) or MemoryConnector
//!     │
//!     ▼
//! Transport         Idle / Connecting / Connected / Disconnecting, handshake
//!     │
//!     ▼
//! BlockReader       schema from the handshake, range requests, acks
//!     │
//!     ▼
//! BlockHandler      your code, one ReceivedBlock at a time
//! ```
//!
//! ## Quick start
//! ```no_run
//! use async_trait::async_trait;
//! use chainship_registry::SchemaCache;
//! use chainship_stream::prelude::*;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl BlockHandler for Printer {
//!     async fn handle_block(&self, block: &ReceivedBlock, _: &BlockContext) -> Result<(), ReaderError> {
//!         println!("block {}", block.block_num());
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), ReaderError> {
//! let mut reader = BlockReader::new(
//!     ReaderConfig::single_endpoint("ws://127.0.0.1:8080"),
//!     Arc::new(WsConnector::new()),
//!     SchemaCache::new(),
//! );
//! reader.set_block_handler(Printer);
//! reader.connect().await?;
//! reader.read_range(1_000, 1_010, ReadOptions::default()).await?;
//! while reader.active_range().is_some() && reader.process_next().await {}
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod memory;
pub mod messages;
pub mod reader;
pub mod socket;
pub mod transport;
pub mod ws;

pub use config::{ReadOptions, ReaderConfig};
pub use error::{ReaderError, TransportError};
pub use handler::{BlockContext, BlockHandler, ConnectionHandler, RangeCompleteHandler};
pub use memory::{MemoryConnector, MemoryPeer};
pub use messages::{BlockPosition, ReceivedBlock, ShipMessage};
pub use reader::{BlockReader, ReaderHandle, ReaderMetrics};
pub use socket::{Socket, SocketConnector};
pub use transport::{ConnectionState, StateChange, Transport};
pub use ws::WsConnector;

pub mod prelude {
    pub use crate::config::{ReadOptions, ReaderConfig};
    pub use crate::error::{ReaderError, TransportError};
    pub use crate::handler::{BlockContext, BlockHandler, ConnectionHandler, RangeCompleteHandler};
    pub use crate::messages::ReceivedBlock;
    pub use crate::reader::{BlockReader, ReaderHandle};
    pub use crate::ws::WsConnector;
}
