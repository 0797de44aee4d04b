//! Callback traits the reader dispatches to.

use crate::error::ReaderError;
use crate::messages::ReceivedBlock;
use async_trait::async_trait;
use chainship_core::TypeTable;
use std::sync::Arc;

/// What a block handler can see besides the block itself.
#[derive(Clone)]
pub struct BlockContext {
    /// The session's resolved schema; decodes the raw blobs.
    pub table: Arc<TypeTable>,
}

/// Receives each data message of an active range.
///
/// The reader awaits this before acknowledging the message, so a slow
/// handler slows the node down.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_block(&self, block: &ReceivedBlock, ctx: &BlockContext)
        -> Result<(), ReaderError>;
}

/// Notified once when the last block of a range has been handled.
#[async_trait]
pub trait RangeCompleteHandler: Send + Sync {
    async fn on_range_complete(&self, start_block: u32, end_block: u32);
}

/// Optional connection lifecycle notifications.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    async fn on_connected(&self, _abi_version: &str) {}

    async fn on_disconnected(&self) {}
}
