//! # read_range
//!
//! Streams a block range from a state-history node and prints a one-line
//! summary per block.
//!
//! Run with:
//! ```sh
//! SHIP_ENDPOINT=ws://127.0.0.1:8080 START_BLOCK=1000 END_BLOCK=1010 \
//!     cargo run --bin read_range
//!
//! # JSON logs, flow control at debug, schemas persisted across runs:
//! LOG_JSON=1 LOG_STREAM=debug SHIP_ABI_DB=./ship_abis.db cargo run --bin read_range
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chainship_core::AbiValue;
use chainship_observability::{init_tracing, LogConfig};
use chainship_registry::{SchemaCache, SqliteSchemaStore};
use chainship_stream::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

struct Summary;

fn len_of(value: Option<AbiValue>) -> usize {
    value
        .as_ref()
        .and_then(AbiValue::as_array)
        .map_or(0, <[AbiValue]>::len)
}

#[async_trait]
impl BlockHandler for Summary {
    async fn handle_block(&self, block: &ReceivedBlock, ctx: &BlockContext) -> Result<(), ReaderError> {
        let decoded = block.decode_block(&ctx.table)?;
        let producer = decoded
            .as_ref()
            .and_then(|b| b.field("producer"))
            .and_then(AbiValue::as_str)
            .unwrap_or("-")
            .to_string();
        let transactions = len_of(decoded.and_then(|b| b.field("transactions").cloned()));
        let traces = len_of(block.decode_traces(&ctx.table)?);
        let deltas = len_of(block.decode_deltas(&ctx.table)?);

        println!(
            "#{:<10} {}  producer={:<12} txs={:<4} traces={:<4} deltas={:<4} lib={}",
            block.this_block.block_num,
            &block.this_block.block_id[..16.min(block.this_block.block_id.len())],
            producer,
            transactions,
            traces,
            deltas,
            block.last_irreversible.block_num,
        );
        Ok(())
    }
}

struct Done(mpsc::UnboundedSender<(u32, u32)>);

#[async_trait]
impl RangeCompleteHandler for Done {
    async fn on_range_complete(&self, start: u32, end: u32) {
        let _ = self.0.send((start, end));
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a block number")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────────────────────
    let mut log_config = LogConfig {
        json: std::env::var("LOG_JSON").is_ok(),
        ..LogConfig::default()
    };
    if let Ok(level) = std::env::var("LOG_STREAM") {
        log_config = log_config.with_component("chainship-stream", level);
    }
    init_tracing(&log_config)?;

    // ── 2. Configuration ──────────────────────────────────────────────────────
    let endpoint = std::env::var("SHIP_ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8080".into());
    let start = env_u32("START_BLOCK", 1)?;
    let end = env_u32("END_BLOCK", start.saturating_add(10))?;
    if end <= start {
        bail!("END_BLOCK ({end}) must be greater than START_BLOCK ({start})");
    }
    let config = ReaderConfig::single_endpoint(&endpoint);
    config.validate()?;

    let cache = match std::env::var("SHIP_ABI_DB") {
        Ok(path) => SchemaCache::with_store(Arc::new(
            SqliteSchemaStore::open(&path).with_context(|| format!("opening {path}"))?,
        )),
        Err(_) => SchemaCache::new(),
    };

    // ── 3. Reader ─────────────────────────────────────────────────────────────
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut reader = BlockReader::new(config, Arc::new(WsConnector::new()), cache);
    reader.set_block_handler(Summary);
    reader.set_range_complete_handler(Done(done_tx));
    reader.on_error(|e| warn!(error = %e, "stream error"));

    let (handle, task) = reader.spawn();
    handle.connect().await?;
    handle.read_range(start, end, ReadOptions::default()).await?;
    info!(endpoint = %endpoint, start, end, "streaming");

    // ── 4. Wait for the range, or Ctrl-C ──────────────────────────────────────
    tokio::select! {
        done = done_rx.recv() => {
            if let Some((s, e)) = done {
                info!(start = s, end = e, "range complete");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let metrics = handle.metrics().await?;
    info!(
        blocks = metrics.blocks_received,
        acks = metrics.acks_sent,
        pongs = metrics.pongs,
        decode_errors = metrics.decode_errors,
        "done"
    );
    handle.shutdown();
    task.await?;
    Ok(())
}
