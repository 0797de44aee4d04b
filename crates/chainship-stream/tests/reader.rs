//! Block reader behaviour against scripted in-memory sessions.
//!
//! Every session opens with the state-history protocol schema from
//! `fixtures/ship/ship_abi.json` as its handshake, exactly like a node.

use async_trait::async_trait;
use chainship_core::{AbiValue, Schema, TypeTable};
use chainship_registry::SchemaCache;
use chainship_stream::prelude::*;
use chainship_stream::{MemoryConnector, MemoryPeer, ReaderMetrics};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn ship_abi_json() -> String {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures/ship/ship_abi.json");
    std::fs::read_to_string(p).expect("fixture not found")
}

fn ship_table() -> TypeTable {
    TypeTable::new(&Schema::from_json(&ship_abi_json()).unwrap()).unwrap()
}

fn position(num: u32) -> AbiValue {
    AbiValue::object([
        ("block_num", AbiValue::from(num)),
        ("block_id", AbiValue::Bytes(vec![num as u8; 32])),
    ])
}

fn result(
    this_block: AbiValue,
    prev_block: AbiValue,
    block: AbiValue,
) -> Vec<u8> {
    let value = AbiValue::variant(
        "get_blocks_result_v0",
        AbiValue::object([
            ("head", position(500)),
            ("last_irreversible", position(480)),
            ("this_block", this_block),
            ("prev_block", prev_block),
            ("block", block),
            ("traces", AbiValue::Null),
            ("deltas", AbiValue::Null),
        ]),
    );
    ship_table().encode("result", &value).unwrap()
}

fn block_message(num: u32) -> Vec<u8> {
    result(position(num), position(num - 1), AbiValue::Null)
}

fn pong_message() -> Vec<u8> {
    result(AbiValue::Null, AbiValue::Null, AbiValue::Null)
}

fn signed_block(producer: &str) -> Vec<u8> {
    let block = AbiValue::from_json(&json!({
        "timestamp": 1_000,
        "producer": producer,
        "confirmed": 0,
        "previous": hex::encode([1u8; 32]),
        "transaction_mroot": hex::encode([2u8; 32]),
        "action_mroot": hex::encode([3u8; 32]),
        "schedule_version": 2,
        "new_producers": null,
        "header_extensions": [],
        "producer_signature": format!("00{}", hex::encode([4u8; 65])),
        "transactions": [],
        "block_extensions": []
    }));
    ship_table().encode("signed_block", &block).unwrap()
}

const ACK: [u8; 5] = [2, 1, 0, 0, 0];

#[derive(Clone, Default)]
struct Recorder {
    blocks: Arc<Mutex<Vec<u32>>>,
    producers: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BlockHandler for Recorder {
    async fn handle_block(&self, block: &ReceivedBlock, ctx: &BlockContext) -> Result<(), ReaderError> {
        self.blocks.lock().unwrap().push(block.block_num());
        if let Some(decoded) = block.decode_block(&ctx.table)? {
            let producer = decoded.field("producer").and_then(AbiValue::as_str).unwrap_or_default();
            self.producers.lock().unwrap().push(producer.to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Completions(Arc<Mutex<Vec<(u32, u32)>>>);

#[async_trait]
impl RangeCompleteHandler for Completions {
    async fn on_range_complete(&self, start: u32, end: u32) {
        self.0.lock().unwrap().push((start, end));
    }
}

#[derive(Clone, Default)]
struct Lifecycle(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl ConnectionHandler for Lifecycle {
    async fn on_connected(&self, version: &str) {
        self.0.lock().unwrap().push(format!("connected {version}"));
    }

    async fn on_disconnected(&self) {
        self.0.lock().unwrap().push("disconnected".into());
    }
}

fn config(endpoints: &[&str]) -> ReaderConfig {
    ReaderConfig {
        endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        reconnect_delay_ms: 10,
        handshake_timeout_ms: 200,
        auto_reconnect: true,
    }
}

struct Harness {
    reader: BlockReader,
    connector: MemoryConnector,
    peer: MemoryPeer,
    blocks: Recorder,
    completions: Completions,
    errors: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
}

async fn connected() -> Harness {
    let connector = MemoryConnector::new();
    let peer = connector.push_session(ship_abi_json());
    let mut reader = BlockReader::new(
        config(&["ws://node"]),
        Arc::new(connector.clone()),
        SchemaCache::new(),
    );
    let blocks = Recorder::default();
    let completions = Completions::default();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let warnings = Arc::new(Mutex::new(Vec::new()));
    reader.set_block_handler(blocks.clone());
    reader.set_range_complete_handler(completions.clone());
    let e = errors.clone();
    reader.on_error(move |err| e.lock().unwrap().push(err.to_string()));
    let w = warnings.clone();
    reader.on_warning(move |msg| w.lock().unwrap().push(msg.to_string()));

    reader.connect().await.unwrap();
    Harness {
        reader,
        connector,
        peer,
        blocks,
        completions,
        errors,
        warnings,
    }
}

// ─── Flow control ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn range_is_acked_block_by_block_and_completes_once() {
    let mut h = connected().await;
    assert_eq!(h.reader.schema_version(), Some("eosio::abi/1.1"));

    h.reader.read_range(100, 103, ReadOptions::default()).await.unwrap();
    let sent = h.peer.take_sent();
    assert_eq!(sent.len(), 1);
    let request = ship_table().decode("request", &sent[0]).unwrap();
    let (kind, body) = request.as_variant().unwrap();
    assert_eq!(kind, "get_blocks_request_v0");
    assert_eq!(body.field("start_block_num").and_then(AbiValue::as_u32), Some(100));
    assert_eq!(body.field("end_block_num").and_then(AbiValue::as_u32), Some(103));
    assert_eq!(body.field("max_messages_in_flight").and_then(AbiValue::as_u32), Some(1));

    for num in [100, 101] {
        h.peer.send(block_message(num));
        assert!(h.reader.process_next().await);
        assert_eq!(h.peer.take_sent(), vec![ACK.to_vec()]);
    }

    h.peer.send(block_message(102));
    h.peer.send(block_message(103));
    h.reader.process_next().await;
    h.reader.process_next().await;

    assert!(h.peer.take_sent().is_empty(), "no ack after the last block");
    assert_eq!(*h.blocks.blocks.lock().unwrap(), vec![100, 101, 102]);
    assert_eq!(*h.completions.0.lock().unwrap(), vec![(100, 103)]);
    assert_eq!(h.reader.active_range(), None);
    assert_eq!(
        h.reader.metrics(),
        ReaderMetrics {
            blocks_received: 3,
            acks_sent: 2,
            ranges_completed: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn single_block_completes_without_ack() {
    let mut h = connected().await;
    h.reader.read_one_block(42, ReadOptions::default()).await.unwrap();
    h.peer.take_sent();

    h.peer.send(result(position(42), position(41), AbiValue::Bytes(signed_block("alice"))));
    h.reader.process_next().await;

    assert!(h.peer.take_sent().is_empty());
    assert_eq!(*h.completions.0.lock().unwrap(), vec![(42, 43)]);
    assert_eq!(*h.blocks.producers.lock().unwrap(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn pong_is_neither_delivered_nor_acked() {
    let mut h = connected().await;
    h.reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    h.peer.take_sent();

    h.peer.send(pong_message());
    h.reader.process_next().await;

    assert!(h.blocks.blocks.lock().unwrap().is_empty());
    assert!(h.peer.take_sent().is_empty());
    assert_eq!(h.reader.metrics().pongs, 1);
    assert_eq!(h.reader.active_range(), Some((1, 10)));
}

#[tokio::test]
async fn pause_withholds_the_ack_until_resume() {
    let mut h = connected().await;
    h.reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    h.peer.take_sent();

    h.reader.pause();
    assert!(h.reader.is_paused());
    h.peer.send(block_message(1));
    h.reader.process_next().await;
    assert_eq!(*h.blocks.blocks.lock().unwrap(), vec![1]);
    assert!(h.peer.take_sent().is_empty());

    h.reader.resume().await;
    assert!(!h.reader.is_paused());
    assert_eq!(h.peer.take_sent(), vec![ACK.to_vec()]);

    // a second resume has nothing to release
    h.reader.resume().await;
    assert!(h.peer.take_sent().is_empty());
}

#[tokio::test]
async fn resume_after_the_last_block_sends_nothing() {
    let mut h = connected().await;
    h.reader.read_range(5, 7, ReadOptions::default()).await.unwrap();
    h.peer.take_sent();

    h.peer.send(block_message(5));
    h.reader.process_next().await;
    assert_eq!(h.peer.take_sent(), vec![ACK.to_vec()]);

    h.reader.pause();
    h.peer.send(block_message(6));
    h.reader.process_next().await;
    assert_eq!(*h.completions.0.lock().unwrap(), vec![(5, 7)]);

    h.reader.resume().await;
    assert!(!h.reader.is_paused());
    assert!(h.peer.take_sent().is_empty(), "completed range has no pending ack");
    assert_eq!(h.reader.metrics().acks_sent, 1);
}

// ─── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn read_range_rejects_empty_range() {
    let mut h = connected().await;
    assert!(matches!(
        h.reader.read_range(10, 10, ReadOptions::default()).await,
        Err(ReaderError::InvalidRange { start: 10, end: 10 })
    ));
    assert!(h.peer.take_sent().is_empty());
}

#[tokio::test]
async fn read_range_needs_a_connection() {
    let mut h = connected().await;
    h.reader.disconnect().await;
    assert!(matches!(
        h.reader.read_range(1, 2, ReadOptions::default()).await,
        Err(ReaderError::SchemaUnavailable)
    ));
}

// ─── Unexpected input ─────────────────────────────────────────────────────────

#[tokio::test]
async fn garbage_is_reported_and_the_stream_survives() {
    let mut h = connected().await;
    h.reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    h.peer.take_sent();

    h.peer.send(vec![0xff, 0xff, 0xff]);
    h.reader.process_next().await;
    assert_eq!(h.errors.lock().unwrap().len(), 1);
    assert_eq!(h.reader.metrics().decode_errors, 1);
    assert!(h.reader.is_connected());

    h.peer.send(block_message(1));
    h.reader.process_next().await;
    assert_eq!(*h.blocks.blocks.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn status_result_is_an_unhandled_type() {
    let mut h = connected().await;
    let status = AbiValue::variant(
        "get_status_result_v0",
        AbiValue::object([
            ("head", position(10)),
            ("last_irreversible", position(9)),
            ("trace_begin_block", AbiValue::from(1u32)),
            ("trace_end_block", AbiValue::from(10u32)),
            ("chain_state_begin_block", AbiValue::from(1u32)),
            ("chain_state_end_block", AbiValue::from(10u32)),
        ]),
    );
    h.peer.send(ship_table().encode("result", &status).unwrap());
    h.reader.process_next().await;

    let errors = h.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("get_status_result_v0"));
}

#[tokio::test]
async fn data_without_this_block_warns() {
    let mut h = connected().await;
    h.reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    h.peer.send(result(AbiValue::Null, AbiValue::Null, AbiValue::Bytes(vec![0])));
    h.reader.process_next().await;

    assert_eq!(
        *h.warnings.lock().unwrap(),
        vec!["the received message does not contain this_block".to_string()]
    );
    assert!(h.blocks.blocks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn block_without_range_is_dropped() {
    let mut h = connected().await;
    h.peer.send(block_message(7));
    h.reader.process_next().await;
    assert!(h.blocks.blocks.lock().unwrap().is_empty());
    assert_eq!(h.warnings.lock().unwrap().len(), 1);
}

// ─── Reconnection ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_close_reconnects_to_the_next_endpoint() {
    let connector = MemoryConnector::new();
    let first = connector.push_session(ship_abi_json());
    let second = connector.push_session(ship_abi_json());
    let mut reader = BlockReader::new(
        config(&["ws://a", "ws://b"]),
        Arc::new(connector.clone()),
        SchemaCache::new(),
    );
    let lifecycle = Lifecycle::default();
    reader.set_block_handler(Recorder::default());
    reader.set_connection_handler(lifecycle.clone());

    reader.connect().await.unwrap();
    reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    first.close();
    reader.process_next().await;

    assert!(reader.is_connected());
    assert_eq!(reader.active_range(), None, "range is dropped on reconnect");
    assert_eq!(connector.opened(), vec!["ws://a", "ws://b"]);
    assert_eq!(reader.metrics().reconnections, 1);
    assert_eq!(
        *lifecycle.0.lock().unwrap(),
        vec![
            "connected eosio::abi/1.1".to_string(),
            "disconnected".to_string(),
            "connected eosio::abi/1.1".to_string(),
        ]
    );
    // the handshake was resolved once and reused
    assert_eq!(reader.cache().stats().builds, 1);

    reader.read_range(1, 10, ReadOptions::default()).await.unwrap();
    assert_eq!(second.sent().len(), 1);
}

#[tokio::test]
async fn undecodable_handshake_after_reconnect_leaves_no_schema() {
    let connector = MemoryConnector::new();
    let first = connector.push_session(ship_abi_json());
    let second = connector.push_session(r#"{"version": 5}"#.to_string());
    let mut reader = BlockReader::new(
        config(&["ws://a", "ws://b"]),
        Arc::new(connector.clone()),
        SchemaCache::new(),
    );
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = errors.clone();
    reader.on_error(move |err| e.lock().unwrap().push(err.to_string()));
    reader.set_block_handler(Recorder::default());

    reader.connect().await.unwrap();
    assert_eq!(reader.schema_version(), Some("eosio::abi/1.1"));
    first.close();
    reader.process_next().await;

    assert!(reader.is_connected());
    assert_eq!(connector.opened(), vec!["ws://a", "ws://b"]);
    assert_eq!(reader.schema_version(), None);
    assert!(errors.lock().unwrap().iter().any(|e| e.starts_with("Codec error")));

    assert!(matches!(
        reader.read_range(1, 10, ReadOptions::default()).await,
        Err(ReaderError::SchemaUnavailable)
    ));
    assert!(second.sent().is_empty());
}

#[tokio::test]
async fn failed_attempt_retries_after_the_delay() {
    let connector = MemoryConnector::new();
    connector.push_failure("connection refused");
    connector.push_session(ship_abi_json());
    let mut reader = BlockReader::new(
        config(&["ws://node"]),
        Arc::new(connector.clone()),
        SchemaCache::new(),
    );
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = errors.clone();
    reader.on_error(move |err| e.lock().unwrap().push(err.to_string()));

    assert!(matches!(
        reader.connect().await,
        Err(ReaderError::Transport(TransportError::ConnectionFailed { .. }))
    ));
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert!(!reader.is_connected());

    assert!(reader.process_next().await);
    assert!(reader.is_connected());
    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn caller_disconnect_does_not_reconnect() {
    let mut h = connected().await;
    h.reader.disconnect().await;

    assert!(h.peer.is_closed());
    assert!(!h.reader.is_connected());
    assert_eq!(h.reader.schema_version(), None);
    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.reader.metrics().reconnections, 0);
    assert!(!h.reader.process_next().await);
}

// ─── Event loop ───────────────────────────────────────────────────────────────

struct Notify(mpsc::UnboundedSender<(u32, u32)>);

#[async_trait]
impl RangeCompleteHandler for Notify {
    async fn on_range_complete(&self, start: u32, end: u32) {
        let _ = self.0.send((start, end));
    }
}

#[tokio::test]
async fn spawned_reader_is_driven_through_its_handle() {
    let connector = MemoryConnector::new();
    let peer = connector.push_session(ship_abi_json());
    let mut reader = BlockReader::new(
        config(&["ws://node"]),
        Arc::new(connector.clone()),
        SchemaCache::new(),
    );
    let (tx, mut done) = mpsc::unbounded_channel();
    reader.set_block_handler(Recorder::default());
    reader.set_range_complete_handler(Notify(tx));

    let (handle, task) = reader.spawn();
    handle.connect().await.unwrap();
    handle.read_range(5, 8, ReadOptions::default()).await.unwrap();
    for num in 5..8 {
        peer.send(block_message(num));
    }

    let completed = tokio::time::timeout(Duration::from_secs(5), done.recv())
        .await
        .unwrap();
    assert_eq!(completed, Some((5, 8)));
    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.blocks_received, 3);
    assert_eq!(metrics.acks_sent, 2);

    handle.shutdown();
    task.await.unwrap();
    assert!(peer.is_closed());
    assert!(handle.metrics().await.is_err());
}
