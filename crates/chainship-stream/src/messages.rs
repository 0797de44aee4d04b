//! State-history wire messages.
//!
//! Outbound requests are built as [`AbiValue`]s and encoded against the
//! session's `request` variant; inbound payloads are decoded against
//! `result` and classified by [`ShipMessage::parse`].

use crate::config::ReadOptions;
use crate::error::ReaderError;
use chainship_core::{AbiValue, CodecError, TypeTable};
use serde::{Deserialize, Serialize};

/// Variant every outbound message is encoded as.
pub const REQUEST_TYPE: &str = "request";
/// Variant every inbound message after the handshake is decoded as.
pub const RESULT_TYPE: &str = "result";

const GET_BLOCKS_REQUEST: &str = "get_blocks_request_v0";
const GET_BLOCKS_ACK: &str = "get_blocks_ack_request_v0";
const GET_BLOCKS_RESULT: &str = "get_blocks_result_v0";

/// Ask for blocks `[start_block, end_block)`, one message in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRangeRequest {
    pub start_block: u32,
    pub end_block: u32,
    pub fetch_traces: bool,
    pub fetch_deltas: bool,
}

impl BlockRangeRequest {
    pub fn new(start_block: u32, end_block: u32, options: ReadOptions) -> Self {
        Self {
            start_block,
            end_block,
            fetch_traces: options.fetch_traces,
            fetch_deltas: options.fetch_deltas,
        }
    }

    pub fn to_value(&self) -> AbiValue {
        AbiValue::variant(
            GET_BLOCKS_REQUEST,
            AbiValue::object([
                ("start_block_num", AbiValue::from(self.start_block)),
                ("end_block_num", AbiValue::from(self.end_block)),
                ("max_messages_in_flight", AbiValue::from(1u32)),
                ("have_positions", AbiValue::Array(Vec::new())),
                ("irreversible_only", AbiValue::Bool(false)),
                ("fetch_block", AbiValue::Bool(true)),
                ("fetch_traces", AbiValue::Bool(self.fetch_traces)),
                ("fetch_deltas", AbiValue::Bool(self.fetch_deltas)),
            ]),
        )
    }

    pub fn encode(&self, table: &TypeTable) -> Result<Vec<u8>, CodecError> {
        table.encode(REQUEST_TYPE, &self.to_value())
    }
}

/// Acknowledge `num_messages` received results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRequest {
    pub num_messages: u32,
}

impl AckRequest {
    pub fn new(num_messages: u32) -> Self {
        Self { num_messages }
    }

    pub fn to_value(&self) -> AbiValue {
        AbiValue::variant(
            GET_BLOCKS_ACK,
            AbiValue::object([("num_messages", AbiValue::from(self.num_messages))]),
        )
    }

    pub fn encode(&self, table: &TypeTable) -> Result<Vec<u8>, CodecError> {
        table.encode(REQUEST_TYPE, &self.to_value())
    }
}

/// A block number with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPosition {
    pub block_num: u32,
    /// Lowercase hex
    pub block_id: String,
}

impl BlockPosition {
    fn from_value(value: &AbiValue, field: &str) -> Result<Self, ReaderError> {
        let bad = |what: &str| ReaderError::UnhandledMessage {
            reason: format!("{field}: {what}"),
        };
        let block_num = value
            .field("block_num")
            .and_then(AbiValue::as_u32)
            .ok_or_else(|| bad("missing block_num"))?;
        let block_id = value
            .field("block_id")
            .and_then(AbiValue::as_bytes)
            .map(hex::encode)
            .ok_or_else(|| bad("missing block_id"))?;
        Ok(Self {
            block_num,
            block_id,
        })
    }
}

/// One data message of an active range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedBlock {
    pub head: BlockPosition,
    pub last_irreversible: BlockPosition,
    pub this_block: BlockPosition,
    pub prev_block: Option<BlockPosition>,
    /// Serialized `signed_block`
    pub block: Option<Vec<u8>>,
    /// Serialized `transaction_trace[]`
    pub traces: Option<Vec<u8>>,
    /// Serialized `table_delta[]`
    pub deltas: Option<Vec<u8>>,
    /// Schema version the message was decoded with
    pub abi_version: String,
}

impl ReceivedBlock {
    pub fn block_num(&self) -> u32 {
        self.this_block.block_num
    }

    pub fn decode_block(&self, table: &TypeTable) -> Result<Option<AbiValue>, CodecError> {
        decode_blob(table, "signed_block", self.block.as_deref())
    }

    pub fn decode_traces(&self, table: &TypeTable) -> Result<Option<AbiValue>, CodecError> {
        decode_blob(table, "transaction_trace[]", self.traces.as_deref())
    }

    pub fn decode_deltas(&self, table: &TypeTable) -> Result<Option<AbiValue>, CodecError> {
        decode_blob(table, "table_delta[]", self.deltas.as_deref())
    }
}

fn decode_blob(
    table: &TypeTable,
    type_name: &str,
    blob: Option<&[u8]>,
) -> Result<Option<AbiValue>, CodecError> {
    blob.map(|bytes| table.decode(type_name, bytes)).transpose()
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipMessage {
    /// Keepalive: positions only.
    Pong {
        head: BlockPosition,
        last_irreversible: BlockPosition,
    },
    Block(Box<ReceivedBlock>),
    /// A data message without `this_block`.
    MissingThisBlock,
}

impl ShipMessage {
    /// Classify a decoded `result` value.
    pub fn parse(result: &AbiValue, abi_version: &str) -> Result<Self, ReaderError> {
        let (option, body) = result
            .as_variant()
            .ok_or_else(|| ReaderError::UnhandledMessage {
                reason: format!("expected a variant, got {}", result.kind()),
            })?;
        if option != GET_BLOCKS_RESULT {
            return Err(ReaderError::UnhandledMessageType {
                message_type: option.to_string(),
            });
        }

        let head = position(body, "head")?.ok_or_else(|| missing("head"))?;
        let last_irreversible =
            position(body, "last_irreversible")?.ok_or_else(|| missing("last_irreversible"))?;
        let this_block = position(body, "this_block")?;
        let prev_block = position(body, "prev_block")?;
        let block = blob(body, "block")?;
        let traces = blob(body, "traces")?;
        let deltas = blob(body, "deltas")?;

        let Some(this_block) = this_block else {
            let is_pong =
                prev_block.is_none() && block.is_none() && traces.is_none() && deltas.is_none();
            return Ok(if is_pong {
                Self::Pong {
                    head,
                    last_irreversible,
                }
            } else {
                Self::MissingThisBlock
            });
        };

        Ok(Self::Block(Box::new(ReceivedBlock {
            head,
            last_irreversible,
            this_block,
            prev_block,
            block,
            traces,
            deltas,
            abi_version: abi_version.to_string(),
        })))
    }
}

fn missing(field: &str) -> ReaderError {
    ReaderError::UnhandledMessage {
        reason: format!("result without {field}"),
    }
}

fn position(body: &AbiValue, field: &str) -> Result<Option<BlockPosition>, ReaderError> {
    match body.field(field) {
        None | Some(AbiValue::Null) => Ok(None),
        Some(value) => BlockPosition::from_value(value, field).map(Some),
    }
}

fn blob(body: &AbiValue, field: &str) -> Result<Option<Vec<u8>>, ReaderError> {
    match body.field(field) {
        None | Some(AbiValue::Null) => Ok(None),
        Some(value) => value
            .as_bytes()
            .map(|b| Some(b.to_vec()))
            .ok_or_else(|| ReaderError::UnhandledMessage {
                reason: format!("{field}: expected bytes, got {}", value.kind()),
            }),
    }
}
