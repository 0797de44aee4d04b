//! Schema fixture integration tests.
//!
//! Loads the state-history protocol schema and a token contract schema from
//! `fixtures/`, resolves them and checks known byte layouts.

use chainship_core::{AbiValue, ByteCursor, CodecError, Name, Schema, TypeTable};
use serde_json::json;

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// The fixtures live two levels above the crate root.
fn fixture_path(rel: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("../../fixtures");
    p.push(rel);
    p
}

fn load_schema(rel: &str) -> Schema {
    let text = std::fs::read_to_string(fixture_path(rel)).expect("fixture not found");
    Schema::from_json(&text).expect("fixture schema parses")
}

fn ship_table() -> TypeTable {
    TypeTable::new(&load_schema("ship/ship_abi.json")).expect("ship schema resolves")
}

fn block_position(num: u32, fill: u8) -> serde_json::Value {
    json!({ "block_num": num, "block_id": hex::encode([fill; 32]) })
}

// ─── State-history protocol ───────────────────────────────────────────────────

#[test]
fn get_blocks_request_layout() {
    let table = ship_table();
    let request = AbiValue::from_json(&json!([
        "get_blocks_request_v0",
        {
            "start_block_num": 100,
            "end_block_num": 103,
            "max_messages_in_flight": 1,
            "have_positions": [],
            "irreversible_only": false,
            "fetch_block": true,
            "fetch_traces": true,
            "fetch_deltas": false
        }
    ]));
    let bytes = table.encode("request", &request).unwrap();

    let mut expected = vec![1u8];
    expected.extend_from_slice(&100u32.to_le_bytes());
    expected.extend_from_slice(&103u32.to_le_bytes());
    expected.extend_from_slice(&1u32.to_le_bytes());
    expected.extend_from_slice(&[0, 0, 1, 1, 0]);
    assert_eq!(bytes, expected);

    let decoded = table.decode("request", &bytes).unwrap();
    let (option, body) = decoded.as_variant().unwrap();
    assert_eq!(option, "get_blocks_request_v0");
    assert_eq!(body.field("end_block_num").and_then(AbiValue::as_u32), Some(103));
    assert_eq!(body.field("fetch_deltas").and_then(AbiValue::as_bool), Some(false));
}

#[test]
fn ack_request_layout() {
    let table = ship_table();
    let ack = AbiValue::from_json(&json!(["get_blocks_ack_request_v0", { "num_messages": 1 }]));
    assert_eq!(table.encode("request", &ack).unwrap(), vec![2, 1, 0, 0, 0]);
}

#[test]
fn pong_result_has_only_positions() {
    let table = ship_table();
    let pong = AbiValue::from_json(&json!([
        "get_blocks_result_v0",
        {
            "head": block_position(500, 0xaa),
            "last_irreversible": block_position(480, 0xbb),
            "this_block": null,
            "prev_block": null,
            "block": null,
            "traces": null,
            "deltas": null
        }
    ]));
    let bytes = table.encode("result", &pong).unwrap();
    // tag + two positions + five absent optionals
    assert_eq!(bytes.len(), 1 + 36 * 2 + 5);

    let decoded = table.decode("result", &bytes).unwrap();
    let (_, body) = decoded.as_variant().unwrap();
    assert!(body.field("this_block").unwrap().is_null());
    assert_eq!(
        body.field("head")
            .and_then(|h| h.field("block_id"))
            .and_then(AbiValue::as_bytes),
        Some(&[0xaa; 32][..])
    );
}

#[test]
fn status_result_without_chain_id_extension() {
    let table = ship_table();
    let mut c = ByteCursor::new();
    c.write_varuint32(0);
    for num in [10u32, 9] {
        c.write_u32(num);
        c.write_raw(&[0u8; 32]);
    }
    for bound in [1u32, 10, 1, 10] {
        c.write_u32(bound);
    }
    let decoded = table.decode("result", c.as_bytes()).unwrap();
    let (option, body) = decoded.as_variant().unwrap();
    assert_eq!(option, "get_status_result_v0");
    assert!(body.field("chain_id").is_none());
    assert_eq!(body.field("trace_end_block").and_then(AbiValue::as_u32), Some(10));
}

#[test]
fn signed_block_with_inherited_header() {
    let table = ship_table();
    let block = AbiValue::from_json(&json!({
        "timestamp": 1_000,
        "producer": "eosio",
        "confirmed": 0,
        "previous": hex::encode([1u8; 32]),
        "transaction_mroot": hex::encode([2u8; 32]),
        "action_mroot": hex::encode([3u8; 32]),
        "schedule_version": 2,
        "new_producers": null,
        "header_extensions": [],
        "producer_signature": format!("00{}", hex::encode([4u8; 65])),
        "transactions": [
            {
                "status": 0,
                "cpu_usage_us": 150,
                "net_usage_words": 12,
                "trx": ["transaction_id", hex::encode([5u8; 32])]
            }
        ],
        "block_extensions": []
    }));
    let bytes = table.encode("signed_block", &block).unwrap();
    // timestamp comes first: the header's fields lead the derived struct
    assert_eq!(&bytes[..4], &1_000u32.to_le_bytes());

    let decoded = table.decode("signed_block", &bytes).unwrap();
    assert_eq!(decoded.field("producer").and_then(AbiValue::as_str), Some("eosio"));
    let txs = decoded.field("transactions").and_then(AbiValue::as_array).unwrap();
    assert_eq!(txs.len(), 1);
    let (kind, id) = txs[0].field("trx").and_then(AbiValue::as_variant).unwrap();
    assert_eq!(kind, "transaction_id");
    assert_eq!(id.as_bytes(), Some(&[5u8; 32][..]));
}

#[test]
fn table_deltas_decode_as_derived_array() {
    let table = ship_table();
    let deltas = AbiValue::from_json(&json!([
        ["table_delta_v0", { "name": "account", "rows": [{ "present": true, "data": "0102" }] }],
        ["table_delta_v0", { "name": "contract_row", "rows": [] }]
    ]));
    let bytes = table.encode("table_delta[]", &deltas).unwrap();
    let decoded = table.decode("table_delta[]", &bytes).unwrap();
    let items = decoded.as_array().unwrap();
    assert_eq!(items.len(), 2);
    let (_, first) = items[0].as_variant().unwrap();
    assert_eq!(first.field("name").and_then(AbiValue::as_str), Some("account"));
}

#[test]
fn truncated_result_is_a_data_error() {
    let table = ship_table();
    let err = table.decode("result", &[1, 0, 0]).unwrap_err();
    assert!(err.is_data_error());
    assert!(err.is_recoverable());
}

#[test]
fn ship_schema_survives_binary_encoding() {
    let schema = load_schema("ship/ship_abi.json");
    let bytes = schema.encode().unwrap();
    let back = Schema::from_handshake(&bytes).unwrap();
    assert_eq!(back, schema);
    assert_eq!(Schema::peek_version(&bytes).unwrap(), "eosio::abi/1.1");
}

// ─── Contract schema ──────────────────────────────────────────────────────────

#[test]
fn token_transfer_action() {
    let table = TypeTable::new(&load_schema("contract/token_abi.json")).unwrap();
    let transfer = AbiValue::from_json(&json!({
        "from": "alice",
        "to": "bob",
        "quantity": { "amount": 10_000, "symbol": 1_397_703_940u64 },
        "memo": "hi"
    }));
    let bytes = table.encode_action("transfer", &transfer).unwrap();
    assert_eq!(bytes.len(), 8 + 8 + 16 + 3);

    let decoded = table.decode_action("transfer", &bytes).unwrap();
    assert_eq!(decoded.field("to").and_then(AbiValue::as_str), Some("bob"));
    assert_eq!(
        decoded
            .field("quantity")
            .and_then(|q| q.field("amount"))
            .and_then(AbiValue::as_u64),
        Some(10_000)
    );
}

#[test]
fn token_table_rows() {
    let table = TypeTable::new(&load_schema("contract/token_abi.json")).unwrap();
    let mut c = ByteCursor::new();
    c.write_i64(-5);
    c.write_u64(4);
    let row = table.decode_table_row("accounts", c.as_bytes()).unwrap();
    assert_eq!(
        row.field("balance").and_then(|b| b.field("amount")),
        Some(&AbiValue::Int(-5))
    );
    assert!(matches!(
        table.decode_table_row("unknown", c.as_bytes()),
        Err(CodecError::TypeNotFound { .. })
    ));
}

fn token_table() -> TypeTable {
    TypeTable::new(&load_schema("contract/token_abi.json")).unwrap()
}

fn name(text: &str) -> Name {
    text.parse().unwrap()
}

#[test]
fn packed_transaction_actions() {
    let table = token_table();
    let transfer = table
        .encode_action(
            "transfer",
            &AbiValue::from_json(&json!({
                "from": "alice",
                "to": "bob",
                "quantity": { "amount": 25, "symbol": 1_397_703_940u64 },
                "memo": "rent"
            })),
        )
        .unwrap();

    let mut c = ByteCursor::new();
    c.write_u8(0);
    c.write_varuint32(2);
    // eosio.token::transfer, signed by alice@active
    c.write_name(name("eosio.token"));
    c.write_name(name("transfer"));
    c.write_varuint32(1);
    c.write_name(name("alice"));
    c.write_name(name("active"));
    c.write_bytes(&transfer);
    // an action the token schema does not declare
    c.write_name(name("eosio"));
    c.write_name(name("onblock"));
    c.write_varuint32(0);
    c.write_bytes(&[1, 2, 3]);

    let tx = table.decode_transaction_actions(c.as_bytes()).unwrap();
    assert_eq!(tx.field("version").and_then(AbiValue::as_u64), Some(0));
    let actions = tx.field("actions").and_then(AbiValue::as_array).unwrap();
    assert_eq!(actions.len(), 2);

    let first = &actions[0];
    assert_eq!(first.field("account").and_then(AbiValue::as_str), Some("eosio.token"));
    assert_eq!(first.field("name").and_then(AbiValue::as_str), Some("transfer"));
    let auth = first.field("authorization").and_then(AbiValue::as_array).unwrap();
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0].field("actor").and_then(AbiValue::as_str), Some("alice"));
    assert_eq!(auth[0].field("permission").and_then(AbiValue::as_str), Some("active"));
    let data = first.field("data").unwrap();
    assert_eq!(data.field("memo").and_then(AbiValue::as_str), Some("rent"));
    assert_eq!(
        data.field("quantity").and_then(|q| q.field("amount")),
        Some(&AbiValue::Int(25))
    );

    let second = &actions[1];
    assert_eq!(second.field("name").and_then(AbiValue::as_str), Some("onblock"));
    assert_eq!(
        second.field("authorization").and_then(AbiValue::as_array),
        Some(&[][..])
    );
    assert_eq!(second.field("data"), Some(&AbiValue::Bytes(vec![1, 2, 3])));
}

#[test]
fn packed_transaction_with_bad_action_data_fails() {
    let table = token_table();
    let mut c = ByteCursor::new();
    c.write_u8(0);
    c.write_varuint32(1);
    c.write_name(name("eosio.token"));
    c.write_name(name("transfer"));
    c.write_varuint32(0);
    c.write_bytes(&[0; 4]);
    assert!(matches!(
        table.decode_transaction_actions(c.as_bytes()),
        Err(CodecError::BufferUnderrun { .. })
    ));
    // declared count larger than the payload
    assert!(table.decode_transaction_actions(&[0, 5]).is_err());
}

#[test]
fn contract_row_envelope() {
    let table = token_table();
    let mut row = ByteCursor::new();
    row.write_i64(1_000_000);
    row.write_u64(1_397_703_940);

    let mut c = ByteCursor::new();
    c.write_u8(0);
    c.write_name(name("eosio.token"));
    c.write_name(name("alice"));
    c.write_name(name("accounts"));
    c.write_u64(5_459_781);
    c.write_name(name("alice"));
    c.write_bytes(row.as_bytes());

    let decoded = table.decode_contract_row(c.as_bytes()).unwrap();
    assert_eq!(decoded.field("code").and_then(AbiValue::as_str), Some("eosio.token"));
    assert_eq!(decoded.field("scope").and_then(AbiValue::as_str), Some("alice"));
    assert_eq!(decoded.field("table").and_then(AbiValue::as_str), Some("accounts"));
    assert_eq!(decoded.field("primary_key").and_then(AbiValue::as_u64), Some(5_459_781));
    assert_eq!(decoded.field("payer").and_then(AbiValue::as_str), Some("alice"));
    let balance = decoded.field("value").and_then(|v| v.field("balance")).unwrap();
    assert_eq!(balance.field("amount"), Some(&AbiValue::Int(1_000_000)));
    assert_eq!(balance.field("symbol").and_then(AbiValue::as_u64), Some(1_397_703_940));
}

#[test]
fn contract_row_of_undeclared_table_stays_raw() {
    let table = token_table();
    let mut c = ByteCursor::new();
    c.write_u8(0);
    c.write_name(name("eosio"));
    c.write_name(name("eosio"));
    c.write_name(name("global"));
    c.write_u64(0);
    c.write_name(name("eosio"));
    c.write_bytes(&[0xde, 0xad]);

    let decoded = table.decode_contract_row(c.as_bytes()).unwrap();
    assert_eq!(decoded.field("table").and_then(AbiValue::as_str), Some("global"));
    assert_eq!(decoded.field("value"), Some(&AbiValue::Bytes(vec![0xde, 0xad])));
    assert!(matches!(
        table.decode_contract_row(&c.as_bytes()[..20]),
        Err(CodecError::BufferUnderrun { .. })
    ));
}

#[test]
fn bad_account_name_is_rejected_on_encode() {
    let table = TypeTable::new(&load_schema("contract/token_abi.json")).unwrap();
    let transfer = AbiValue::from_json(&json!({
        "from": "Alice",
        "to": "bob",
        "quantity": { "amount": 1, "symbol": 4 },
        "memo": ""
    }));
    assert!(matches!(
        table.encode_action("transfer", &transfer),
        Err(CodecError::InvalidName { .. })
    ));
}
