//! The built-in `abi_def` meta-schema.
//!
//! Binary schemas are themselves encoded as an `abi_def` value, so decoding
//! one needs a schema that cannot come from the wire. This module writes that
//! schema out by hand.

use crate::schema::{FieldDef, Schema, StructDef};

/// Name of the root type of the meta-schema.
pub const ABI_DEF: &str = "abi_def";

/// Version string carried by the meta-schema itself.
pub const META_VERSION: &str = "eosio::abi/1.2";

fn def(name: &str, fields: &[(&str, &str)]) -> StructDef {
    StructDef {
        name: name.to_string(),
        base: String::new(),
        fields: fields
            .iter()
            .map(|(name, ty)| FieldDef {
                name: name.to_string(),
                type_name: ty.to_string(),
            })
            .collect(),
    }
}

/// Builds the schema describing the binary layout of `abi_def`.
pub fn abi_def_schema() -> Schema {
    Schema {
        version: META_VERSION.to_string(),
        structs: vec![
            def("type_def", &[("new_type_name", "string"), ("type", "string")]),
            def("field_def", &[("name", "string"), ("type", "string")]),
            def(
                "struct_def",
                &[("name", "string"), ("base", "string"), ("fields", "field_def[]")],
            ),
            def(
                "action_def",
                &[
                    ("name", "name"),
                    ("type", "string"),
                    ("ricardian_contract", "string"),
                ],
            ),
            def(
                "table_def",
                &[
                    ("name", "name"),
                    ("index_type", "string"),
                    ("key_names", "string[]"),
                    ("key_types", "string[]"),
                    ("type", "string"),
                ],
            ),
            def("clause_pair", &[("id", "string"), ("body", "string")]),
            def(
                "error_message",
                &[("error_code", "uint64"), ("error_msg", "string")],
            ),
            def("extensions_entry", &[("tag", "uint16"), ("value", "bytes")]),
            def("variant_def", &[("name", "string"), ("types", "string[]")]),
            def("action_result", &[("name", "name"), ("result_type", "string")]),
            def(
                ABI_DEF,
                &[
                    ("version", "string"),
                    ("types", "type_def[]"),
                    ("structs", "struct_def[]"),
                    ("actions", "action_def[]"),
                    ("tables", "table_def[]"),
                    ("ricardian_clauses", "clause_pair[]"),
                    ("error_messages", "error_message[]"),
                    ("abi_extensions", "extensions_entry[]"),
                    ("variants", "variant_def[]$"),
                    ("action_results", "action_result[]$"),
                ],
            ),
        ],
        ..Schema::default()
    }
}
