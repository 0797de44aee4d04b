//! The ABI schema model.
//!
//! A [`Schema`] mirrors the node's `abi_def` JSON document field for field.
//! Nodes send it either as JSON text or in the binary `abi_def` encoding;
//! [`Schema::from_handshake`] accepts both.

use crate::cursor::ByteCursor;
use crate::error::CodecError;
use crate::meta::{self, ABI_DEF};
use crate::table::TypeTable;
use crate::types::TypeDescriptor;
use crate::value::AbiValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `new_type_name` is another name for `type`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    /// Empty when the struct has no base.
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub ricardian_contract: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub index_type: String,
    #[serde(default)]
    pub key_names: Vec<String>,
    #[serde(default)]
    pub key_types: Vec<String>,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClausePair {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error_code: u64,
    pub error_msg: String,
}

/// Opaque extension data; `value` is hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiExtension {
    pub tag: u16,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResultDef {
    pub name: String,
    pub result_type: String,
}

/// A complete ABI document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// Format version, e.g. `eosio::abi/1.1`. Identifies the schema revision.
    pub version: String,
    pub types: Vec<TypeDef>,
    pub structs: Vec<StructDef>,
    pub actions: Vec<ActionDef>,
    pub tables: Vec<TableDef>,
    pub ricardian_clauses: Vec<ClausePair>,
    pub error_messages: Vec<ErrorMessage>,
    pub abi_extensions: Vec<AbiExtension>,
    pub variants: Vec<VariantDef>,
    pub action_results: Vec<ActionResultDef>,
}

/// Only the version, for cheap peeking at JSON handshakes.
#[derive(Deserialize)]
struct VersionOnly {
    #[serde(default)]
    version: String,
}

fn is_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

impl Schema {
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a handshake payload, JSON text or binary `abi_def`.
    pub fn from_handshake(bytes: &[u8]) -> Result<Self, CodecError> {
        if is_json(bytes) {
            Ok(serde_json::from_slice(bytes)?)
        } else {
            Self::decode(bytes)
        }
    }

    /// Reads the version string of a handshake payload without building the
    /// whole schema.
    pub fn peek_version(bytes: &[u8]) -> Result<String, CodecError> {
        if is_json(bytes) {
            let peek: VersionOnly = serde_json::from_slice(bytes)?;
            Ok(peek.version)
        } else {
            // `version` is the first field of abi_def
            ByteCursor::from_bytes(bytes).read_string()
        }
    }

    /// Decodes a binary `abi_def` using the built-in meta-schema.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let meta = TypeTable::new(&meta::abi_def_schema())?;
        let value = meta.decode(ABI_DEF, bytes)?;
        Ok(serde_json::from_value(value.to_json())?)
    }

    /// Encodes this schema as a binary `abi_def`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let meta = TypeTable::new(&meta::abi_def_schema())?;
        let value = AbiValue::from_json(&serde_json::to_value(self)?);
        meta.encode(ABI_DEF, &value)
    }

    /// Every type the schema defines, keyed by name, in declaration order.
    ///
    /// Fails if a name is defined twice.
    pub fn descriptors(&self) -> Result<IndexMap<String, TypeDescriptor>, CodecError> {
        let mut out = IndexMap::new();
        let mut define = |name: &str, descriptor: TypeDescriptor| {
            if name.is_empty() {
                return Err(CodecError::invalid_schema("type with an empty name"));
            }
            if out.insert(name.to_string(), descriptor).is_some() {
                return Err(CodecError::invalid_schema(format!(
                    "type '{name}' is defined more than once"
                )));
            }
            Ok(())
        };

        for t in &self.types {
            define(&t.new_type_name, TypeDescriptor::Alias(t.type_name.clone()))?;
        }
        for s in &self.structs {
            define(
                &s.name,
                TypeDescriptor::Struct {
                    base: (!s.base.is_empty()).then(|| s.base.clone()),
                    fields: s
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), f.type_name.clone()))
                        .collect(),
                },
            )?;
        }
        for v in &self.variants {
            define(&v.name, TypeDescriptor::Variant(v.types.clone()))?;
        }
        Ok(out)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}
