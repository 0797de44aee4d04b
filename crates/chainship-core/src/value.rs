//! Dynamically-typed values produced and consumed by the codec.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as Json};
use std::fmt;

/// A decoded ABI value.
///
/// Struct fields keep their declaration order. Integer widths collapse to
/// 128-bit so every ABI integer fits without loss.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AbiValue {
    Bool(bool),
    Uint(u128),
    Int(i128),
    Float(f64),
    /// A packed name in its dotted string form.
    Name(String),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<AbiValue>),
    Struct(IndexMap<String, AbiValue>),
    /// A variant value tagged with the chosen option's type name.
    Variant { name: String, value: Box<AbiValue> },
    /// An absent optional.
    #[default]
    Null,
}

impl AbiValue {
    /// Builds a struct value from `(field, value)` pairs.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, AbiValue)>) -> Self {
        AbiValue::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn variant(name: impl Into<String>, value: AbiValue) -> Self {
        AbiValue::Variant {
            name: name.into(),
            value: Box::new(value),
        }
    }

    /// Short description of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AbiValue::Bool(_) => "bool",
            AbiValue::Uint(_) => "uint",
            AbiValue::Int(_) => "int",
            AbiValue::Float(_) => "float",
            AbiValue::Name(_) => "name",
            AbiValue::Bytes(_) => "bytes",
            AbiValue::Str(_) => "string",
            AbiValue::Array(_) => "array",
            AbiValue::Struct(_) => "struct",
            AbiValue::Variant { .. } => "variant",
            AbiValue::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AbiValue::Null)
    }

    /// Looks up a struct field. Returns `None` for non-structs.
    pub fn field(&self, name: &str) -> Option<&AbiValue> {
        match self {
            AbiValue::Struct(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Text content of names and strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AbiValue::Name(s) | AbiValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AbiValue::Uint(v) => u64::try_from(*v).ok(),
            AbiValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AbiValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AbiValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The `(option, value)` pair of a variant.
    pub fn as_variant(&self) -> Option<(&str, &AbiValue)> {
        match self {
            AbiValue::Variant { name, value } => Some((name, value)),
            _ => None,
        }
    }

    /// Converts JSON into the closest value shape.
    ///
    /// Objects become structs, arrays become arrays, numbers pick the
    /// narrowest of uint/int/float. Names, byte strings and variants are left
    /// as strings and arrays; the encoder interprets them against the
    /// target type.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => AbiValue::Null,
            Json::Bool(b) => AbiValue::Bool(*b),
            Json::Number(n) => {
                if let Some(u) = n.as_u64() {
                    AbiValue::Uint(u.into())
                } else if let Some(i) = n.as_i64() {
                    AbiValue::Int(i.into())
                } else {
                    AbiValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => AbiValue::Str(s.clone()),
            Json::Array(items) => AbiValue::Array(items.iter().map(Self::from_json).collect()),
            Json::Object(map) => AbiValue::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to JSON in the node's conventional rendering: byte types as
    /// hex strings, variants as `[option, value]`, integers wider than 64
    /// bits as decimal strings.
    pub fn to_json(&self) -> Json {
        match self {
            AbiValue::Bool(b) => Json::Bool(*b),
            AbiValue::Uint(v) => match u64::try_from(*v) {
                Ok(small) => json!(small),
                Err(_) => Json::String(v.to_string()),
            },
            AbiValue::Int(v) => match i64::try_from(*v) {
                Ok(small) => json!(small),
                Err(_) => Json::String(v.to_string()),
            },
            AbiValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            AbiValue::Name(s) | AbiValue::Str(s) => Json::String(s.clone()),
            AbiValue::Bytes(b) => Json::String(hex::encode(b)),
            AbiValue::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            AbiValue::Struct(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            AbiValue::Variant { name, value } => json!([name, value.to_json()]),
            AbiValue::Null => Json::Null,
        }
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiValue::Bool(b) => write!(f, "{b}"),
            AbiValue::Uint(v) => write!(f, "{v}"),
            AbiValue::Int(v) => write!(f, "{v}"),
            AbiValue::Float(v) => write!(f, "{v}"),
            AbiValue::Name(s) => write!(f, "{s}"),
            AbiValue::Str(s) => write!(f, "{s:?}"),
            AbiValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            AbiValue::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for AbiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AbiValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Json::deserialize(deserializer).map(|j| AbiValue::from_json(&j))
    }
}

impl From<Json> for AbiValue {
    fn from(json: Json) -> Self {
        AbiValue::from_json(&json)
    }
}

impl From<&str> for AbiValue {
    fn from(s: &str) -> Self {
        AbiValue::Str(s.to_string())
    }
}

impl From<u32> for AbiValue {
    fn from(v: u32) -> Self {
        AbiValue::Uint(v.into())
    }
}

impl From<u64> for AbiValue {
    fn from(v: u64) -> Self {
        AbiValue::Uint(v.into())
    }
}

impl From<bool> for AbiValue {
    fn from(b: bool) -> Self {
        AbiValue::Bool(b)
    }
}
