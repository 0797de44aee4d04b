//! Type descriptors for the ABI type system.
//!
//! A schema names types; each name resolves to exactly one
//! [`TypeDescriptor`]. Built-in primitives are fixed by the ABI dialect and
//! are described by [`Primitive`].

use crate::cursor::ByteCursor;
use crate::error::CodecError;
use crate::value::AbiValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Int128,
    Uint128,
    /// Zig-zag encoded signed varint.
    Varint32,
    Varuint32,
    Varuint64,
    Float32,
    Float64,
    /// Raw 16 bytes, kept opaque.
    Float128,
    Name,
    Bytes,
    String,
    /// Microseconds since epoch, u64.
    TimePoint,
    /// Seconds since epoch, u32.
    TimePointSec,
    /// Half-second slots since 2000-01-01, u32.
    BlockTimestampType,
    Symbol,
    SymbolCode,
    Checksum160,
    Checksum256,
    Checksum512,
    PublicKey,
    Signature,
}

impl Primitive {
    pub const ALL: [Primitive; 30] = [
        Primitive::Bool,
        Primitive::Int8,
        Primitive::Uint8,
        Primitive::Int16,
        Primitive::Uint16,
        Primitive::Int32,
        Primitive::Uint32,
        Primitive::Int64,
        Primitive::Uint64,
        Primitive::Int128,
        Primitive::Uint128,
        Primitive::Varint32,
        Primitive::Varuint32,
        Primitive::Varuint64,
        Primitive::Float32,
        Primitive::Float64,
        Primitive::Float128,
        Primitive::Name,
        Primitive::Bytes,
        Primitive::String,
        Primitive::TimePoint,
        Primitive::TimePointSec,
        Primitive::BlockTimestampType,
        Primitive::Symbol,
        Primitive::SymbolCode,
        Primitive::Checksum160,
        Primitive::Checksum256,
        Primitive::Checksum512,
        Primitive::PublicKey,
        Primitive::Signature,
    ];

    /// Looks up a primitive by its ABI type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int8 => "int8",
            Primitive::Uint8 => "uint8",
            Primitive::Int16 => "int16",
            Primitive::Uint16 => "uint16",
            Primitive::Int32 => "int32",
            Primitive::Uint32 => "uint32",
            Primitive::Int64 => "int64",
            Primitive::Uint64 => "uint64",
            Primitive::Int128 => "int128",
            Primitive::Uint128 => "uint128",
            Primitive::Varint32 => "varint32",
            Primitive::Varuint32 => "varuint32",
            Primitive::Varuint64 => "varuint64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Float128 => "float128",
            Primitive::Name => "name",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
            Primitive::TimePoint => "time_point",
            Primitive::TimePointSec => "time_point_sec",
            Primitive::BlockTimestampType => "block_timestamp_type",
            Primitive::Symbol => "symbol",
            Primitive::SymbolCode => "symbol_code",
            Primitive::Checksum160 => "checksum160",
            Primitive::Checksum256 => "checksum256",
            Primitive::Checksum512 => "checksum512",
            Primitive::PublicKey => "public_key",
            Primitive::Signature => "signature",
        }
    }

    /// Byte width of fixed-size raw primitives.
    fn raw_width(self) -> Option<usize> {
        match self {
            Primitive::Float128 => Some(16),
            Primitive::Checksum160 => Some(20),
            Primitive::Checksum256 => Some(32),
            Primitive::Checksum512 => Some(64),
            _ => None,
        }
    }

    /// Decodes one value of this primitive from `cursor`.
    pub fn decode(self, cursor: &mut ByteCursor) -> Result<AbiValue, CodecError> {
        Ok(match self {
            Primitive::Bool => AbiValue::Bool(cursor.read_bool()?),
            Primitive::Int8 => AbiValue::Int(cursor.read_i8()?.into()),
            Primitive::Uint8 => AbiValue::Uint(cursor.read_u8()?.into()),
            Primitive::Int16 => AbiValue::Int(cursor.read_i16()?.into()),
            Primitive::Uint16 => AbiValue::Uint(cursor.read_u16()?.into()),
            Primitive::Int32 => AbiValue::Int(cursor.read_i32()?.into()),
            Primitive::Uint32 | Primitive::TimePointSec | Primitive::BlockTimestampType => {
                AbiValue::Uint(cursor.read_u32()?.into())
            }
            Primitive::Int64 => AbiValue::Int(cursor.read_i64()?.into()),
            Primitive::Uint64 | Primitive::TimePoint | Primitive::Symbol | Primitive::SymbolCode => {
                AbiValue::Uint(cursor.read_u64()?.into())
            }
            Primitive::Int128 => AbiValue::Int(cursor.read_i128()?),
            Primitive::Uint128 => AbiValue::Uint(cursor.read_u128()?),
            Primitive::Varint32 => AbiValue::Int(cursor.read_varint32()?.into()),
            Primitive::Varuint32 => AbiValue::Uint(cursor.read_varuint32()?.into()),
            Primitive::Varuint64 => AbiValue::Uint(cursor.read_varuint64()?.into()),
            Primitive::Float32 => AbiValue::Float(cursor.read_f32()?.into()),
            Primitive::Float64 => AbiValue::Float(cursor.read_f64()?),
            Primitive::Name => AbiValue::Name(cursor.read_name()?.to_string()),
            Primitive::Bytes => AbiValue::Bytes(cursor.read_bytes()?),
            Primitive::String => AbiValue::Str(cursor.read_string()?),
            Primitive::Float128
            | Primitive::Checksum160
            | Primitive::Checksum256
            | Primitive::Checksum512 => {
                let width = self.raw_width().unwrap_or_default();
                AbiValue::Bytes(cursor.read_raw(width)?)
            }
            Primitive::PublicKey => AbiValue::Bytes(read_key_material(cursor, 33, false)?),
            Primitive::Signature => AbiValue::Bytes(read_key_material(cursor, 65, true)?),
        })
    }

    /// Encodes `value` as this primitive into `cursor`.
    pub fn encode(self, value: &AbiValue, cursor: &mut ByteCursor) -> Result<(), CodecError> {
        match self {
            Primitive::Bool => cursor.write_bool(expect_bool(value)?),
            Primitive::Int8 => cursor.write_i8(signed(value, self)?),
            Primitive::Uint8 => cursor.write_u8(unsigned(value, self)?),
            Primitive::Int16 => cursor.write_i16(signed(value, self)?),
            Primitive::Uint16 => cursor.write_u16(unsigned(value, self)?),
            Primitive::Int32 => cursor.write_i32(signed(value, self)?),
            Primitive::Uint32 | Primitive::TimePointSec | Primitive::BlockTimestampType => {
                cursor.write_u32(unsigned(value, self)?)
            }
            Primitive::Int64 => cursor.write_i64(signed(value, self)?),
            Primitive::Uint64 | Primitive::TimePoint | Primitive::Symbol | Primitive::SymbolCode => {
                cursor.write_u64(unsigned(value, self)?)
            }
            Primitive::Int128 => cursor.write_i128(signed(value, self)?),
            Primitive::Uint128 => cursor.write_u128(unsigned(value, self)?),
            Primitive::Varint32 => cursor.write_varint32(signed(value, self)?),
            Primitive::Varuint32 => cursor.write_varuint32(unsigned(value, self)?),
            Primitive::Varuint64 => cursor.write_varuint64(unsigned(value, self)?),
            Primitive::Float32 => cursor.write_f32(expect_float(value, self)? as f32),
            Primitive::Float64 => cursor.write_f64(expect_float(value, self)?),
            Primitive::Name => {
                let text = value.as_str().ok_or_else(|| mismatch(self, value))?;
                cursor.write_name(text.parse()?);
            }
            Primitive::Bytes => cursor.write_bytes(&expect_bytes(value, self)?),
            Primitive::String => {
                let text = value.as_str().ok_or_else(|| mismatch(self, value))?;
                cursor.write_string(text);
            }
            Primitive::Float128
            | Primitive::Checksum160
            | Primitive::Checksum256
            | Primitive::Checksum512 => {
                let bytes = expect_bytes(value, self)?;
                let width = self.raw_width().unwrap_or_default();
                if bytes.len() != width {
                    return Err(CodecError::TypeMismatch {
                        expected: format!("{} ({width} bytes)", self.name()),
                        got: format!("{} bytes", bytes.len()),
                    });
                }
                cursor.write_raw(&bytes);
            }
            // Key material is stored verbatim as decoded, type byte included.
            Primitive::PublicKey | Primitive::Signature => {
                cursor.write_raw(&expect_bytes(value, self)?)
            }
        }
        Ok(())
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key type 2 (WebAuthn) carries trailing variable-length data.
const KEY_TYPE_WEBAUTHN: u8 = 2;

fn read_key_material(
    cursor: &mut ByteCursor,
    width: usize,
    signature: bool,
) -> Result<Vec<u8>, CodecError> {
    let start = cursor.position();
    let kind = cursor.read_u8()?;
    cursor.read_raw(width)?;
    if kind == KEY_TYPE_WEBAUTHN {
        if signature {
            cursor.read_bytes()?; // auth_data
            cursor.read_string()?; // client_json
        } else {
            cursor.read_u8()?; // user presence
            cursor.read_string()?; // rpid
        }
    } else if kind > KEY_TYPE_WEBAUTHN {
        return Err(CodecError::malformed(format!("unknown key type {kind}")));
    }
    Ok(cursor.as_bytes()[start..cursor.position()].to_vec())
}

fn mismatch(primitive: Primitive, value: &AbiValue) -> CodecError {
    CodecError::TypeMismatch {
        expected: primitive.name().to_string(),
        got: value.kind().to_string(),
    }
}

fn expect_bool(value: &AbiValue) -> Result<bool, CodecError> {
    match value {
        AbiValue::Bool(b) => Ok(*b),
        AbiValue::Uint(0) => Ok(false),
        AbiValue::Uint(1) => Ok(true),
        other => Err(mismatch(Primitive::Bool, other)),
    }
}

fn unsigned<T: TryFrom<u128>>(value: &AbiValue, primitive: Primitive) -> Result<T, CodecError> {
    let wide: u128 = match value {
        AbiValue::Uint(v) => *v,
        AbiValue::Int(v) if *v >= 0 => *v as u128,
        AbiValue::Str(s) => s.parse().map_err(|_| mismatch(primitive, value))?,
        _ => return Err(mismatch(primitive, value)),
    };
    T::try_from(wide).map_err(|_| CodecError::TypeMismatch {
        expected: primitive.name().to_string(),
        got: format!("out-of-range value {wide}"),
    })
}

fn signed<T: TryFrom<i128>>(value: &AbiValue, primitive: Primitive) -> Result<T, CodecError> {
    let wide: i128 = match value {
        AbiValue::Int(v) => *v,
        AbiValue::Uint(v) => i128::try_from(*v).map_err(|_| mismatch(primitive, value))?,
        AbiValue::Str(s) => s.parse().map_err(|_| mismatch(primitive, value))?,
        _ => return Err(mismatch(primitive, value)),
    };
    T::try_from(wide).map_err(|_| CodecError::TypeMismatch {
        expected: primitive.name().to_string(),
        got: format!("out-of-range value {wide}"),
    })
}

fn expect_float(value: &AbiValue, primitive: Primitive) -> Result<f64, CodecError> {
    match value {
        AbiValue::Float(f) => Ok(*f),
        AbiValue::Uint(v) => Ok(*v as f64),
        AbiValue::Int(v) => Ok(*v as f64),
        AbiValue::Str(s) => s.parse().map_err(|_| mismatch(primitive, value)),
        _ => Err(mismatch(primitive, value)),
    }
}

/// Byte-typed values are accepted either raw or as hex text.
fn expect_bytes(value: &AbiValue, primitive: Primitive) -> Result<Vec<u8>, CodecError> {
    match value {
        AbiValue::Bytes(b) => Ok(b.clone()),
        AbiValue::Str(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            hex::decode(digits).map_err(|e| CodecError::TypeMismatch {
                expected: format!("{} as hex", primitive.name()),
                got: e.to_string(),
            })
        }
        _ => Err(mismatch(primitive, value)),
    }
}

/// How a type name is defined within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDescriptor {
    Primitive(Primitive),
    /// Another name for `target`.
    Alias(String),
    /// Fields in declaration order; base struct fields come first on the wire.
    Struct {
        base: Option<String>,
        fields: Vec<(String, String)>,
    },
    /// Varuint32 length, then that many elements.
    Array(String),
    /// One presence byte, then the value if present.
    Optional(String),
    /// Varuint32 option index, then the option's value.
    Variant(Vec<String>),
    /// Present only while bytes remain in the enclosing buffer.
    Extension(String),
}

impl TypeDescriptor {
    /// Parses a derived type name (`T[]`, `T?`, `T$`) into its descriptor.
    /// Returns `None` for plain names.
    pub fn from_suffix(name: &str) -> Option<Self> {
        if let Some(inner) = name.strip_suffix("[]") {
            Some(Self::Array(inner.to_string()))
        } else if let Some(inner) = name.strip_suffix('?') {
            Some(Self::Optional(inner.to_string()))
        } else {
            name.strip_suffix('$')
                .map(|inner| Self::Extension(inner.to_string()))
        }
    }

    /// Every type name this descriptor refers to.
    pub fn references(&self) -> Vec<&str> {
        match self {
            TypeDescriptor::Primitive(_) => vec![],
            TypeDescriptor::Alias(t)
            | TypeDescriptor::Array(t)
            | TypeDescriptor::Optional(t)
            | TypeDescriptor::Extension(t) => vec![t.as_str()],
            TypeDescriptor::Struct { base, fields } => base
                .iter()
                .map(String::as_str)
                .chain(fields.iter().map(|(_, t)| t.as_str()))
                .collect(),
            TypeDescriptor::Variant(options) => options.iter().map(String::as_str).collect(),
        }
    }
}
