//! `TypeTable`: a schema resolved into concrete codecs.
//!
//! Every type a schema defines or references is resolved once, at
//! construction, into an arena of [`Codec`] nodes addressed by index.
//! Aliases collapse onto their target's node, struct bases are flattened into
//! the derived struct's field list, and self-referencing types work because a
//! node's slot is reserved before its children are resolved.
//!
//! Derived names that no schema type mentions (`transaction_trace[]` passed
//! straight to [`TypeTable::decode`], say) are parsed on lookup.

use crate::cursor::ByteCursor;
use crate::error::CodecError;
use crate::schema::Schema;
use crate::types::{Primitive, TypeDescriptor};
use crate::value::AbiValue;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Nesting limit for decode; deeper input is rejected as malformed.
pub const MAX_DEPTH: usize = 128;

type TypeId = usize;

#[derive(Debug, Clone)]
enum Codec {
    Primitive(Primitive),
    Array(TypeId),
    Optional(TypeId),
    Extension(TypeId),
    Struct {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    Variant {
        name: String,
        options: Vec<(String, TypeId)>,
    },
}

/// A schema compiled into encode/decode strategies, looked up by type name.
#[derive(Debug, Clone)]
pub struct TypeTable {
    version: String,
    codecs: Vec<Codec>,
    names: HashMap<String, TypeId>,
    actions: HashMap<String, String>,
    tables: HashMap<String, String>,
}

struct Builder<'a> {
    descriptors: &'a IndexMap<String, TypeDescriptor>,
    codecs: Vec<Option<Codec>>,
    names: HashMap<String, TypeId>,
    aliases_in_progress: HashSet<String>,
}

impl Builder<'_> {
    fn descriptor_for(&self, name: &str) -> Result<TypeDescriptor, CodecError> {
        if let Some(derived) = TypeDescriptor::from_suffix(name) {
            return Ok(derived);
        }
        if let Some(d) = self.descriptors.get(name) {
            return Ok(d.clone());
        }
        Primitive::from_name(name)
            .map(TypeDescriptor::Primitive)
            .ok_or_else(|| CodecError::not_found(name))
    }

    fn resolve(&mut self, name: &str) -> Result<TypeId, CodecError> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }

        let descriptor = self.descriptor_for(name)?;
        if let TypeDescriptor::Alias(target) = descriptor {
            if !self.aliases_in_progress.insert(name.to_string()) {
                return Err(CodecError::invalid_schema(format!(
                    "alias '{name}' refers to itself"
                )));
            }
            let id = self.resolve(&target)?;
            self.aliases_in_progress.remove(name);
            self.names.insert(name.to_string(), id);
            return Ok(id);
        }

        let id = self.codecs.len();
        self.codecs.push(None);
        self.names.insert(name.to_string(), id);

        let codec = match descriptor {
            TypeDescriptor::Primitive(p) => Codec::Primitive(p),
            TypeDescriptor::Array(inner) => Codec::Array(self.resolve(&inner)?),
            TypeDescriptor::Optional(inner) => Codec::Optional(self.resolve(&inner)?),
            TypeDescriptor::Extension(inner) => Codec::Extension(self.resolve(&inner)?),
            TypeDescriptor::Struct { base, fields } => {
                let mut resolved = Vec::with_capacity(fields.len());
                if let Some(base) = base {
                    let base_id = self.resolve(&base)?;
                    match &self.codecs[base_id] {
                        Some(Codec::Struct { fields, .. }) => resolved.extend(fields.iter().cloned()),
                        Some(_) => {
                            return Err(CodecError::invalid_schema(format!(
                                "base '{base}' of '{name}' is not a struct"
                            )))
                        }
                        None => {
                            return Err(CodecError::invalid_schema(format!(
                                "struct '{name}' inherits from itself"
                            )))
                        }
                    }
                }
                for (field, ty) in fields {
                    resolved.push((field, self.resolve(&ty)?));
                }
                Codec::Struct {
                    name: name.to_string(),
                    fields: resolved,
                }
            }
            TypeDescriptor::Variant(options) => {
                let mut resolved = Vec::with_capacity(options.len());
                for option in options {
                    let id = self.resolve(&option)?;
                    resolved.push((option, id));
                }
                Codec::Variant {
                    name: name.to_string(),
                    options: resolved,
                }
            }
            TypeDescriptor::Alias(target) => {
                return Err(CodecError::invalid_schema(format!(
                    "alias '{name}' to '{target}' did not resolve"
                )))
            }
        };
        self.codecs[id] = Some(codec);
        Ok(id)
    }

    fn resolve_from(&mut self, owner: &str, name: &str) -> Result<TypeId, CodecError> {
        self.resolve(name).map_err(|e| match e {
            CodecError::TypeNotFound { name: missing } => CodecError::invalid_schema(format!(
                "type '{missing}' used by '{owner}' is not defined"
            )),
            other => other,
        })
    }
}

impl TypeTable {
    /// Resolves every type, action and table of `schema`.
    ///
    /// Fails with [`CodecError::InvalidSchema`] if any referenced type name
    /// does not resolve.
    pub fn new(schema: &Schema) -> Result<Self, CodecError> {
        let descriptors = schema.descriptors()?;
        let mut builder = Builder {
            descriptors: &descriptors,
            codecs: Vec::with_capacity(descriptors.len()),
            names: HashMap::with_capacity(descriptors.len()),
            aliases_in_progress: HashSet::new(),
        };

        for name in descriptors.keys() {
            builder.resolve_from(name, name)?;
        }

        let mut actions = HashMap::with_capacity(schema.actions.len());
        for action in &schema.actions {
            builder.resolve_from(&action.name, &action.type_name)?;
            actions.insert(action.name.clone(), action.type_name.clone());
        }
        let mut tables = HashMap::with_capacity(schema.tables.len());
        for table in &schema.tables {
            builder.resolve_from(&table.name, &table.type_name)?;
            tables.insert(table.name.clone(), table.type_name.clone());
        }

        let codecs = builder
            .codecs
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CodecError::invalid_schema("unresolved type in schema"))?;

        Ok(Self {
            version: schema.version.clone(),
            codecs,
            names: builder.names,
            actions,
            tables,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether `name` can be encoded or decoded with this table.
    pub fn contains(&self, name: &str) -> bool {
        if self.names.contains_key(name) || Primitive::from_name(name).is_some() {
            return true;
        }
        match TypeDescriptor::from_suffix(name) {
            Some(TypeDescriptor::Array(inner))
            | Some(TypeDescriptor::Optional(inner))
            | Some(TypeDescriptor::Extension(inner)) => self.contains(&inner),
            _ => false,
        }
    }

    /// Struct type of a declared action.
    pub fn action_type(&self, action: &str) -> Option<&str> {
        self.actions.get(action).map(String::as_str)
    }

    /// Row type of a declared table.
    pub fn table_type(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    // ─── Decode ──────────────────────────────────────────────────────────

    /// Decodes one `type_name` value from the start of `bytes`.
    pub fn decode(&self, type_name: &str, bytes: &[u8]) -> Result<AbiValue, CodecError> {
        self.decode_from(type_name, &mut ByteCursor::from_bytes(bytes))
    }

    /// Decodes one `type_name` value at the cursor's read offset.
    pub fn decode_from(
        &self,
        type_name: &str,
        cursor: &mut ByteCursor,
    ) -> Result<AbiValue, CodecError> {
        self.decode_named(type_name, cursor, 0)
    }

    /// Decodes an action payload using the action's declared struct.
    pub fn decode_action(&self, action: &str, data: &[u8]) -> Result<AbiValue, CodecError> {
        let ty = self
            .action_type(action)
            .ok_or_else(|| CodecError::not_found(action))?;
        self.decode(ty, data)
    }

    /// Decodes a table row using the table's declared row struct.
    pub fn decode_table_row(&self, table: &str, data: &[u8]) -> Result<AbiValue, CodecError> {
        let ty = self
            .table_type(table)
            .ok_or_else(|| CodecError::not_found(table))?;
        self.decode(ty, data)
    }

    /// Decodes the action list of a packed transaction.
    ///
    /// Layout: a version byte, then `action[]` where each action's `data`
    /// is decoded through its declared struct. Actions this table does not
    /// declare keep their raw `data` bytes.
    ///
    /// ```text
    /// { version, actions: [{ account, name, authorization: [{ actor, permission }], data }] }
    /// ```
    pub fn decode_transaction_actions(&self, bytes: &[u8]) -> Result<AbiValue, CodecError> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        let version = cursor.read_u8()?;
        let actions = decode_array(&mut cursor, |c| {
            let account = c.read_name()?;
            let name = c.read_name()?.to_string();
            let authorization = decode_array(c, |c| {
                Ok(AbiValue::object([
                    ("actor", AbiValue::Name(c.read_name()?.to_string())),
                    ("permission", AbiValue::Name(c.read_name()?.to_string())),
                ]))
            })?;
            let data = c.read_bytes()?;
            let data = match self.action_type(&name) {
                Some(ty) => self.decode(ty, &data)?,
                None => AbiValue::Bytes(data),
            };
            Ok(AbiValue::object([
                ("account", AbiValue::Name(account.to_string())),
                ("name", AbiValue::Name(name)),
                ("authorization", authorization),
                ("data", data),
            ]))
        })?;
        Ok(AbiValue::object([
            ("version", AbiValue::Uint(version.into())),
            ("actions", actions),
        ]))
    }

    /// Decodes a `contract_row` envelope and its row.
    ///
    /// Layout: version byte, `code`, `scope`, `table`, `primary_key`
    /// (uint64), `payer`, then the row bytes, decoded with the table's row
    /// struct when the table is declared and kept raw otherwise.
    pub fn decode_contract_row(&self, bytes: &[u8]) -> Result<AbiValue, CodecError> {
        let mut c = ByteCursor::from_bytes(bytes);
        c.read_u8()?;
        let code = c.read_name()?;
        let scope = c.read_name()?;
        let table = c.read_name()?.to_string();
        let primary_key = c.read_u64()?;
        let payer = c.read_name()?;
        let row = c.read_bytes()?;
        let value = match self.table_type(&table) {
            Some(ty) => self.decode(ty, &row)?,
            None => AbiValue::Bytes(row),
        };
        Ok(AbiValue::object([
            ("code", AbiValue::Name(code.to_string())),
            ("scope", AbiValue::Name(scope.to_string())),
            ("table", AbiValue::Name(table)),
            ("primary_key", AbiValue::Uint(primary_key.into())),
            ("payer", AbiValue::Name(payer.to_string())),
            ("value", value),
        ]))
    }

    fn decode_named(
        &self,
        name: &str,
        cursor: &mut ByteCursor,
        depth: usize,
    ) -> Result<AbiValue, CodecError> {
        if let Some(&id) = self.names.get(name) {
            return self.decode_id(id, cursor, depth);
        }
        if let Some(p) = Primitive::from_name(name) {
            return p.decode(cursor);
        }
        check_depth(depth)?;
        match TypeDescriptor::from_suffix(name) {
            Some(TypeDescriptor::Array(inner)) => {
                decode_array(cursor, |c| self.decode_named(&inner, c, depth + 1))
            }
            Some(TypeDescriptor::Optional(inner)) => {
                decode_optional(cursor, |c| self.decode_named(&inner, c, depth + 1))
            }
            Some(TypeDescriptor::Extension(inner)) => {
                decode_extension(cursor, |c| self.decode_named(&inner, c, depth + 1))
            }
            _ => Err(CodecError::not_found(name)),
        }
    }

    fn decode_id(
        &self,
        id: TypeId,
        cursor: &mut ByteCursor,
        depth: usize,
    ) -> Result<AbiValue, CodecError> {
        check_depth(depth)?;
        match &self.codecs[id] {
            Codec::Primitive(p) => p.decode(cursor),
            Codec::Array(inner) => decode_array(cursor, |c| self.decode_id(*inner, c, depth + 1)),
            Codec::Optional(inner) => {
                decode_optional(cursor, |c| self.decode_id(*inner, c, depth + 1))
            }
            Codec::Extension(inner) => {
                decode_extension(cursor, |c| self.decode_id(*inner, c, depth + 1))
            }
            Codec::Struct { fields, .. } => {
                let mut out = IndexMap::with_capacity(fields.len());
                for (field, ty) in fields {
                    // absent binary extensions are left out of the value
                    if matches!(self.codecs[*ty], Codec::Extension(_)) && !cursor.has_remaining() {
                        break;
                    }
                    out.insert(field.clone(), self.decode_id(*ty, cursor, depth + 1)?);
                }
                Ok(AbiValue::Struct(out))
            }
            Codec::Variant { name, options } => {
                let tag = cursor.read_varuint32()? as usize;
                let (option, ty) = options.get(tag).ok_or_else(|| {
                    CodecError::malformed(format!(
                        "variant {name} has {} options, got tag {tag}",
                        options.len()
                    ))
                })?;
                Ok(AbiValue::variant(
                    option.clone(),
                    self.decode_id(*ty, cursor, depth + 1)?,
                ))
            }
        }
    }

    // ─── Encode ──────────────────────────────────────────────────────────

    /// Encodes `value` as `type_name`.
    pub fn encode(&self, type_name: &str, value: &AbiValue) -> Result<Vec<u8>, CodecError> {
        let mut cursor = ByteCursor::new();
        self.encode_into(type_name, value, &mut cursor)?;
        Ok(cursor.into_bytes())
    }

    /// Appends `value` encoded as `type_name` to `cursor`.
    pub fn encode_into(
        &self,
        type_name: &str,
        value: &AbiValue,
        cursor: &mut ByteCursor,
    ) -> Result<(), CodecError> {
        self.encode_named(type_name, value, cursor)
    }

    /// Encodes an action payload using the action's declared struct.
    pub fn encode_action(&self, action: &str, value: &AbiValue) -> Result<Vec<u8>, CodecError> {
        let ty = self
            .action_type(action)
            .ok_or_else(|| CodecError::not_found(action))?;
        self.encode(ty, value)
    }

    fn encode_named(
        &self,
        name: &str,
        value: &AbiValue,
        cursor: &mut ByteCursor,
    ) -> Result<(), CodecError> {
        if let Some(&id) = self.names.get(name) {
            return self.encode_id(id, value, cursor);
        }
        if let Some(p) = Primitive::from_name(name) {
            return p.encode(value, cursor);
        }
        match TypeDescriptor::from_suffix(name) {
            Some(TypeDescriptor::Array(inner)) => {
                encode_array(name, value, cursor, |v, c| self.encode_named(&inner, v, c))
            }
            Some(TypeDescriptor::Optional(inner)) => {
                encode_optional(value, cursor, |v, c| self.encode_named(&inner, v, c))
            }
            Some(TypeDescriptor::Extension(inner)) => {
                encode_extension(value, cursor, |v, c| self.encode_named(&inner, v, c))
            }
            _ => Err(CodecError::not_found(name)),
        }
    }

    fn encode_id(
        &self,
        id: TypeId,
        value: &AbiValue,
        cursor: &mut ByteCursor,
    ) -> Result<(), CodecError> {
        match &self.codecs[id] {
            Codec::Primitive(p) => p.encode(value, cursor),
            Codec::Array(inner) => {
                encode_array("array", value, cursor, |v, c| self.encode_id(*inner, v, c))
            }
            Codec::Optional(inner) => {
                encode_optional(value, cursor, |v, c| self.encode_id(*inner, v, c))
            }
            Codec::Extension(inner) => {
                encode_extension(value, cursor, |v, c| self.encode_id(*inner, v, c))
            }
            Codec::Struct { name, fields } => {
                let AbiValue::Struct(map) = value else {
                    return Err(CodecError::TypeMismatch {
                        expected: name.clone(),
                        got: value.kind().to_string(),
                    });
                };
                for (field, ty) in fields {
                    let codec = &self.codecs[*ty];
                    match map.get(field) {
                        // trailing extensions stop at the first absent one
                        None | Some(AbiValue::Null) if matches!(codec, Codec::Extension(_)) => {
                            break
                        }
                        Some(v) => self.encode_id(*ty, v, cursor)?,
                        None if matches!(codec, Codec::Optional(_)) => cursor.write_u8(0),
                        None => {
                            return Err(CodecError::MissingField {
                                type_name: name.clone(),
                                field: field.clone(),
                            })
                        }
                    }
                }
                Ok(())
            }
            Codec::Variant { name, options } => {
                let (option, inner) = variant_parts(name, value)?;
                let tag = options
                    .iter()
                    .position(|(o, _)| o == option)
                    .ok_or_else(|| CodecError::UnknownVariantOption {
                        variant: name.clone(),
                        option: option.to_string(),
                    })?;
                cursor.write_varuint32(tag as u32);
                self.encode_id(options[tag].1, inner, cursor)
            }
        }
    }
}

fn check_depth(depth: usize) -> Result<(), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::malformed(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(())
}

fn decode_array(
    cursor: &mut ByteCursor,
    mut element: impl FnMut(&mut ByteCursor) -> Result<AbiValue, CodecError>,
) -> Result<AbiValue, CodecError> {
    let len = cursor.read_varuint32()? as usize;
    // a bogus length must not drive the allocation
    let mut items = Vec::with_capacity(len.min(cursor.remaining()));
    for _ in 0..len {
        items.push(element(cursor)?);
    }
    Ok(AbiValue::Array(items))
}

fn decode_optional(
    cursor: &mut ByteCursor,
    mut inner: impl FnMut(&mut ByteCursor) -> Result<AbiValue, CodecError>,
) -> Result<AbiValue, CodecError> {
    match cursor.read_u8()? {
        0 => Ok(AbiValue::Null),
        1 => inner(cursor),
        flag => Err(CodecError::malformed(format!(
            "optional presence flag must be 0 or 1, got {flag}"
        ))),
    }
}

fn decode_extension(
    cursor: &mut ByteCursor,
    mut inner: impl FnMut(&mut ByteCursor) -> Result<AbiValue, CodecError>,
) -> Result<AbiValue, CodecError> {
    if cursor.has_remaining() {
        inner(cursor)
    } else {
        Ok(AbiValue::Null)
    }
}

fn encode_array(
    name: &str,
    value: &AbiValue,
    cursor: &mut ByteCursor,
    mut element: impl FnMut(&AbiValue, &mut ByteCursor) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    let items = value.as_array().ok_or_else(|| CodecError::TypeMismatch {
        expected: name.to_string(),
        got: value.kind().to_string(),
    })?;
    cursor.write_varuint32(items.len() as u32);
    for item in items {
        element(item, cursor)?;
    }
    Ok(())
}

fn encode_optional(
    value: &AbiValue,
    cursor: &mut ByteCursor,
    mut inner: impl FnMut(&AbiValue, &mut ByteCursor) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    if value.is_null() {
        cursor.write_u8(0);
        Ok(())
    } else {
        cursor.write_u8(1);
        inner(value, cursor)
    }
}

fn encode_extension(
    value: &AbiValue,
    cursor: &mut ByteCursor,
    mut inner: impl FnMut(&AbiValue, &mut ByteCursor) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    if value.is_null() {
        Ok(())
    } else {
        inner(value, cursor)
    }
}

/// Accepts both `Variant { name, value }` and the JSON form `[name, value]`.
fn variant_parts<'v>(
    variant: &str,
    value: &'v AbiValue,
) -> Result<(&'v str, &'v AbiValue), CodecError> {
    match value {
        AbiValue::Variant { name, value } => Ok((name, value)),
        AbiValue::Array(pair) if pair.len() == 2 => match &pair[0] {
            AbiValue::Str(name) | AbiValue::Name(name) => Ok((name, &pair[1])),
            other => Err(CodecError::TypeMismatch {
                expected: format!("{variant} option name"),
                got: other.kind().to_string(),
            }),
        },
        other => Err(CodecError::TypeMismatch {
            expected: variant.to_string(),
            got: other.kind().to_string(),
        }),
    }
}
