//! The external persistence collaborator.

use async_trait::async_trait;
use chainship_core::{CodecError, Schema, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A schema as persisted: its version plus the binary `abi_def` encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub version: String,
    #[serde(with = "hex_bytes")]
    pub abi: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

impl StoredSchema {
    /// Encodes `schema` for storage, stamped with the current time.
    pub fn from_schema(schema: &Schema) -> Result<Self, CodecError> {
        Ok(Self {
            version: schema.version.clone(),
            abi: schema.encode()?,
            last_modified: Utc::now(),
        })
    }

    /// Decodes the stored `abi_def` back into a schema.
    pub fn schema(&self) -> Result<Schema, CodecError> {
        Schema::decode(&self.abi)
    }
}

/// Durable key → schema storage, keyed by version string.
///
/// Implementations must be cheap to share across tasks; the cache calls
/// `put` from a spawned task.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Returns `Ok(None)` when the version has never been stored.
    async fn get(&self, version: &str) -> Result<Option<StoredSchema>, StoreError>;

    /// Inserts or replaces the entry for `schema.version`.
    async fn put(&self, schema: StoredSchema) -> Result<(), StoreError>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
