//! `SchemaCache`: memoises resolved type tables by schema version.
//!
//! A hit never touches the store. A miss resolves the schema, keeps the
//! table in memory and hands the encoded schema to the store on a spawned
//! task. A failed write is logged and counted in
//! [`CacheStats::store_failures`]; the in-memory table stays usable.

use crate::store::{SchemaStore, StoredSchema};
use chainship_core::{CodecError, Schema, TypeTable};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Type tables built from a schema.
    pub builds: u64,
    /// Tables recovered from the store instead of a handshake.
    pub store_loads: u64,
    /// Failed store reads and writes, including schemas that could not be
    /// encoded for storage.
    pub store_failures: u64,
}

pub struct SchemaCache {
    tables: HashMap<String, Arc<TypeTable>>,
    store: Option<Arc<dyn SchemaStore>>,
    stats: CacheStats,
    // written from spawned persist tasks
    write_failures: Arc<AtomicU64>,
    pending: Vec<JoinHandle<()>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    /// A cache with no durable store.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            store: None,
            stats: CacheStats::default(),
            write_failures: Arc::new(AtomicU64::new(0)),
            pending: Vec::new(),
        }
    }

    pub fn with_store(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            store_failures: self.stats.store_failures + self.write_failures.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    pub fn contains(&self, version: &str) -> bool {
        self.tables.contains_key(version)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the table for `schema.version`, building it on first sight.
    pub fn resolve(&mut self, schema: &Schema) -> Result<Arc<TypeTable>, CodecError> {
        if let Some(table) = self.tables.get(&schema.version) {
            self.stats.hits += 1;
            return Ok(Arc::clone(table));
        }
        self.stats.misses += 1;
        let table = self.build(schema)?;
        self.persist(schema);
        Ok(table)
    }

    /// Resolves a raw handshake payload.
    ///
    /// The version is peeked first so a hit skips decoding the schema.
    pub fn resolve_handshake(&mut self, bytes: &[u8]) -> Result<Arc<TypeTable>, CodecError> {
        let version = Schema::peek_version(bytes)?;
        if let Some(table) = self.tables.get(&version) {
            self.stats.hits += 1;
            debug!(version = %version, "schema cache hit");
            return Ok(Arc::clone(table));
        }
        let schema = Schema::from_handshake(bytes)?;
        self.resolve(&schema)
    }

    /// Looks a version up in memory, then in the store.
    ///
    /// Store errors degrade to `Ok(None)`; a schema read back from the store
    /// is not written again.
    pub async fn get(&mut self, version: &str) -> Result<Option<Arc<TypeTable>>, CodecError> {
        if let Some(table) = self.tables.get(version) {
            self.stats.hits += 1;
            return Ok(Some(Arc::clone(table)));
        }
        self.stats.misses += 1;

        let Some(store) = self.store.clone() else {
            return Ok(None);
        };
        let stored = match store.get(version).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.stats.store_failures += 1;
                warn!(version = %version, error = %e, "schema store read failed");
                return Ok(None);
            }
        };

        let schema = stored.schema()?;
        let table = self.build(&schema)?;
        self.stats.store_loads += 1;
        debug!(version = %version, "schema loaded from store");
        Ok(Some(table))
    }

    /// Waits for every outstanding store write.
    pub async fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "schema store write task failed");
            }
        }
    }

    fn build(&mut self, schema: &Schema) -> Result<Arc<TypeTable>, CodecError> {
        let table = Arc::new(TypeTable::new(schema)?);
        self.stats.builds += 1;
        self.tables
            .insert(schema.version.clone(), Arc::clone(&table));
        debug!(version = %schema.version, "schema resolved");
        Ok(table)
    }

    fn persist(&mut self, schema: &Schema) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let stored = match StoredSchema::from_schema(schema) {
            Ok(stored) => stored,
            Err(e) => {
                self.stats.store_failures += 1;
                warn!(version = %schema.version, error = %e, "schema could not be encoded for storage");
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(version = %schema.version, "no async runtime; schema not persisted");
            return;
        };

        let failures = Arc::clone(&self.write_failures);
        self.pending.retain(|h| !h.is_finished());
        self.pending.push(runtime.spawn(async move {
            if let Err(e) = store.put(stored.clone()).await {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(version = %stored.version, error = %e, "schema store write failed");
            }
        }));
    }
}
