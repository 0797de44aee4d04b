//! In-memory `SchemaStore` implementation.
//!
//! Suitable for testing and single-process deployments.
//! Thread-safe via `Arc<RwLock<..>>`.

use crate::store::{SchemaStore, StoredSchema};
use async_trait::async_trait;
use chainship_core::StoreError;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
};

#[derive(Clone, Default)]
pub struct MemorySchemaStore {
    entries: Arc<RwLock<HashMap<String, StoredSchema>>>,
    puts: Arc<AtomicUsize>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, version: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(version)
    }

    /// Number of `put` calls received, replacements included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn get(&self, version: &str) -> Result<Option<StoredSchema>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(version)
            .cloned())
    }

    async fn put(&self, schema: StoredSchema) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.version.clone(), schema);
        Ok(())
    }
}
