//! SQLite-backed `SchemaStore` implementation.
//!
//! Persists each schema version as its binary `abi_def` blob in a local
//! SQLite database, so a restarted reader can skip the handshake decode.
//!
//! ## Feature flag
//! This module is only compiled when the `sqlite` feature is enabled:
//! ```toml
//! chainship-registry = { version = "...", features = ["sqlite"] }
//! ```
//!
//! ## Schema
//! ```sql
//! CREATE TABLE ship_abis (
//!     version       TEXT PRIMARY KEY,
//!     abi           BLOB NOT NULL,
//!     last_modified TEXT NOT NULL   -- RFC 3339, UTC
//! );
//! ```

use crate::store::{SchemaStore, StoredSchema};
use async_trait::async_trait;
use chainship_core::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

/// SQLite-backed schema store.
///
/// Thread-safe via an internal `Arc<Mutex<Connection>>`; every query runs on
/// the blocking thread pool.
#[derive(Clone)]
pub struct SqliteSchemaStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSchemaStore {
    /// Open (or create) a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::Database(format!("sqlite open error: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(sqlite_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ship_abis (
                version       TEXT PRIMARY KEY,
                abi           BLOB NOT NULL,
                last_modified TEXT NOT NULL
            );",
        )
        .map_err(sqlite_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (useful for tests).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    /// Number of stored versions.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM ship_abis", [], |row| row.get(0))
            .map_err(sqlite_err)?;
        Ok(n as usize)
    }

    fn get_blocking(&self, version: &str) -> Result<Option<StoredSchema>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row = conn
            .query_row(
                "SELECT version, abi, last_modified FROM ship_abis WHERE version = ?1",
                params![version],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(sqlite_err)?;

        row.map(|(version, abi, modified)| {
            let last_modified = DateTime::parse_from_rfc3339(&modified)
                .map_err(|e| StoreError::Serialization(format!("bad timestamp '{modified}': {e}")))?
                .with_timezone(&Utc);
            Ok(StoredSchema {
                version,
                abi,
                last_modified,
            })
        })
        .transpose()
    }

    fn put_blocking(&self, schema: &StoredSchema) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO ship_abis (version, abi, last_modified)
             VALUES (?1, ?2, ?3)",
            params![
                &schema.version,
                &schema.abi,
                schema.last_modified.to_rfc3339(),
            ],
        )
        .map_err(sqlite_err)?;
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for SqliteSchemaStore {
    async fn get(&self, version: &str) -> Result<Option<StoredSchema>, StoreError> {
        let this = self.clone();
        let version = version.to_string();
        tokio::task::spawn_blocking(move || this.get_blocking(&version))
            .await
            .map_err(join_err)?
    }

    async fn put(&self, schema: StoredSchema) -> Result<(), StoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.put_blocking(&schema))
            .await
            .map_err(join_err)?
    }
}

fn sqlite_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> StoreError {
    StoreError::Database(format!("store task failed: {e}"))
}
