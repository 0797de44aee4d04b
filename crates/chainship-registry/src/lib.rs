//! # chainship-registry
//!
//! Version-keyed cache of resolved [`TypeTable`](chainship_core::TypeTable)s.
//!
//! ## Levels
//! 1. **In-process cache**: `SchemaCache`, one table per schema version,
//!    built at most once per process
//! 2. **Durable store**: any `SchemaStore`; written fire-and-forget on a
//!    cache miss and read back when a fresh process meets a version it has
//!    not seen this session
//!
//! Two stores ship with the crate: `MemorySchemaStore` and, behind the
//! `sqlite` feature, `SqliteSchemaStore`.

pub mod cache;
pub mod memory;
#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub mod sqlite;
pub mod store;

pub use cache::{CacheStats, SchemaCache};
pub use memory::MemorySchemaStore;
pub use store::{SchemaStore, StoredSchema};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use sqlite::SqliteSchemaStore;
