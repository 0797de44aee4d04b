//! # chainship-core
//!
//! Core codec primitives shared across all ChainShip crates.
//!
//! The state-history stream is described by a runtime-supplied schema (the
//! ABI). This crate models that schema, resolves it into a [`TypeTable`] of
//! concrete encode/decode strategies and drives byte-level (de)serialization
//! over a [`ByteCursor`].
//!
//! ## Layers
//! ```text
//! ByteCursor        little-endian integers, varints, names, length-prefixed bytes
//!     │
//!     ▼
//! Schema            abi_def model (JSON or binary, bootstrapped by a built-in meta-schema)
//!     │
//!     ▼
//! TypeTable         name → resolved codec, built once per schema version
//!     │
//!     ▼
//! AbiValue          dynamically-typed decoded value
//! ```

pub mod cursor;
pub mod error;
pub mod meta;
pub mod name;
pub mod schema;
pub mod table;
pub mod types;
pub mod value;

pub use cursor::ByteCursor;
pub use error::{CodecError, StoreError};
pub use name::Name;
pub use schema::Schema;
pub use table::TypeTable;
pub use types::{Primitive, TypeDescriptor};
pub use value::AbiValue;
