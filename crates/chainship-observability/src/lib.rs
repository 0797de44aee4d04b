//! # chainship-observability
//!
//! Logging setup for applications built on ChainShip.
//!
//! The library crates only emit `tracing` events:
//! - connection lifecycle at `info`
//! - per-message flow control (acks, pongs, block arrivals) at `debug`
//! - recoverable failures (bad messages, handler errors, store writes) at `warn`
//!
//! [`init_tracing`] installs a `tracing-subscriber` registry with a
//! per-component `EnvFilter`, as text or as JSON lines for log shippers.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig};
