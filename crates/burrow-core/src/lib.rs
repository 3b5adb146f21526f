//! BurrowDB Core — ordered, memory-mapped key-value engine.
//!
//! A storage engine with LMDB-shaped semantics: one environment per
//! directory, named sub-databases (DBIs) with ordered byte keys, many
//! concurrent snapshot readers, exactly one writer, and a growable
//! memory-mapped data file.
//!
//! # Architecture
//!
//! - **Working set**: one `BTreeMap` per DBI inside an immutable,
//!   `Arc`-shared version; commits publish a new version atomically.
//! - **Durability**: committed mutations are appended to the memory map as
//!   CRC32C-framed records and replayed on open; a Commit marker bounds each
//!   atomic batch.
//! - **Concurrency**: readers pin versions and never block; writers
//!   serialize through a gate; reader slots are capped like an LMDB reader
//!   table.
//!
//! Higher-level access (typed values, range grammar, pooled read
//! transactions) lives in the `burrow-kv` adapter crate.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
mod format;
mod mapfile;
mod readers;
pub mod txn;

pub use config::{EnvFlags, StoreOptions, WriteFlags, MIN_MAP_SIZE};
pub use cursor::{Cursor, CursorOp};
pub use engine::{BurrowEngine, StoreInfo, DATA_FILE};
pub use error::{BurrowError, BurrowResult};
pub use txn::{RoTxn, RwTxn};
