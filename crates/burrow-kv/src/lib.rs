//! BurrowDB key-value adapter.
//!
//! A thread-safe, higher-level surface over the `burrow-core` engine:
//! environments rooted at a directory, named sub-databases, typed keys and
//! values, batched atomic writes with automatic map growth, and ordered
//! range scans driven by a declarative range grammar.
//!
//! # Architecture
//!
//! - Callers open an [`Env`], then open DBIs by name.
//! - Reads lease a pooled read transaction ([`RtxPool`]), do their work, and
//!   release it by resetting — the lease is an RAII guard.
//! - Range reads decode a [`KeyRange`] into a direction/bounds descriptor
//!   and drive a lazy cursor walk ([`Scan`]).
//! - Writes go through [`Env::transact`]: one engine write transaction per
//!   batch, with transparent grow-and-retry when the memory map fills.
//!
//! ```no_run
//! use burrow_kv::{Env, KeyRange, Op, Value, ValueKind};
//!
//! # fn main() -> burrow_kv::KvResult<()> {
//! let env = Env::open("/tmp/burrow-demo")?;
//! env.open_dbi("things")?;
//!
//! env.transact(&[
//!     Op::put("things", Value::U64(1), Value::str("one")),
//!     Op::put("things", Value::U64(2), Value::str("two")),
//! ])?;
//!
//! let pairs = env.get_range(
//!     "things",
//!     &KeyRange::AtLeast(&Value::U64(1)),
//!     ValueKind::U64,
//!     ValueKind::Str,
//! )?;
//! assert_eq!(pairs.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod dbi;
pub mod env;
pub mod error;
pub mod range;
pub mod rtx;
pub mod scan;

pub use buffer::BufferCell;
pub use codec::{measure_size, put_buffer, read_value, CodecError, Value, ValueKind};
pub use config::Config;
pub use dbi::Dbi;
pub use env::{Env, Op};
pub use error::{KvError, KvResult};
pub use range::{KeyRange, RangeSpec};
pub use rtx::{PooledRtx, Rtx, RtxPool};
pub use scan::Scan;

// the engine types that show through the adapter surface
pub use burrow_core::{StoreInfo, WriteFlags};
