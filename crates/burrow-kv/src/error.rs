//! Adapter error types.
//!
//! A deliberate asymmetry: a missing key is never an error here. Point reads
//! return `Ok(None)` and scans terminate; only genuine failures (closed
//! environment, unknown DBI, encoding problems, engine errors) surface as
//! `KvError`.

use std::error::Error;
use std::fmt;

use burrow_core::BurrowError;

use crate::codec::CodecError;

/// Adapter error types
#[derive(Debug)]
pub enum KvError {
    /// Operation on a closed environment
    NotOpen,

    /// `get_dbi` on a name that was never opened (or was dropped)
    UnknownDbi(String),

    /// Invalid configuration value
    Config(String),

    /// Value encoding or decoding failed; includes buffer overflow
    Encoding(CodecError),

    /// Two environment handles were opened for one directory in this process
    BadReaderLock,

    /// A write batch failed; carries a rendering of the input batch
    Transact {
        /// Debug rendering of the failed batch
        batch: String,
        /// The underlying failure
        source: Box<KvError>,
    },

    /// Engine failure, wrapped with the operation that hit it
    Native {
        /// The adapter operation in flight
        op: &'static str,
        /// The engine error
        source: BurrowError,
    },
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::NotOpen => write!(f, "environment is closed"),

            KvError::UnknownDbi(name) => {
                write!(f, "no open DBI named `{}`; call open_dbi first", name)
            }

            KvError::Config(reason) => write!(f, "invalid configuration: {}", reason),

            KvError::Encoding(e) => write!(f, "encoding failed: {}", e),

            KvError::BadReaderLock => {
                write!(
                    f,
                    "bad reader lock: open a single environment per directory per process and share that handle across threads"
                )
            }

            KvError::Transact { batch, source } => {
                write!(f, "transact failed: {}; batch was {}", source, batch)
            }

            KvError::Native { op, source } => write!(f, "{} failed: {}", op, source),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KvError::Encoding(e) => Some(e),
            KvError::Transact { source, .. } => Some(source.as_ref()),
            KvError::Native { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CodecError> for KvError {
    fn from(err: CodecError) -> Self {
        KvError::Encoding(err)
    }
}

impl KvError {
    /// Wrap an engine error with the operation name. The reader-lock error
    /// maps to its user-facing guidance instead.
    pub(crate) fn native(op: &'static str, source: BurrowError) -> Self {
        match source {
            BurrowError::BadReaderLock { .. } => KvError::BadReaderLock,
            source => KvError::Native { op, source },
        }
    }

    /// True when the underlying engine ran out of map space — the write
    /// pipeline recovers from this by growing the map and retrying.
    pub fn is_map_full(&self) -> bool {
        matches!(self, KvError::Native { source, .. } if source.is_map_full())
    }
}

/// Result type alias for adapter operations
pub type KvResult<T> = Result<T, KvError>;
