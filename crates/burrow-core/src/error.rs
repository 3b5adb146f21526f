//! Error types for engine operations
//!
//! All engine errors are represented by the BurrowError enum, which carries
//! enough context (paths, offsets, limits) to diagnose a failure without a
//! debugger attached.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Engine error types with detailed context
#[derive(Debug, Clone)]
pub enum BurrowError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Data file contents failed validation
    Corrupted {
        /// Path to the corrupted data file
        path: PathBuf,
        /// Byte offset where corruption was detected
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// The memory map has no room left for the write
    MapFull {
        /// Current map size in bytes
        map_size: u64,
    },

    /// Requested map size does not grow the map
    InvalidMapSize {
        /// Requested size in bytes
        requested: u64,
        /// Current size in bytes
        current: u64,
    },

    /// All reader slots are taken
    ReadersFull {
        /// Configured reader slot count
        max_readers: u32,
    },

    /// Named DBI limit reached
    DbsFull {
        /// Configured DBI limit
        max_dbs: u32,
    },

    /// Key already exists (NO_OVERWRITE put)
    KeyExist,

    /// No matching key found
    NotFound,

    /// The DBI id is not open in this version of the store
    BadDbi {
        /// The offending DBI id
        dbi: u32,
    },

    /// A second environment handle was opened for the same directory
    /// within this process
    BadReaderLock {
        /// The contended directory
        path: PathBuf,
    },

    /// Operation on a read transaction that has been reset
    TxnReset,

    /// Operation on a closed engine
    Closed,
}

impl fmt::Display for BurrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurrowError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            BurrowError::Corrupted { path, offset, reason } => {
                write!(f, "data file {} corrupted at offset {}: {}", path.display(), offset, reason)
            }

            BurrowError::MapFull { map_size } => {
                write!(f, "map full: {} bytes exhausted, grow the map and retry", map_size)
            }

            BurrowError::InvalidMapSize { requested, current } => {
                write!(f, "invalid map size: requested {} bytes, current {} bytes (the map only grows)",
                       requested, current)
            }

            BurrowError::ReadersFull { max_readers } => {
                write!(f, "all {} reader slots are in use", max_readers)
            }

            BurrowError::DbsFull { max_dbs } => {
                write!(f, "cannot open another DBI: limit of {} reached", max_dbs)
            }

            BurrowError::KeyExist => write!(f, "key already exists"),

            BurrowError::NotFound => write!(f, "key not found"),

            BurrowError::BadDbi { dbi } => write!(f, "DBI {} is not open", dbi),

            BurrowError::BadReaderLock { path } => {
                write!(f, "reader lock conflict on {}: another environment handle is open for this directory in this process",
                       path.display())
            }

            BurrowError::TxnReset => write!(f, "read transaction is reset; renew it before use"),

            BurrowError::Closed => write!(f, "engine is closed"),
        }
    }
}

impl Error for BurrowError {}

impl From<io::Error> for BurrowError {
    fn from(err: io::Error) -> Self {
        BurrowError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl BurrowError {
    /// Build an I/O error with path context.
    pub(crate) fn io(path: &std::path::Path, err: io::Error, what: &str) -> Self {
        BurrowError::Io {
            path: Some(path.to_path_buf()),
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }

    /// True for the map-capacity error that write paths recover from by
    /// growing the map.
    pub fn is_map_full(&self) -> bool {
        matches!(self, BurrowError::MapFull { .. })
    }
}

/// Result type alias for engine operations
pub type BurrowResult<T> = Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BurrowError::Corrupted {
            path: PathBuf::from("/tmp/data.bdb"),
            offset: 4096,
            reason: "checksum mismatch".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("data.bdb"));
        assert!(display.contains("4096"));
        assert!(display.contains("checksum mismatch"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BurrowError = io_err.into();

        match err {
            BurrowError::Io { kind, .. } => assert_eq!(kind, io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_map_full_predicate() {
        assert!(BurrowError::MapFull { map_size: 1024 }.is_map_full());
        assert!(!BurrowError::NotFound.is_map_full());
    }
}
