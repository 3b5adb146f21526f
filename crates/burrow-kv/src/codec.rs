//! Typed values and their byte encodings.
//!
//! Encodings are order-preserving: comparing encoded bytes with the engine's
//! lexicographic comparator orders values the way their types order them.
//! Integers are big-endian, signed integers additionally have the sign bit
//! flipped so negatives sort before positives.

use std::error::Error;
use std::fmt;

use crate::buffer::BufferCell;

const SIGN_BIT: u64 = 1 << 63;

/// A typed value travelling through the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Raw bytes, stored verbatim.
    Data(Vec<u8>),
    /// UTF-8 string, stored as its bytes.
    Str(String),
    /// Unsigned integer, stored big-endian.
    U64(u64),
    /// Signed integer, stored big-endian with the sign bit flipped.
    I64(i64),
}

impl Value {
    /// Convenience constructor for raw bytes.
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Data(bytes.into())
    }

    /// Convenience constructor for strings.
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }
}

/// Decode-side type tag. `Data` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    Data,
    Str,
    U64,
    I64,
}

/// Codec failure.
#[derive(Debug)]
pub enum CodecError {
    /// The destination buffer cannot hold the encoding.
    BufferOverflow {
        /// Bytes the encoding needs
        needed: usize,
        /// Capacity of the destination
        capacity: usize,
    },
    /// Stored bytes do not decode as the requested kind.
    Malformed {
        /// The kind requested
        kind: ValueKind,
        /// What went wrong
        reason: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BufferOverflow { needed, capacity } => {
                write!(f, "BufferOverflow: encoding needs {} bytes, buffer holds {}", needed, capacity)
            }
            CodecError::Malformed { kind, reason } => {
                write!(f, "malformed {:?} value: {}", kind, reason)
            }
        }
    }
}

impl Error for CodecError {}

impl CodecError {
    pub fn is_overflow(&self) -> bool {
        matches!(self, CodecError::BufferOverflow { .. })
    }
}

/// Encoded size of a value, in bytes.
pub fn measure_size(value: &Value) -> usize {
    match value {
        Value::Data(bytes) => bytes.len(),
        Value::Str(s) => s.len(),
        Value::U64(_) | Value::I64(_) => 8,
    }
}

/// Encode a value into a buffer cell. The cell is not reset here; callers
/// reset before each encode.
pub fn put_buffer(buf: &mut BufferCell, value: &Value) -> Result<(), CodecError> {
    let capacity = buf.capacity();
    let overflow = move |needed| CodecError::BufferOverflow { needed, capacity };
    match value {
        Value::Data(bytes) => buf.try_put(bytes).map_err(overflow),
        Value::Str(s) => buf.try_put(s.as_bytes()).map_err(overflow),
        Value::U64(n) => buf.try_put(&n.to_be_bytes()).map_err(overflow),
        Value::I64(n) => buf.try_put(&((*n as u64) ^ SIGN_BIT).to_be_bytes()).map_err(overflow),
    }
}

/// Decode stored bytes as the requested kind.
pub fn read_value(bytes: &[u8], kind: ValueKind) -> Result<Value, CodecError> {
    match kind {
        ValueKind::Data => Ok(Value::Data(bytes.to_vec())),
        ValueKind::Str => String::from_utf8(bytes.to_vec())
            .map(Value::Str)
            .map_err(|e| CodecError::Malformed { kind, reason: e.to_string() }),
        ValueKind::U64 => {
            let raw: [u8; 8] = bytes.try_into().map_err(|_| CodecError::Malformed {
                kind,
                reason: format!("expected 8 bytes, got {}", bytes.len()),
            })?;
            Ok(Value::U64(u64::from_be_bytes(raw)))
        }
        ValueKind::I64 => {
            let raw: [u8; 8] = bytes.try_into().map_err(|_| CodecError::Malformed {
                kind,
                reason: format!("expected 8 bytes, got {}", bytes.len()),
            })?;
            Ok(Value::I64((u64::from_be_bytes(raw) ^ SIGN_BIT) as i64))
        }
    }
}
