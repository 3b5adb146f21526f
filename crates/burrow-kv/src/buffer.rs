//! Fixed-capacity byte buffers for encode scratch space.
//!
//! A `BufferCell` has an input view (writable, cleared before each encode)
//! and an output view (the filled region). It never grows on its own: a
//! write past capacity is refused and the *caller* decides whether to
//! replace the cell with a larger one (value buffers) or fail (key buffers).

/// A byte buffer with a capacity fixed at creation.
///
/// The capacity is the requested one exactly, not whatever the allocator
/// rounded up to — a 511-byte key cell refuses a 512-byte key.
pub struct BufferCell {
    buf: Vec<u8>,
    cap: usize,
}

impl BufferCell {
    /// Allocate a cell of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), cap: capacity }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes still writable before the cell is full.
    pub fn remaining(&self) -> usize {
        self.cap - self.buf.len()
    }

    /// Clear the input view. Capacity is untouched.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Append bytes; `Err` carries the total size the write would have
    /// needed. Nothing is written on overflow.
    pub fn try_put(&mut self, bytes: &[u8]) -> Result<(), usize> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.cap {
            return Err(needed);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// The output view: everything written since the last reset.
    pub fn filled(&self) -> &[u8] {
        &self.buf
    }
}
