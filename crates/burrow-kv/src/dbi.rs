//! Named sub-database handles.
//!
//! A `Dbi` wraps the engine's numeric DBI id with the scratch buffers the
//! write path encodes into. The write buffers are not thread-safe on their
//! own — a mutex confines them, and in practice every writer arrives through
//! the environment's single `transact` path anyway.
//!
//! Read operations never touch the write buffers; they encode into the
//! leased RTX's private cells.

use parking_lot::Mutex;

use burrow_core::{RwTxn, WriteFlags};

use crate::buffer::BufferCell;
use crate::codec::{self, Value};
use crate::config::Config;
use crate::error::{KvError, KvResult};
use crate::range::KeyRange;
use crate::rtx::{Rtx, RtxState};
use crate::scan::Scan;

pub(crate) struct WriteBufs {
    /// Key scratch. Fixed size: an oversized key is a caller error.
    kb: BufferCell,
    /// Value scratch. Replaced with a `2 x measured` cell on overflow.
    vb: BufferCell,
}

impl WriteBufs {
    fn encode_key(&mut self, key: &Value) -> KvResult<()> {
        self.kb.reset();
        codec::put_buffer(&mut self.kb, key).map_err(KvError::Encoding)
    }

    fn encode_val(&mut self, value: &Value) -> KvResult<()> {
        self.vb.reset();
        match codec::put_buffer(&mut self.vb, value) {
            Ok(()) => Ok(()),
            Err(e) if e.is_overflow() => {
                // release the cell, allocate double the measured need, retry
                // the encode exactly once
                let grown = 2 * codec::measure_size(value);
                tracing::debug!(capacity = self.vb.capacity(), grown, "growing value buffer");
                self.vb = BufferCell::new(grown);
                codec::put_buffer(&mut self.vb, value).map_err(KvError::Encoding)
            }
            Err(e) => Err(KvError::Encoding(e)),
        }
    }
}

/// A handle to one named sub-database.
pub struct Dbi {
    pub(crate) id: u32,
    name: String,
    wb: Mutex<WriteBufs>,
}

impl Dbi {
    pub(crate) fn new(id: u32, name: &str, cfg: &Config) -> Self {
        Self {
            id,
            name: name.to_string(),
            wb: Mutex::new(WriteBufs {
                kb: BufferCell::new(cfg.max_key_size),
                vb: BufferCell::new(cfg.default_val_size),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode key and value into the scratch buffers and put them through
    /// the open write transaction.
    pub fn put(&self, txn: &mut RwTxn, key: &Value, value: &Value, flags: WriteFlags) -> KvResult<()> {
        let mut wb = self.wb.lock();
        wb.encode_key(key)?;
        wb.encode_val(value)?;
        txn.put(self.id, wb.kb.filled(), wb.vb.filled(), flags)
            .map_err(|e| KvError::native("put", e))
    }

    /// Delete the key through the open write transaction. Deleting an
    /// absent key is a no-op: batches stay idempotent under retry.
    pub fn del(&self, txn: &mut RwTxn, key: &Value) -> KvResult<()> {
        let mut wb = self.wb.lock();
        wb.encode_key(key)?;
        match txn.del(self.id, wb.kb.filled()) {
            Err(burrow_core::BurrowError::NotFound) => Ok(()),
            result => result.map_err(|e| KvError::native("del", e)),
        }
    }

    /// Point lookup under a leased RTX. The value is materialized into the
    /// RTX's value cell and the cell's output view returned.
    pub fn get_kv<'r>(&self, rtx: &'r mut Rtx, key: &Value) -> KvResult<Option<&'r [u8]>> {
        debug_assert!(matches!(rtx.state, RtxState::Active));
        let Rtx { txn, kb, vb, .. } = rtx;

        kb.reset();
        codec::put_buffer(kb, key).map_err(KvError::Encoding)?;

        match txn.get(self.id, kb.filled()).map_err(|e| KvError::native("get", e))? {
            Some(bytes) => {
                if bytes.len() > vb.capacity() {
                    // an oversized value was written through a grown DBI
                    // buffer; the RTX cell follows suit
                    *vb = BufferCell::new(2 * bytes.len());
                }
                vb.reset();
                let capacity = vb.capacity();
                vb.try_put(bytes).map_err(|needed| {
                    KvError::Encoding(codec::CodecError::BufferOverflow { needed, capacity })
                })?;
                Ok(Some(vb.filled()))
            }
            None => Ok(None),
        }
    }

    /// Open a range scan under a leased RTX. The range bounds are encoded
    /// into the RTX's start/stop cells; the returned scan borrows the RTX.
    pub fn iterate_kv<'r>(&self, rtx: &'r mut Rtx, range: &KeyRange<'_>) -> KvResult<Scan<'r>> {
        debug_assert!(matches!(rtx.state, RtxState::Active));
        let (spec, start, stop) = range.decode();

        rtx.start_kb.reset();
        if let Some(value) = start {
            codec::put_buffer(&mut rtx.start_kb, value).map_err(KvError::Encoding)?;
        }
        rtx.stop_kb.reset();
        if let Some(value) = stop {
            codec::put_buffer(&mut rtx.stop_kb, value).map_err(KvError::Encoding)?;
        }

        let cur = rtx
            .txn
            .open_cursor(self.id)
            .map_err(|e| KvError::native("open_cursor", e))?;
        Ok(Scan::new(cur, rtx, spec))
    }
}
