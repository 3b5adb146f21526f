//! Transactions: `RoTxn` (snapshot reads) and `RwTxn` (exclusive writes).
//!
//! A read transaction pins one committed version and serves every lookup
//! from it; commits that happen later are invisible until `reset` + `renew`.
//! A write transaction owns a copy-on-write working version plus the
//! serialized record batch, and publishes both atomically at commit.

use std::sync::Arc;

use crate::config::WriteFlags;
use crate::cursor::Cursor;
use crate::engine::{BurrowEngine, Version};
use crate::error::{BurrowError, BurrowResult};
use crate::format;

/// A read-only transaction.
///
/// Holds a reader slot for its whole life and a version pin while active.
/// After `reset` the slot is retained but no snapshot is pinned; `renew`
/// re-pins the current version.
pub struct RoTxn {
    engine: Arc<BurrowEngine>,
    slot: usize,
    snap: Option<Arc<Version>>,
}

impl RoTxn {
    pub(crate) fn new(engine: Arc<BurrowEngine>, slot: usize) -> Self {
        let snap = Some(engine.current_version());
        Self { engine, slot, snap }
    }

    /// Drop the version pin. The reader slot is kept.
    pub fn reset(&mut self) {
        self.snap = None;
    }

    /// Pin the current committed version.
    pub fn renew(&mut self) -> BurrowResult<()> {
        if self.engine.is_closed() {
            return Err(BurrowError::Closed);
        }
        self.snap = Some(self.engine.current_version());
        Ok(())
    }

    fn snapshot(&self) -> BurrowResult<&Arc<Version>> {
        self.snap.as_ref().ok_or(BurrowError::TxnReset)
    }

    /// Look up a key. The returned view borrows the pinned snapshot.
    pub fn get(&self, dbi: u32, key: &[u8]) -> BurrowResult<Option<&[u8]>> {
        Ok(self.snapshot()?.dbi(dbi)?.entries.get(key).map(|v| v.as_slice()))
    }

    /// Entry count of a DBI in the pinned snapshot.
    pub fn entries(&self, dbi: u32) -> BurrowResult<u64> {
        Ok(self.snapshot()?.dbi(dbi)?.entries.len() as u64)
    }

    /// Open a cursor over one DBI of the pinned snapshot.
    pub fn open_cursor(&self, dbi: u32) -> BurrowResult<Cursor> {
        Ok(Cursor::new(Arc::clone(self.snapshot()?.dbi(dbi)?)))
    }
}

impl Drop for RoTxn {
    fn drop(&mut self) {
        self.engine.release_reader(self.slot);
    }
}

/// Releases the engine's write gate when the transaction goes away,
/// committed or not.
pub(crate) struct WriteGuard {
    engine: Arc<BurrowEngine>,
}

impl WriteGuard {
    pub(crate) fn new(engine: Arc<BurrowEngine>) -> Self {
        Self { engine }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.engine.release_writer();
    }
}

/// The write transaction. At most one exists per engine at any time.
pub struct RwTxn {
    engine: Arc<BurrowEngine>,
    _gate: WriteGuard,
    version: Version,
    batch: Vec<u8>,
    base_pos: usize,
    map_size: usize,
    txn_id: u64,
}

impl RwTxn {
    pub(crate) fn new(
        engine: Arc<BurrowEngine>,
        gate: WriteGuard,
        version: Version,
        base_pos: usize,
        map_size: usize,
        txn_id: u64,
    ) -> Self {
        Self {
            engine,
            _gate: gate,
            version,
            batch: Vec::new(),
            base_pos,
            map_size,
            txn_id,
        }
    }

    /// Id this transaction will commit as.
    pub fn id(&self) -> u64 {
        self.txn_id
    }

    /// Fail early when the serialized batch would no longer fit in the map.
    /// Checked before mutating, so a MapFull put leaves the txn untouched.
    fn ensure_space(&self, record_len: usize) -> BurrowResult<()> {
        let projected = self.base_pos + self.batch.len() + record_len + format::COMMIT_RECORD_LEN;
        if projected > self.map_size {
            return Err(BurrowError::MapFull { map_size: self.map_size as u64 });
        }
        Ok(())
    }

    /// Insert or update a key.
    pub fn put(&mut self, dbi: u32, key: &[u8], value: &[u8], flags: WriteFlags) -> BurrowResult<()> {
        self.ensure_space(format::put_record_len(key.len(), value.len()))?;
        let state = self.version.dbi_mut(dbi)?;
        if flags.contains(WriteFlags::NO_OVERWRITE) && state.entries.contains_key(key) {
            return Err(BurrowError::KeyExist);
        }
        state.entries.insert(key.to_vec(), value.to_vec());
        format::push_put(&mut self.batch, dbi, key, value);
        Ok(())
    }

    /// Delete a key. A missing key is NotFound.
    pub fn del(&mut self, dbi: u32, key: &[u8]) -> BurrowResult<()> {
        self.ensure_space(format::del_record_len(key.len()))?;
        let state = self.version.dbi_mut(dbi)?;
        if state.entries.remove(key).is_none() {
            return Err(BurrowError::NotFound);
        }
        format::push_del(&mut self.batch, dbi, key);
        Ok(())
    }

    /// Read through the working version: sees this transaction's own writes.
    pub fn get(&self, dbi: u32, key: &[u8]) -> BurrowResult<Option<&[u8]>> {
        Ok(self.version.dbi(dbi)?.entries.get(key).map(|v| v.as_slice()))
    }

    /// Commit: append the batch plus a Commit marker, flush, publish.
    pub fn commit(mut self) -> BurrowResult<()> {
        format::push_commit(&mut self.batch, self.txn_id);
        let batch = std::mem::take(&mut self.batch);
        let version = std::mem::take(&mut self.version);
        self.engine.publish(batch, version, self.txn_id)
        // the gate releases when self drops
    }

    /// Discard every buffered change.
    pub fn abort(self) {}
}
