//! The environment: top-level coordinator.
//!
//! An `Env` owns the engine handle, the DBI registry, and the RTX pool, and
//! exposes the whole adapter surface: DBI lifecycle, the batched write
//! pipeline, and the pooled read operations.
//!
//! **Write pipeline**: a batch is one engine write transaction — ops apply
//! in input order, and either the whole batch commits or none of it does.
//! When the engine reports a full map, the environment grows the map to ten
//! times its current size and replays the entire batch; the loop is
//! unbounded and terminates when the working set fits.
//!
//! **Read pattern**: every read op checks the closed flag, resolves the DBI,
//! leases an RTX, and delegates to a scan helper. The lease is an RAII
//! guard, so the RTX is reset back into the pool on every path, error or
//! not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use burrow_core::{BurrowEngine, BurrowError, StoreInfo, WriteFlags};

use crate::codec::{Value, ValueKind};
use crate::config::Config;
use crate::dbi::Dbi;
use crate::error::{KvError, KvResult};
use crate::range::KeyRange;
use crate::rtx::{Rtx, RtxPool};
use crate::scan;

/// One operation of a write batch.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert or update `key` in the named DBI.
    Put { dbi: String, key: Value, value: Value, flags: WriteFlags },
    /// Delete `key` from the named DBI.
    Del { dbi: String, key: Value },
}

impl Op {
    /// A plain put.
    pub fn put(dbi: impl Into<String>, key: Value, value: Value) -> Self {
        Op::Put { dbi: dbi.into(), key, value, flags: WriteFlags::empty() }
    }

    /// A put with flags (no-overwrite, append).
    pub fn put_flags(dbi: impl Into<String>, key: Value, value: Value, flags: WriteFlags) -> Self {
        Op::Put { dbi: dbi.into(), key, value, flags }
    }

    /// A delete.
    pub fn del(dbi: impl Into<String>, key: Value) -> Self {
        Op::Del { dbi: dbi.into(), key }
    }
}

/// A BurrowDB environment rooted at a directory.
///
/// Thread-safe: share it behind an `Arc` and call from as many threads as
/// needed. Reads run concurrently through the RTX pool; writes serialize
/// through the engine's single-writer gate.
pub struct Env {
    engine: Arc<BurrowEngine>,
    dir: PathBuf,
    dbis: RwLock<HashMap<String, Arc<Dbi>>>,
    pool: RtxPool,
    cfg: Config,
    closed: AtomicBool,
}

impl Env {
    /// Open an environment with the stock configuration.
    pub fn open<P: AsRef<Path>>(dir: P) -> KvResult<Env> {
        Self::open_with(dir, Config::default())
    }

    /// Open an environment with an explicit configuration.
    pub fn open_with<P: AsRef<Path>>(dir: P, cfg: Config) -> KvResult<Env> {
        cfg.validate().map_err(KvError::Config)?;
        let dir = dir.as_ref().to_path_buf();
        let engine = BurrowEngine::open(&dir, cfg.store_options())
            .map_err(|e| KvError::native("open", e))?;
        let pool = RtxPool::new(Arc::clone(&engine), &cfg);
        Ok(Env {
            engine,
            dir,
            dbis: RwLock::new(HashMap::new()),
            pool,
            cfg,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> KvResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(KvError::NotOpen)
        } else {
            Ok(())
        }
    }

    /// The environment directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Engine summary: map size, last txn id, reader occupancy.
    pub fn info(&self) -> KvResult<StoreInfo> {
        self.check_open()?;
        Ok(self.engine.info())
    }

    /// The RTX pool, exposed for observability.
    pub fn rtx_pool(&self) -> &RtxPool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // DBI lifecycle
    // -----------------------------------------------------------------------

    /// Open (or look up) a named DBI and register its handle.
    pub fn open_dbi(&self, name: &str) -> KvResult<Arc<Dbi>> {
        self.check_open()?;
        if let Some(dbi) = self.dbis.read().get(name) {
            return Ok(Arc::clone(dbi));
        }
        let id = self
            .engine
            .open_dbi(name)
            .map_err(|e| KvError::native("open_dbi", e))?;
        let mut registry = self.dbis.write();
        // a same-name race resolves to one engine id; the registry follows
        let dbi = registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Dbi::new(id, name, &self.cfg)));
        Ok(Arc::clone(dbi))
    }

    /// Look up a registered DBI handle.
    pub fn get_dbi(&self, name: &str) -> KvResult<Arc<Dbi>> {
        self.check_open()?;
        self.dbis
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KvError::UnknownDbi(name.to_string()))
    }

    /// Drop a DBI: clear its entries, retire its name, remove the handle.
    pub fn drop_dbi(&self, name: &str) -> KvResult<()> {
        self.check_open()?;
        let dbi = self.get_dbi(name)?;
        self.engine
            .drop_dbi(dbi.id, true)
            .map_err(|e| KvError::native("drop_dbi", e))?;
        self.dbis.write().remove(name);
        Ok(())
    }

    /// Clear a DBI's entries; the handle and name survive.
    pub fn clear_dbi(&self, name: &str) -> KvResult<()> {
        self.check_open()?;
        let dbi = self.get_dbi(name)?;
        self.engine
            .drop_dbi(dbi.id, false)
            .map_err(|e| KvError::native("clear_dbi", e))
    }

    /// Number of entries in a DBI.
    pub fn entries(&self, name: &str) -> KvResult<u64> {
        self.check_open()?;
        let dbi = self.get_dbi(name)?;
        self.engine
            .entries(dbi.id)
            .map_err(|e| KvError::native("entries", e))
    }

    // -----------------------------------------------------------------------
    // Write pipeline
    // -----------------------------------------------------------------------

    /// Apply a batch of operations as one atomic write transaction.
    ///
    /// A full map is recovered automatically: grow ten-fold, replay the
    /// batch. Anything else aborts the transaction and surfaces with the
    /// batch attached.
    pub fn transact(&self, ops: &[Op]) -> KvResult<()> {
        self.check_open()?;
        loop {
            match self.transact_once(ops) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_map_full() => {
                    let map_size = self.engine.info().map_size;
                    let new_size = map_size * 10;
                    tracing::warn!(map_size, new_size, "map full, growing and retrying batch");
                    match self.engine.set_map_size(new_size) {
                        Ok(()) => {}
                        // another writer grew the map past our target while
                        // we computed it; the retry will see the bigger map
                        Err(BurrowError::InvalidMapSize { .. }) => {}
                        Err(e) => return Err(KvError::native("set_map_size", e)),
                    }
                }
                Err(e) => {
                    return Err(KvError::Transact {
                        batch: format!("{:?}", ops),
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    fn transact_once(&self, ops: &[Op]) -> KvResult<()> {
        let mut txn = self
            .engine
            .begin_rw()
            .map_err(|e| KvError::native("begin_rw", e))?;
        for op in ops {
            match op {
                Op::Put { dbi, key, value, flags } => {
                    let dbi = self.get_dbi(dbi)?;
                    dbi.put(&mut txn, key, value, *flags)?;
                }
                Op::Del { dbi, key } => {
                    let dbi = self.get_dbi(dbi)?;
                    dbi.del(&mut txn, key)?;
                }
            }
        }
        txn.commit().map_err(|e| KvError::native("commit", e))
    }

    // -----------------------------------------------------------------------
    // Read operations
    // -----------------------------------------------------------------------

    fn with_rtx<T>(
        &self,
        name: &str,
        body: impl FnOnce(&Dbi, &mut Rtx) -> KvResult<T>,
    ) -> KvResult<T> {
        self.check_open()?;
        let dbi = self.get_dbi(name)?;
        let mut rtx = self.pool.get_rtx()?;
        // the lease guard resets the RTX back into the pool on every path
        body(&dbi, &mut rtx)
    }

    /// Point read: the value stored under `key`, or `None`.
    pub fn get_value(&self, dbi: &str, key: &Value, vt: ValueKind) -> KvResult<Option<Value>> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_value(d, rtx, key, vt))
    }

    /// First entry of a range, or `None` when the range is empty.
    pub fn get_first(
        &self,
        dbi: &str,
        range: &KeyRange<'_>,
        kt: ValueKind,
        vt: ValueKind,
    ) -> KvResult<Option<(Value, Value)>> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_first(d, rtx, range, kt, vt))
    }

    /// All entries of a range, in range order.
    pub fn get_range(
        &self,
        dbi: &str,
        range: &KeyRange<'_>,
        kt: ValueKind,
        vt: ValueKind,
    ) -> KvResult<Vec<(Value, Value)>> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_range(d, rtx, range, kt, vt))
    }

    /// Number of entries in a range, without decoding any of them.
    pub fn range_count(&self, dbi: &str, range: &KeyRange<'_>) -> KvResult<u64> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_range_count(d, rtx, range))
    }

    /// First entry of a range satisfying the predicate. The predicate sees
    /// raw encoded views.
    pub fn get_some(
        &self,
        dbi: &str,
        range: &KeyRange<'_>,
        kt: ValueKind,
        vt: ValueKind,
        mut pred: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> KvResult<Option<(Value, Value)>> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_some(d, rtx, &mut pred, range, kt, vt))
    }

    /// All entries of a range satisfying the predicate.
    pub fn range_filter(
        &self,
        dbi: &str,
        range: &KeyRange<'_>,
        kt: ValueKind,
        vt: ValueKind,
        mut pred: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> KvResult<Vec<(Value, Value)>> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_range_filtered(d, rtx, &mut pred, range, kt, vt))
    }

    /// Number of entries in a range satisfying the predicate.
    pub fn range_filter_count(
        &self,
        dbi: &str,
        range: &KeyRange<'_>,
        mut pred: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> KvResult<u64> {
        self.with_rtx(dbi, |d, rtx| scan::fetch_range_filtered_count(d, rtx, &mut pred, range))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Close the environment: the pool, then the DBI registry, then the
    /// engine. Idempotent.
    pub fn close(&self) -> KvResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool.close();
        self.dbis.write().clear();
        self.engine.close().map_err(|e| KvError::native("close", e))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
