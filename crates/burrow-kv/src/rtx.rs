//! The read-transaction pool.
//!
//! Creating an engine read transaction takes a reader slot and a version
//! pin; doing that per point-read is wasteful. The pool keeps up to
//! `use_readers` transactions alive and recycles them: a lease renews the
//! transaction (fresh snapshot), the release resets it (no snapshot, slot
//! kept).
//!
//! Probing starts at a slot derived from the calling thread's identity, so
//! distinct threads gravitate to distinct slots without any guarantee of
//! affinity. When every slot is leased and the pool is at its cap, callers
//! park on a condvar that every release signals — saturation blocks, it
//! does not spin.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use burrow_core::{BurrowEngine, RoTxn};

use crate::buffer::BufferCell;
use crate::config::Config;
use crate::error::{KvError, KvResult};

/// Lifecycle of a pooled read transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RtxState {
    /// Created, never leased.
    Fresh,
    /// Leased to exactly one caller.
    Active,
    /// Back in the pool, snapshot released.
    Reset,
}

/// A pooled read transaction: the engine transaction plus the scratch
/// buffers every scan through it reuses.
pub struct Rtx {
    pub(crate) txn: RoTxn,
    /// Key scratch for point reads. Fixed size, never grows.
    pub(crate) kb: BufferCell,
    /// Value materialization buffer. May be replaced by a larger cell while
    /// this RTX is leased; it is private to the lease holder.
    pub(crate) vb: BufferCell,
    /// Range start key scratch.
    pub(crate) start_kb: BufferCell,
    /// Range stop key scratch.
    pub(crate) stop_kb: BufferCell,
    pub(crate) state: RtxState,
}

impl Rtx {
    fn new(txn: RoTxn, max_key_size: usize, default_val_size: usize) -> Self {
        Self {
            txn,
            kb: BufferCell::new(max_key_size),
            vb: BufferCell::new(default_val_size),
            start_kb: BufferCell::new(max_key_size),
            stop_kb: BufferCell::new(max_key_size),
            state: RtxState::Fresh,
        }
    }
}

/// Bounded, thread-affine pool of reusable read transactions.
pub struct RtxPool {
    engine: Arc<BurrowEngine>,
    /// Allocated slots. `None` means the slot's RTX is currently leased.
    slots: Mutex<Vec<Option<Box<Rtx>>>>,
    /// Signalled on every release.
    released: Condvar,
    cap: usize,
    max_key_size: usize,
    default_val_size: usize,
}

impl RtxPool {
    pub(crate) fn new(engine: Arc<BurrowEngine>, cfg: &Config) -> Self {
        Self {
            engine,
            slots: Mutex::new(Vec::new()),
            released: Condvar::new(),
            cap: cfg.use_readers,
            max_key_size: cfg.max_key_size,
            default_val_size: cfg.default_val_size,
        }
    }

    /// Slots allocated so far. Never exceeds `use_readers`.
    pub fn allocated(&self) -> usize {
        self.slots.lock().len()
    }

    /// Lease an Active RTX with a fresh snapshot. Blocks when the pool is
    /// saturated. The lease resets itself back into the pool on drop.
    pub fn get_rtx(&self) -> KvResult<PooledRtx<'_>> {
        let mut slots = self.slots.lock();

        if slots.is_empty() {
            let rtx = self.new_rtx()?;
            slots.push(None);
            return Ok(PooledRtx { pool: self, index: 0, rtx: Some(rtx) });
        }

        loop {
            let len = slots.len();
            let start = thread_slot(len);
            for probe in 0..len {
                let index = (start + probe) % len;
                if let Some(mut rtx) = slots[index].take() {
                    match rtx.txn.renew() {
                        Ok(()) => {
                            rtx.state = RtxState::Active;
                            return Ok(PooledRtx { pool: self, index, rtx: Some(rtx) });
                        }
                        Err(e) => {
                            slots[index] = Some(rtx);
                            return Err(KvError::native("renew", e));
                        }
                    }
                }
            }

            if len < self.cap {
                let rtx = self.new_rtx()?;
                slots.push(None);
                tracing::debug!(allocated = len + 1, cap = self.cap, "grew rtx pool");
                return Ok(PooledRtx { pool: self, index: len, rtx: Some(rtx) });
            }

            // cap reached and everything leased: park until a release
            self.released.wait(&mut slots);
        }
    }

    fn new_rtx(&self) -> KvResult<Box<Rtx>> {
        let mut txn = self
            .engine
            .begin_ro()
            .map_err(|e| KvError::native("begin_ro", e))?;
        // fresh transactions go through the same reset/renew cycle pooled
        // ones do, so the snapshot is taken at lease time, not create time
        txn.reset();
        txn.renew().map_err(|e| KvError::native("renew", e))?;
        let mut rtx = Box::new(Rtx::new(txn, self.max_key_size, self.default_val_size));
        rtx.state = RtxState::Active;
        Ok(rtx)
    }

    fn put_back(&self, index: usize, mut rtx: Box<Rtx>) {
        rtx.txn.reset();
        rtx.state = RtxState::Reset;
        let mut slots = self.slots.lock();
        // a closed pool has no slots left; let the transaction die here
        if index < slots.len() {
            slots[index] = Some(rtx);
        }
        drop(slots);
        self.released.notify_one();
    }

    /// Close every pooled transaction and reset the count. Leased RTXs die
    /// on release instead of rejoining.
    pub fn close(&self) {
        self.slots.lock().clear();
        self.released.notify_all();
    }
}

/// Starting probe index for the current thread.
fn thread_slot(len: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    (hasher.finish() as usize) % len
}

/// An RTX lease. Dereferences to the RTX; dropping it resets the
/// transaction back into the pool, whatever path the caller took.
pub struct PooledRtx<'p> {
    pool: &'p RtxPool,
    index: usize,
    rtx: Option<Box<Rtx>>,
}

impl Deref for PooledRtx<'_> {
    type Target = Rtx;

    fn deref(&self) -> &Rtx {
        self.rtx.as_deref().expect("leased rtx present until drop")
    }
}

impl DerefMut for PooledRtx<'_> {
    fn deref_mut(&mut self) -> &mut Rtx {
        self.rtx.as_deref_mut().expect("leased rtx present until drop")
    }
}

impl Drop for PooledRtx<'_> {
    fn drop(&mut self) {
        if let Some(rtx) = self.rtx.take() {
            self.pool.put_back(self.index, rtx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::{StoreOptions, WriteFlags};
    use tempfile::TempDir;

    fn test_pool(use_readers: usize) -> (RtxPool, Arc<BurrowEngine>, TempDir) {
        let dir = TempDir::new().unwrap();
        let opts = StoreOptions { map_size: 256 * 1024, ..Default::default() };
        let engine = BurrowEngine::open(dir.path(), opts).unwrap();
        let cfg = Config { use_readers, ..Default::default() };
        let pool = RtxPool::new(Arc::clone(&engine), &cfg);
        (pool, engine, dir)
    }

    #[test]
    fn test_lease_reuses_slot() {
        let (pool, _engine, _dir) = test_pool(4);
        {
            let rtx = pool.get_rtx().unwrap();
            assert_eq!(rtx.state, RtxState::Active);
        }
        assert_eq!(pool.allocated(), 1);
        // the same thread gets the same slot back
        let _rtx = pool.get_rtx().unwrap();
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_concurrent_leases_grow_pool_under_cap() {
        let (pool, _engine, _dir) = test_pool(4);
        let a = pool.get_rtx().unwrap();
        let b = pool.get_rtx().unwrap();
        let c = pool.get_rtx().unwrap();
        assert_eq!(pool.allocated(), 3);
        drop((a, b, c));
        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn test_saturated_pool_blocks_until_release() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (pool, engine, _dir) = test_pool(1);
        let pool = Arc::new(pool);

        let first = pool.get_rtx().unwrap();
        let (tx, rx) = mpsc::channel();
        let handle = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let rtx = pool.get_rtx().unwrap();
                tx.send(()).unwrap();
                drop(rtx);
            })
        };

        // the second lease cannot proceed while the first is held
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(first);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(pool.allocated(), 1);
        drop(engine);
    }

    #[test]
    fn test_lease_renews_snapshot() {
        let (pool, engine, _dir) = test_pool(2);
        let dbi = engine.open_dbi("a").unwrap();

        {
            let rtx = pool.get_rtx().unwrap();
            assert_eq!(rtx.txn.get(dbi, b"k").unwrap(), None);
        }

        let mut txn = engine.begin_rw().unwrap();
        txn.put(dbi, b"k", b"v", WriteFlags::empty()).unwrap();
        txn.commit().unwrap();

        // the recycled transaction sees the commit because the lease renewed
        let rtx = pool.get_rtx().unwrap();
        assert_eq!(rtx.txn.get(dbi, b"k").unwrap(), Some(b"v".as_slice()));
    }

    #[test]
    fn test_close_drops_pooled_transactions() {
        let (pool, engine, _dir) = test_pool(4);
        {
            let _a = pool.get_rtx().unwrap();
            let _b = pool.get_rtx().unwrap();
        }
        assert_eq!(engine.info().num_readers, 2);
        pool.close();
        assert_eq!(pool.allocated(), 0);
        assert_eq!(engine.info().num_readers, 0);
    }
}
