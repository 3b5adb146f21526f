//! Core storage engine — the heart of BurrowDB.
//!
//! BurrowEngine combines an in-RAM ordered working set (one `BTreeMap` per
//! DBI) with a crash-safe, memory-mapped commit log.
//!
//! **Read path**: read transactions pin the current committed version — an
//! immutable, `Arc`-shared value — and never block writers.
//! **Write path**: one writer at a time (gate), copy-on-write against the
//! current version, commit = append records + flush map + publish version.
//! **Recovery**: on open the log is replayed; only record batches covered by
//! a trailing Commit marker are applied, so a torn tail is invisible.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::{EnvFlags, StoreOptions};
use crate::error::{BurrowError, BurrowResult};
use crate::format::{self, Record, RecordReader, FILE_HEADER_SIZE};
use crate::mapfile::MapFile;
use crate::readers::ReaderTable;
use crate::txn::{RoTxn, RwTxn, WriteGuard};

/// Name of the data file inside an environment directory.
pub const DATA_FILE: &str = "data.bdb";

/// A point-in-time summary of the engine.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// Current size of the memory map in bytes.
    pub map_size: u64,
    /// Id of the most recently committed write transaction.
    pub last_txn_id: u64,
    /// Configured reader slot count.
    pub max_readers: u32,
    /// Reader slots currently taken.
    pub num_readers: u32,
}

/// One named sub-database: its name and ordered entries.
#[derive(Clone)]
pub(crate) struct DbiState {
    pub(crate) name: String,
    pub(crate) entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl DbiState {
    fn new(name: String) -> Self {
        Self { name, entries: BTreeMap::new() }
    }
}

/// One committed version of the store: DBI slots plus the name index.
///
/// Versions are immutable once published; writers clone (the clone shares
/// the per-DBI `Arc`s) and copy-on-write only the DBIs they touch.
#[derive(Clone, Default)]
pub(crate) struct Version {
    pub(crate) dbis: Vec<Option<Arc<DbiState>>>,
    pub(crate) names: HashMap<String, u32>,
}

impl Version {
    pub(crate) fn dbi(&self, dbi: u32) -> BurrowResult<&Arc<DbiState>> {
        self.dbis
            .get(dbi as usize)
            .and_then(|s| s.as_ref())
            .ok_or(BurrowError::BadDbi { dbi })
    }

    pub(crate) fn dbi_mut(&mut self, dbi: u32) -> BurrowResult<&mut DbiState> {
        self.dbis
            .get_mut(dbi as usize)
            .and_then(|s| s.as_mut())
            .map(Arc::make_mut)
            .ok_or(BurrowError::BadDbi { dbi })
    }

    fn apply(&mut self, op: ReplayOp) {
        match op {
            ReplayOp::OpenDbi { dbi, name } => {
                let idx = dbi as usize;
                if self.dbis.len() <= idx {
                    self.dbis.resize_with(idx + 1, || None);
                }
                self.names.insert(name.clone(), dbi);
                self.dbis[idx] = Some(Arc::new(DbiState::new(name)));
            }
            ReplayOp::Put { dbi, key, value } => match self.dbi_mut(dbi) {
                Ok(state) => {
                    state.entries.insert(key, value);
                }
                Err(_) => tracing::warn!(dbi, "replayed put into unopened DBI, skipping"),
            },
            ReplayOp::Del { dbi, key } => match self.dbi_mut(dbi) {
                Ok(state) => {
                    state.entries.remove(&key);
                }
                Err(_) => tracing::warn!(dbi, "replayed del from unopened DBI, skipping"),
            },
            ReplayOp::DropDbi { dbi, delete } => {
                if delete {
                    if let Some(Some(state)) = self.dbis.get(dbi as usize) {
                        self.names.remove(&state.name);
                    }
                    if let Some(slot) = self.dbis.get_mut(dbi as usize) {
                        *slot = None;
                    }
                } else if let Ok(state) = self.dbi_mut(dbi) {
                    state.entries.clear();
                }
            }
        }
    }
}

/// Owned copy of a log record, staged between Commit markers during replay.
enum ReplayOp {
    Put { dbi: u32, key: Vec<u8>, value: Vec<u8> },
    Del { dbi: u32, key: Vec<u8> },
    OpenDbi { dbi: u32, name: String },
    DropDbi { dbi: u32, delete: bool },
}

/// Writer exclusion: one write transaction (or management operation) at a
/// time, waiters parked on the condvar.
pub(crate) struct WriteGate {
    busy: Mutex<bool>,
    cond: Condvar,
}

impl WriteGate {
    fn new() -> Self {
        Self { busy: Mutex::new(false), cond: Condvar::new() }
    }

    pub(crate) fn acquire(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.cond.wait(&mut busy);
        }
        *busy = true;
    }

    pub(crate) fn release(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.cond.notify_one();
    }
}

/// Scoped gate hold for engine-internal management operations.
struct GateHold<'a> {
    gate: &'a WriteGate,
}

impl<'a> GateHold<'a> {
    fn acquire(gate: &'a WriteGate) -> Self {
        gate.acquire();
        Self { gate }
    }
}

impl Drop for GateHold<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Process-global set of open environment directories. Two live engines on
/// one directory would share a reader table they cannot coordinate, so the
/// second open fails with BadReaderLock.
fn open_dirs() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN_DIRS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN_DIRS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Ordered, memory-mapped key-value engine.
///
/// All public methods take `&self`; the engine is shared behind an `Arc`
/// across however many threads need it.
pub struct BurrowEngine {
    /// Canonical environment directory.
    path: PathBuf,
    /// The memory-mapped commit log.
    log: Mutex<MapFile>,
    /// The current committed version, swapped atomically on commit.
    current: RwLock<Arc<Version>>,
    /// Reader slot table.
    readers: Mutex<ReaderTable>,
    /// Writer exclusion gate.
    write_gate: WriteGate,
    /// Id of the last committed write transaction.
    last_txn_id: AtomicU64,
    /// Open-time options.
    opts: StoreOptions,
    /// Closed flag; set once, never cleared.
    closed: AtomicBool,
}

impl BurrowEngine {
    /// Open or create an environment at the given directory.
    pub fn open<P: AsRef<Path>>(dir: P, opts: StoreOptions) -> BurrowResult<Arc<Self>> {
        let dir = dir.as_ref();
        opts.validate().map_err(|reason| BurrowError::Io {
            path: Some(dir.to_path_buf()),
            kind: io::ErrorKind::InvalidInput,
            message: reason,
        })?;

        std::fs::create_dir_all(dir)
            .map_err(|e| BurrowError::io(dir, e, "failed to create environment directory"))?;
        let canon = dir
            .canonicalize()
            .map_err(|e| BurrowError::io(dir, e, "failed to resolve environment directory"))?;

        {
            let mut dirs = open_dirs().lock();
            if !dirs.insert(canon.clone()) {
                return Err(BurrowError::BadReaderLock { path: canon });
            }
        }

        match Self::open_inner(&canon, opts) {
            Ok(engine) => Ok(engine),
            Err(e) => {
                open_dirs().lock().remove(&canon);
                Err(e)
            }
        }
    }

    fn open_inner(canon: &Path, opts: StoreOptions) -> BurrowResult<Arc<Self>> {
        let mut log = MapFile::open(&canon.join(DATA_FILE), opts.map_size as usize, opts.mode)?;

        // Replay: stage records, apply a stage per Commit marker. The append
        // position resumes after the last committed record.
        let mut version = Version::default();
        let mut last_txn_id = 0u64;
        let mut durable_pos = FILE_HEADER_SIZE;
        {
            let mut staged: Vec<ReplayOp> = Vec::new();
            let mut reader = RecordReader::new(log.bytes(), FILE_HEADER_SIZE);
            while let Some(record) = reader.next()? {
                match record {
                    Record::Put { dbi, key, value } => staged.push(ReplayOp::Put {
                        dbi,
                        key: key.to_vec(),
                        value: value.to_vec(),
                    }),
                    Record::Del { dbi, key } => {
                        staged.push(ReplayOp::Del { dbi, key: key.to_vec() })
                    }
                    Record::OpenDbi { dbi, name } => staged.push(ReplayOp::OpenDbi {
                        dbi,
                        name: String::from_utf8_lossy(name).into_owned(),
                    }),
                    Record::DropDbi { dbi, delete } => {
                        staged.push(ReplayOp::DropDbi { dbi, delete })
                    }
                    Record::Commit { txn_id } => {
                        for op in staged.drain(..) {
                            version.apply(op);
                        }
                        last_txn_id = txn_id;
                        durable_pos = reader.pos();
                    }
                }
            }
            if !staged.is_empty() {
                tracing::warn!(
                    records = staged.len(),
                    "discarding uncommitted record batch at log tail"
                );
            }
        }
        log.set_write_pos(durable_pos);

        if last_txn_id > 0 {
            let entries: usize = version
                .dbis
                .iter()
                .flatten()
                .map(|s| s.entries.len())
                .sum();
            tracing::info!(
                dbis = version.names.len(),
                entries,
                last_txn_id,
                "recovered committed state"
            );
        }

        let max_readers = opts.max_readers;
        Ok(Arc::new(Self {
            path: canon.to_path_buf(),
            log: Mutex::new(log),
            current: RwLock::new(Arc::new(version)),
            readers: Mutex::new(ReaderTable::new(max_readers)),
            write_gate: WriteGate::new(),
            last_txn_id: AtomicU64::new(last_txn_id),
            opts,
            closed: AtomicBool::new(false),
        }))
    }

    /// Flush and close the engine. Idempotent.
    pub fn close(&self) -> BurrowResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.log.lock().flush(false)?;
        open_dirs().lock().remove(&self.path);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> BurrowResult<()> {
        if self.is_closed() {
            Err(BurrowError::Closed)
        } else {
            Ok(())
        }
    }

    /// Environment directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Engine summary: map size, last txn id, reader occupancy.
    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            map_size: self.log.lock().map_size() as u64,
            last_txn_id: self.last_txn_id.load(Ordering::SeqCst),
            max_readers: self.opts.max_readers,
            num_readers: self.readers.lock().in_use(),
        }
    }

    /// Grow the memory map. Waits for any in-flight write transaction.
    pub fn set_map_size(&self, new_size: u64) -> BurrowResult<()> {
        self.check_open()?;
        let _gate = GateHold::acquire(&self.write_gate);
        self.log.lock().grow(new_size as usize)?;
        tracing::info!(new_size, "grew memory map");
        Ok(())
    }

    /// The native key comparator: unsigned lexicographic byte order.
    pub fn cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    /// Open (or look up) a named DBI. The creation is committed to the log,
    /// so DBIs survive reopen. Concurrent opens of the same name resolve to
    /// one id under the write gate.
    pub fn open_dbi(&self, name: &str) -> BurrowResult<u32> {
        self.check_open()?;
        if let Some(&id) = self.current_version().names.get(name) {
            return Ok(id);
        }

        let _gate = GateHold::acquire(&self.write_gate);
        // somebody may have created it while we waited
        if let Some(&id) = self.current_version().names.get(name) {
            return Ok(id);
        }

        let mut version = (*self.current_version()).clone();
        if version.names.len() >= self.opts.max_dbs as usize {
            return Err(BurrowError::DbsFull { max_dbs: self.opts.max_dbs });
        }
        let id = version
            .dbis
            .iter()
            .position(|s| s.is_none())
            .unwrap_or(version.dbis.len()) as u32;
        if id as usize == version.dbis.len() {
            version.dbis.push(None);
        }
        version.dbis[id as usize] = Some(Arc::new(DbiState::new(name.to_string())));
        version.names.insert(name.to_string(), id);

        let txn_id = self.last_txn_id.load(Ordering::SeqCst) + 1;
        let mut batch = Vec::new();
        format::push_open_dbi(&mut batch, id, name);
        format::push_commit(&mut batch, txn_id);
        self.publish(batch, version, txn_id)?;
        tracing::debug!(name, id, "opened DBI");
        Ok(id)
    }

    /// Clear a DBI (`delete = false`) or clear it and retire the name and
    /// slot (`delete = true`).
    pub fn drop_dbi(&self, dbi: u32, delete: bool) -> BurrowResult<()> {
        self.check_open()?;
        let _gate = GateHold::acquire(&self.write_gate);

        let mut version = (*self.current_version()).clone();
        if delete {
            let name = version.dbi(dbi)?.name.clone();
            version.names.remove(&name);
            version.dbis[dbi as usize] = None;
        } else {
            version.dbi_mut(dbi)?.entries.clear();
        }

        let txn_id = self.last_txn_id.load(Ordering::SeqCst) + 1;
        let mut batch = Vec::new();
        format::push_drop_dbi(&mut batch, dbi, delete);
        format::push_commit(&mut batch, txn_id);
        self.publish(batch, version, txn_id)
    }

    /// Number of entries in a DBI, as of the current committed version.
    pub fn entries(&self, dbi: u32) -> BurrowResult<u64> {
        Ok(self.current_version().dbi(dbi)?.entries.len() as u64)
    }

    /// Begin a read-only transaction pinned to the current version.
    pub fn begin_ro(self: &Arc<Self>) -> BurrowResult<RoTxn> {
        self.check_open()?;
        let slot = self
            .readers
            .lock()
            .acquire()
            .ok_or(BurrowError::ReadersFull { max_readers: self.opts.max_readers })?;
        Ok(RoTxn::new(Arc::clone(self), slot))
    }

    /// Begin the (single) write transaction. Blocks while another writer or
    /// management operation holds the gate.
    pub fn begin_rw(self: &Arc<Self>) -> BurrowResult<RwTxn> {
        self.check_open()?;
        self.write_gate.acquire();
        let gate = WriteGuard::new(Arc::clone(self));
        if self.is_closed() {
            return Err(BurrowError::Closed);
        }
        let version = (*self.current_version()).clone();
        let (base_pos, map_size) = {
            let log = self.log.lock();
            (log.write_pos(), log.map_size())
        };
        let txn_id = self.last_txn_id.load(Ordering::SeqCst) + 1;
        Ok(RwTxn::new(Arc::clone(self), gate, version, base_pos, map_size, txn_id))
    }

    pub(crate) fn current_version(&self) -> Arc<Version> {
        Arc::clone(&self.current.read())
    }

    /// Append a committed batch to the log, flush per MAP_ASYNC, and publish
    /// the new version. Caller holds the write gate.
    pub(crate) fn publish(&self, batch: Vec<u8>, version: Version, txn_id: u64) -> BurrowResult<()> {
        {
            let mut log = self.log.lock();
            log.append(&batch)?;
            log.flush(self.opts.flags.contains(EnvFlags::MAP_ASYNC))?;
        }
        *self.current.write() = Arc::new(version);
        self.last_txn_id.store(txn_id, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn release_reader(&self, slot: usize) {
        self.readers.lock().release(slot);
    }

    pub(crate) fn release_writer(&self) {
        self.write_gate.release();
    }
}

impl Drop for BurrowEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
