//! Engine configuration: open-time options and flag sets.

use bitflags::bitflags;

bitflags! {
    /// Environment open flags.
    ///
    /// These mirror the tuning knobs of memory-mapped stores: readahead
    /// suppression for random access workloads, asynchronous map flushes,
    /// and writes going through the map itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvFlags: u32 {
        /// Advise the OS not to read ahead; point lookups dominate.
        const NO_READAHEAD = 0b0001;
        /// Flush the map asynchronously on commit.
        const MAP_ASYNC = 0b0010;
        /// Write committed records through the memory map.
        const WRITE_MAP = 0b0100;
    }
}

bitflags! {
    /// Per-put behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriteFlags: u32 {
        /// Fail with KeyExist instead of overwriting.
        const NO_OVERWRITE = 0b01;
        /// Hint that keys arrive in ascending order.
        const APPEND = 0b10;
    }
}

/// Minimum accepted map size. Below this there is no room for the file
/// header plus a useful amount of data.
pub const MIN_MAP_SIZE: u64 = 64 * 1024;

/// Engine open-time options.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Size of the memory-mapped data file in bytes. Growable at runtime
    /// via `set_map_size`.
    pub map_size: u64,
    /// Maximum number of simultaneously live read transactions.
    pub max_readers: u32,
    /// Maximum number of named DBIs.
    pub max_dbs: u32,
    /// Environment flags.
    pub flags: EnvFlags,
    /// Unix file mode for the data file.
    pub mode: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            map_size: 100 * 1024 * 1024,
            max_readers: 126,
            max_dbs: 128,
            flags: EnvFlags::NO_READAHEAD | EnvFlags::MAP_ASYNC | EnvFlags::WRITE_MAP,
            mode: 0o664,
        }
    }
}

impl StoreOptions {
    /// Validate all option values.
    pub fn validate(&self) -> Result<(), String> {
        if self.map_size < MIN_MAP_SIZE {
            return Err(format!("map_size must be >= {} bytes", MIN_MAP_SIZE));
        }
        if self.max_readers == 0 || self.max_readers > 4096 {
            return Err("max_readers must be in [1, 4096]".into());
        }
        if self.max_dbs == 0 || self.max_dbs > 65_535 {
            return Err("max_dbs must be in [1, 65535]".into());
        }
        Ok(())
    }
}
