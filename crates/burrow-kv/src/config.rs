//! Adapter configuration.
//!
//! The six knobs the environment exposes, with the stock defaults. The
//! translation to engine options (map size in bytes, LMDB-style open flags,
//! file mode) lives here so the rest of the crate never thinks about it.

use burrow_core::{EnvFlags, StoreOptions};

/// Largest accepted encoded key, in bytes.
pub const MAX_KEY_SIZE: usize = 511;

/// Initial capacity of value scratch buffers, in bytes.
pub const DEFAULT_VAL_SIZE: usize = 16 * 1024;

/// Read-transaction pool cap. Deliberately below `MAX_READERS` so ad-hoc
/// engine readers still find slots.
pub const USE_READERS: usize = 10;

/// Engine reader slot cap.
pub const MAX_READERS: u32 = 126;

/// Engine named-DBI cap.
pub const MAX_DBS: u32 = 128;

/// Initial memory map size, in megabytes.
pub const INIT_DB_SIZE_MB: u64 = 100;

/// Environment configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest accepted encoded key.
    pub max_key_size: usize,
    /// Initial value scratch buffer capacity.
    pub default_val_size: usize,
    /// Read-transaction pool cap.
    pub use_readers: usize,
    /// Engine reader slot cap.
    pub max_readers: u32,
    /// Engine named-DBI cap.
    pub max_dbs: u32,
    /// Initial map size in megabytes.
    pub init_db_size_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_size: MAX_KEY_SIZE,
            default_val_size: DEFAULT_VAL_SIZE,
            use_readers: USE_READERS,
            max_readers: MAX_READERS,
            max_dbs: MAX_DBS,
            init_db_size_mb: INIT_DB_SIZE_MB,
        }
    }
}

impl Config {
    /// Validate all configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_size == 0 || self.max_key_size > 4096 {
            return Err("max_key_size must be in [1, 4096]".into());
        }
        if self.default_val_size < 64 {
            return Err("default_val_size must be >= 64".into());
        }
        if self.use_readers == 0 {
            return Err("use_readers must be > 0".into());
        }
        if self.use_readers > self.max_readers as usize {
            return Err("use_readers must not exceed max_readers".into());
        }
        if self.max_dbs == 0 {
            return Err("max_dbs must be > 0".into());
        }
        if self.init_db_size_mb == 0 {
            return Err("init_db_size_mb must be > 0".into());
        }
        Ok(())
    }

    /// Engine open options for this configuration.
    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            map_size: self.init_db_size_mb * 1024 * 1024,
            max_readers: self.max_readers,
            max_dbs: self.max_dbs,
            flags: EnvFlags::NO_READAHEAD | EnvFlags::MAP_ASYNC | EnvFlags::WRITE_MAP,
            mode: 0o664,
        }
    }
}
