//! The memory-mapped data file.
//!
//! One file per environment (`data.bdb`), sized to the configured map size
//! and grown in place on demand: flush, extend, remap. Committed records are
//! written through the map and flushed at commit time; the append position is
//! recovered on open by replaying the record region.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{BurrowError, BurrowResult};
use crate::format::{self, FILE_HEADER_SIZE};

pub(crate) struct MapFile {
    file: std::fs::File,
    map: MmapMut,
    map_size: usize,
    write_pos: usize,
    path: PathBuf,
}

impl MapFile {
    /// Open or create the data file and map it at `map_size` bytes.
    ///
    /// An existing file larger than the requested size wins: shrinking the
    /// map would truncate committed data.
    pub(crate) fn open(path: &Path, map_size: usize, mode: u32) -> BurrowResult<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = opts
            .open(path)
            .map_err(|e| BurrowError::io(path, e, "failed to open data file"))?;

        let existing = file
            .metadata()
            .map_err(|e| BurrowError::io(path, e, "failed to stat data file"))?
            .len() as usize;
        let fresh = existing == 0;
        let size = map_size.max(existing);

        file.set_len(size as u64)
            .map_err(|e| BurrowError::io(path, e, "failed to size data file"))?;

        let mut map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| BurrowError::io(path, e, "failed to map data file"))?;

        if fresh {
            format::write_file_header(&mut map);
            map.flush()
                .map_err(|e| BurrowError::io(path, e, "failed to flush file header"))?;
        } else {
            format::check_file_header(&map, path)?;
        }

        Ok(Self {
            file,
            map,
            map_size: size,
            write_pos: FILE_HEADER_SIZE,
            path: path.to_path_buf(),
        })
    }

    /// The full mapped region, for replay.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub(crate) fn map_size(&self) -> usize {
        self.map_size
    }

    pub(crate) fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Set the append position discovered by replay.
    pub(crate) fn set_write_pos(&mut self, pos: usize) {
        debug_assert!(pos >= FILE_HEADER_SIZE && pos <= self.map_size);
        self.write_pos = pos;
    }

    /// Append raw record bytes at the current position.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> BurrowResult<()> {
        let end = self.write_pos + bytes.len();
        if end > self.map_size {
            return Err(BurrowError::MapFull { map_size: self.map_size as u64 });
        }
        self.map[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
        Ok(())
    }

    /// Grow the file and remap. The old map is flushed first so no committed
    /// bytes are lost if remapping fails.
    pub(crate) fn grow(&mut self, new_size: usize) -> BurrowResult<()> {
        if new_size <= self.map_size {
            return Err(BurrowError::InvalidMapSize {
                requested: new_size as u64,
                current: self.map_size as u64,
            });
        }
        self.map
            .flush()
            .map_err(|e| BurrowError::io(&self.path, e, "failed to flush before growing map"))?;
        self.file
            .set_len(new_size as u64)
            .map_err(|e| BurrowError::io(&self.path, e, "failed to grow data file"))?;
        self.map = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|e| BurrowError::io(&self.path, e, "failed to remap grown data file"))?;
        self.map_size = new_size;
        Ok(())
    }

    /// Flush the map to disk, synchronously or asynchronously per the
    /// environment's MAP_ASYNC flag.
    pub(crate) fn flush(&self, asynchronous: bool) -> BurrowResult<()> {
        let result = if asynchronous { self.map.flush_async() } else { self.map.flush() };
        result.map_err(|e| BurrowError::io(&self.path, e, "failed to flush map"))
    }
}
