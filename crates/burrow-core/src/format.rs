//! Binary format of the memory-mapped commit log.
//!
//! The data file starts with a fixed header, followed by a dense sequence of
//! records:
//!
//! ```text
//! record := checksum(u32 LE) + length(u32 LE) + payload
//! payload := tag(u8) + body
//! ```
//!
//! Mutations (Put/Del/OpenDbi/DropDbi) are only meaningful once covered by a
//! trailing Commit record; replay stages them and applies the stage when it
//! reaches the Commit marker. A torn tail (zeroed length, short payload, or
//! checksum mismatch) ends replay — everything after the last Commit is the
//! crash point and is discarded.

use std::path::Path;

use crate::error::{BurrowError, BurrowResult};

/// Magic bytes identifying a BurrowDB data file: "BRW1" in ASCII.
pub const MAGIC: [u8; 4] = *b"BRW1";

/// Data file format version.
pub const FORMAT_VERSION: u16 = 1;

/// File header size in bytes: magic(4) + version(2) + reserved(10).
pub const FILE_HEADER_SIZE: usize = 16;

/// Record framing overhead: checksum(4) + length(4).
pub const RECORD_HEADER_SIZE: usize = 8;

/// Serialized size of a Commit record.
pub const COMMIT_RECORD_LEN: usize = RECORD_HEADER_SIZE + 1 + 8;

const TAG_PUT: u8 = 1;
const TAG_DEL: u8 = 2;
const TAG_OPEN_DBI: u8 = 3;
const TAG_DROP_DBI: u8 = 4;
const TAG_COMMIT: u8 = 5;

/// A parsed log record, borrowing from the mapped file.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Record<'a> {
    Put { dbi: u32, key: &'a [u8], value: &'a [u8] },
    Del { dbi: u32, key: &'a [u8] },
    OpenDbi { dbi: u32, name: &'a [u8] },
    DropDbi { dbi: u32, delete: bool },
    Commit { txn_id: u64 },
}

/// Write the file header into a fresh map.
pub(crate) fn write_file_header(map: &mut [u8]) {
    map[0..4].copy_from_slice(&MAGIC);
    map[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    // remaining 10 bytes reserved, already zeroed
}

/// Validate the file header of an existing map.
pub(crate) fn check_file_header(map: &[u8], path: &Path) -> BurrowResult<()> {
    if map.len() < FILE_HEADER_SIZE {
        return Err(BurrowError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: format!("file too short for header: {} bytes", map.len()),
        });
    }
    if map[0..4] != MAGIC {
        return Err(BurrowError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: format!(
                "bad magic {:02x}{:02x}{:02x}{:02x}, not a BurrowDB data file",
                map[0], map[1], map[2], map[3]
            ),
        });
    }
    let version = u16::from_le_bytes([map[4], map[5]]);
    if version != FORMAT_VERSION {
        return Err(BurrowError::Corrupted {
            path: path.to_path_buf(),
            offset: 4,
            reason: format!("format version {} not supported (want {})", version, FORMAT_VERSION),
        });
    }
    Ok(())
}

fn push_record(out: &mut Vec<u8>, payload: &[u8]) {
    let checksum = crc32c::crc32c(payload);
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Append a Put record to a batch buffer.
pub(crate) fn push_put(out: &mut Vec<u8>, dbi: u32, key: &[u8], value: &[u8]) {
    let mut payload = Vec::with_capacity(1 + 4 + 4 + key.len() + value.len());
    payload.push(TAG_PUT);
    payload.extend_from_slice(&dbi.to_le_bytes());
    payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(value);
    push_record(out, &payload);
}

/// Append a Del record to a batch buffer.
pub(crate) fn push_del(out: &mut Vec<u8>, dbi: u32, key: &[u8]) {
    let mut payload = Vec::with_capacity(1 + 4 + key.len());
    payload.push(TAG_DEL);
    payload.extend_from_slice(&dbi.to_le_bytes());
    payload.extend_from_slice(key);
    push_record(out, &payload);
}

/// Append an OpenDbi record to a batch buffer.
pub(crate) fn push_open_dbi(out: &mut Vec<u8>, dbi: u32, name: &str) {
    let mut payload = Vec::with_capacity(1 + 4 + name.len());
    payload.push(TAG_OPEN_DBI);
    payload.extend_from_slice(&dbi.to_le_bytes());
    payload.extend_from_slice(name.as_bytes());
    push_record(out, &payload);
}

/// Append a DropDbi record to a batch buffer.
pub(crate) fn push_drop_dbi(out: &mut Vec<u8>, dbi: u32, delete: bool) {
    let mut payload = Vec::with_capacity(1 + 4 + 1);
    payload.push(TAG_DROP_DBI);
    payload.extend_from_slice(&dbi.to_le_bytes());
    payload.push(delete as u8);
    push_record(out, &payload);
}

/// Append a Commit marker to a batch buffer.
pub(crate) fn push_commit(out: &mut Vec<u8>, txn_id: u64) {
    let mut payload = Vec::with_capacity(1 + 8);
    payload.push(TAG_COMMIT);
    payload.extend_from_slice(&txn_id.to_le_bytes());
    push_record(out, &payload);
}

/// Serialized size of a Put record, for map-capacity accounting.
pub(crate) fn put_record_len(key_len: usize, value_len: usize) -> usize {
    RECORD_HEADER_SIZE + 1 + 4 + 4 + key_len + value_len
}

/// Serialized size of a Del record.
pub(crate) fn del_record_len(key_len: usize) -> usize {
    RECORD_HEADER_SIZE + 1 + 4 + key_len
}

/// Sequential reader over the record region of a mapped file.
///
/// `next` returns `Ok(None)` at the end of the valid record sequence: a
/// zeroed region, a record that does not fit in the map, or a checksum
/// mismatch. With a single appending writer all three only occur at the
/// torn tail of a crashed process.
pub(crate) struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(buf: &'a [u8], start: usize) -> Self {
        Self { buf, pos: start }
    }

    /// Byte offset of the next unread record.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn next(&mut self) -> BurrowResult<Option<Record<'a>>> {
        if self.pos + RECORD_HEADER_SIZE > self.buf.len() {
            return Ok(None);
        }
        let checksum = u32::from_le_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        let length = u32::from_le_bytes([
            self.buf[self.pos + 4],
            self.buf[self.pos + 5],
            self.buf[self.pos + 6],
            self.buf[self.pos + 7],
        ]) as usize;
        if length == 0 {
            // zeroed region: clean end of log
            return Ok(None);
        }

        let payload_start = self.pos + RECORD_HEADER_SIZE;
        let payload_end = payload_start + length;
        if payload_end > self.buf.len() {
            tracing::warn!(offset = self.pos, length, "torn record at log tail, stopping replay");
            return Ok(None);
        }

        let payload = &self.buf[payload_start..payload_end];
        if crc32c::crc32c(payload) != checksum {
            tracing::warn!(offset = self.pos, "checksum mismatch at log tail, stopping replay");
            return Ok(None);
        }

        let record = parse_payload(payload, self.pos)?;
        self.pos = payload_end;
        Ok(Some(record))
    }
}

fn parse_payload(payload: &[u8], offset: usize) -> BurrowResult<Record<'_>> {
    let corrupted = |reason: String| BurrowError::Corrupted {
        path: std::path::PathBuf::from("<map>"),
        offset: offset as u64,
        reason,
    };

    let tag = payload[0];
    let body = &payload[1..];
    match tag {
        TAG_PUT => {
            if body.len() < 8 {
                return Err(corrupted("put record too short".into()));
            }
            let dbi = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
            let key_len = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;
            if body.len() < 8 + key_len {
                return Err(corrupted(format!("put record key length {} overruns payload", key_len)));
            }
            Ok(Record::Put {
                dbi,
                key: &body[8..8 + key_len],
                value: &body[8 + key_len..],
            })
        }
        TAG_DEL => {
            if body.len() < 4 {
                return Err(corrupted("del record too short".into()));
            }
            let dbi = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
            Ok(Record::Del { dbi, key: &body[4..] })
        }
        TAG_OPEN_DBI => {
            if body.len() < 4 {
                return Err(corrupted("open-dbi record too short".into()));
            }
            let dbi = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
            Ok(Record::OpenDbi { dbi, name: &body[4..] })
        }
        TAG_DROP_DBI => {
            if body.len() < 5 {
                return Err(corrupted("drop-dbi record too short".into()));
            }
            let dbi = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
            Ok(Record::DropDbi { dbi, delete: body[4] != 0 })
        }
        TAG_COMMIT => {
            if body.len() < 8 {
                return Err(corrupted("commit record too short".into()));
            }
            let txn_id = u64::from_le_bytes([
                body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
            ]);
            Ok(Record::Commit { txn_id })
        }
        other => Err(corrupted(format!("unknown record tag {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_record_kinds() {
        let mut buf = Vec::new();
        push_open_dbi(&mut buf, 0, "things");
        push_put(&mut buf, 0, b"key", b"value");
        push_del(&mut buf, 0, b"key");
        push_drop_dbi(&mut buf, 0, true);
        push_commit(&mut buf, 7);

        let mut reader = RecordReader::new(&buf, 0);
        assert_eq!(
            reader.next().unwrap(),
            Some(Record::OpenDbi { dbi: 0, name: b"things" })
        );
        assert_eq!(
            reader.next().unwrap(),
            Some(Record::Put { dbi: 0, key: b"key", value: b"value" })
        );
        assert_eq!(reader.next().unwrap(), Some(Record::Del { dbi: 0, key: b"key" }));
        assert_eq!(reader.next().unwrap(), Some(Record::DropDbi { dbi: 0, delete: true }));
        assert_eq!(reader.next().unwrap(), Some(Record::Commit { txn_id: 7 }));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_record_len_accounting() {
        let mut buf = Vec::new();
        push_put(&mut buf, 3, b"abc", b"defgh");
        assert_eq!(buf.len(), put_record_len(3, 5));

        let mut buf = Vec::new();
        push_del(&mut buf, 3, b"abc");
        assert_eq!(buf.len(), del_record_len(3));

        let mut buf = Vec::new();
        push_commit(&mut buf, 1);
        assert_eq!(buf.len(), COMMIT_RECORD_LEN);
    }

    #[test]
    fn test_zeroed_tail_ends_replay() {
        let mut buf = Vec::new();
        push_put(&mut buf, 0, b"k", b"v");
        let valid_end = buf.len();
        buf.extend_from_slice(&[0u8; 64]);

        let mut reader = RecordReader::new(&buf, 0);
        assert!(matches!(reader.next().unwrap(), Some(Record::Put { .. })));
        assert_eq!(reader.next().unwrap(), None);
        assert_eq!(reader.pos(), valid_end);
    }

    #[test]
    fn test_corrupt_checksum_ends_replay() {
        let mut buf = Vec::new();
        push_put(&mut buf, 0, b"k1", b"v1");
        let first_end = buf.len();
        push_put(&mut buf, 0, b"k2", b"v2");
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let mut reader = RecordReader::new(&buf, 0);
        assert!(matches!(reader.next().unwrap(), Some(Record::Put { .. })));
        assert_eq!(reader.next().unwrap(), None);
        assert_eq!(reader.pos(), first_end);
    }

    #[test]
    fn test_torn_record_ends_replay() {
        let mut buf = Vec::new();
        push_put(&mut buf, 0, b"k", b"v");
        // record header claiming more payload than exists
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        buf.extend_from_slice(&1024u32.to_le_bytes());
        buf.extend_from_slice(b"short");

        let mut reader = RecordReader::new(&buf, 0);
        assert!(matches!(reader.next().unwrap(), Some(Record::Put { .. })));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_file_header_roundtrip() {
        let mut map = vec![0u8; FILE_HEADER_SIZE];
        write_file_header(&mut map);
        assert!(check_file_header(&map, Path::new("data.bdb")).is_ok());

        map[0] = b'X';
        assert!(matches!(
            check_file_header(&map, Path::new("data.bdb")),
            Err(BurrowError::Corrupted { .. })
        ));
    }
}
