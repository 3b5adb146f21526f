//! Range scans: the cursor iterator and the scan helpers built on it.
//!
//! `Scan` drives an engine cursor through a decoded range. The protocol is
//! two-phase: `has_next` advances and positions the cursor, `next` reads the
//! entry at the current position. Every `next` must be preceded by a
//! `has_next` that returned true.
//!
//! The seek and stop logic lives here, not in the engine: the engine only
//! knows `Set` (smallest key >= probe), so backward ranges correct the seek
//! with `Prev`/`Last`, and the stop bound is tested by re-materializing the
//! current key with `GetCurrent` and comparing through the engine's
//! comparator.

use std::cmp::Ordering;

use burrow_core::{BurrowEngine, Cursor, CursorOp};

use crate::codec::{self, Value, ValueKind};
use crate::dbi::Dbi;
use crate::error::KvResult;
use crate::range::{KeyRange, RangeSpec};
use crate::rtx::Rtx;

/// A lazy, single-pass walk over one DBI, bounded by a range.
///
/// Borrows the RTX it was opened under: the encoded range bounds live in the
/// RTX's start/stop buffers, and the borrow pins the lease for the scan's
/// whole life.
pub struct Scan<'r> {
    cur: Cursor,
    rtx: &'r mut Rtx,
    spec: RangeSpec,
    started: bool,
    ended: bool,
}

impl<'r> Scan<'r> {
    pub(crate) fn new(cur: Cursor, rtx: &'r mut Rtx, spec: RangeSpec) -> Self {
        Self { cur, rtx, spec, started: false, ended: false }
    }

    /// Advance to the next in-range entry. Once this returns false it never
    /// returns true again.
    pub fn has_next(&mut self) -> bool {
        if self.ended {
            return false;
        }
        let positioned = if self.started {
            self.step()
        } else {
            self.started = true;
            self.seek_first()
        };
        if !positioned {
            self.ended = true;
            return false;
        }
        if self.spec.has_stop {
            return self.check_stop();
        }
        true
    }

    /// The entry `has_next` positioned on. Views are valid until the next
    /// `has_next` call.
    pub fn next(&mut self) -> Option<(&[u8], &[u8])> {
        if !self.started {
            return None;
        }
        self.cur.get(CursorOp::GetCurrent)
    }

    /// Position on the first in-range entry.
    fn seek_first(&mut self) -> bool {
        if !self.spec.has_start {
            let op = if self.spec.forward { CursorOp::First } else { CursorOp::Last };
            return self.cur.get(op).is_some();
        }

        let (hit, exact) = {
            let start = self.rtx.start_kb.filled();
            match self.cur.get(CursorOp::Set(start)) {
                Some((key, _)) => (true, key == start),
                None => (false, false),
            }
        };

        if self.spec.forward {
            if !hit {
                return false;
            }
            if exact && !self.spec.include_start {
                return self.cur.get(CursorOp::Next).is_some();
            }
            true
        } else {
            // Set lands at the smallest key >= start; a backward walk wants
            // the largest key <= start (or < start when exclusive).
            if !hit {
                return self.cur.get(CursorOp::Last).is_some();
            }
            if exact && self.spec.include_start {
                return true;
            }
            self.cur.get(CursorOp::Prev).is_some()
        }
    }

    fn step(&mut self) -> bool {
        let op = if self.spec.forward { CursorOp::Next } else { CursorOp::Prev };
        self.cur.get(op).is_some()
    }

    /// Test the freshly positioned entry against the stop bound.
    fn check_stop(&mut self) -> bool {
        // advancement mutates cursor internals; re-materialize the key
        // before comparing
        let Some((key, _)) = self.cur.get(CursorOp::GetCurrent) else {
            self.ended = true;
            return false;
        };
        let stop = self.rtx.stop_kb.filled();
        match BurrowEngine::cmp(key, stop) {
            Ordering::Equal => {
                self.ended = true;
                self.spec.include_stop
            }
            Ordering::Greater if self.spec.forward => {
                self.ended = true;
                false
            }
            Ordering::Less if !self.spec.forward => {
                self.ended = true;
                false
            }
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan helpers — the shared read-path bodies the environment delegates to
// ---------------------------------------------------------------------------

pub(crate) fn fetch_value(
    dbi: &Dbi,
    rtx: &mut Rtx,
    key: &Value,
    vt: ValueKind,
) -> KvResult<Option<Value>> {
    match dbi.get_kv(rtx, key)? {
        Some(bytes) => Ok(Some(codec::read_value(bytes, vt)?)),
        None => Ok(None),
    }
}

pub(crate) fn fetch_first(
    dbi: &Dbi,
    rtx: &mut Rtx,
    range: &KeyRange<'_>,
    kt: ValueKind,
    vt: ValueKind,
) -> KvResult<Option<(Value, Value)>> {
    let mut scan = dbi.iterate_kv(rtx, range)?;
    if !scan.has_next() {
        return Ok(None);
    }
    match scan.next() {
        Some((k, v)) => Ok(Some((codec::read_value(k, kt)?, codec::read_value(v, vt)?))),
        None => Ok(None),
    }
}

pub(crate) fn fetch_range(
    dbi: &Dbi,
    rtx: &mut Rtx,
    range: &KeyRange<'_>,
    kt: ValueKind,
    vt: ValueKind,
) -> KvResult<Vec<(Value, Value)>> {
    let mut out = Vec::new();
    let mut scan = dbi.iterate_kv(rtx, range)?;
    while scan.has_next() {
        let Some((k, v)) = scan.next() else { break };
        out.push((codec::read_value(k, kt)?, codec::read_value(v, vt)?));
    }
    Ok(out)
}

pub(crate) fn fetch_range_count(dbi: &Dbi, rtx: &mut Rtx, range: &KeyRange<'_>) -> KvResult<u64> {
    let mut count = 0u64;
    let mut scan = dbi.iterate_kv(rtx, range)?;
    while scan.has_next() {
        count += 1;
    }
    Ok(count)
}

pub(crate) fn fetch_some(
    dbi: &Dbi,
    rtx: &mut Rtx,
    pred: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    range: &KeyRange<'_>,
    kt: ValueKind,
    vt: ValueKind,
) -> KvResult<Option<(Value, Value)>> {
    let mut scan = dbi.iterate_kv(rtx, range)?;
    while scan.has_next() {
        let Some((k, v)) = scan.next() else { break };
        if pred(k, v) {
            return Ok(Some((codec::read_value(k, kt)?, codec::read_value(v, vt)?)));
        }
    }
    Ok(None)
}

pub(crate) fn fetch_range_filtered(
    dbi: &Dbi,
    rtx: &mut Rtx,
    pred: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    range: &KeyRange<'_>,
    kt: ValueKind,
    vt: ValueKind,
) -> KvResult<Vec<(Value, Value)>> {
    let mut out = Vec::new();
    let mut scan = dbi.iterate_kv(rtx, range)?;
    while scan.has_next() {
        let Some((k, v)) = scan.next() else { break };
        if pred(k, v) {
            out.push((codec::read_value(k, kt)?, codec::read_value(v, vt)?));
        }
    }
    Ok(out)
}

pub(crate) fn fetch_range_filtered_count(
    dbi: &Dbi,
    rtx: &mut Rtx,
    pred: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    range: &KeyRange<'_>,
) -> KvResult<u64> {
    let mut count = 0u64;
    let mut scan = dbi.iterate_kv(rtx, range)?;
    while scan.has_next() {
        let Some((k, v)) = scan.next() else { break };
        if pred(k, v) {
            count += 1;
        }
    }
    Ok(count)
}
