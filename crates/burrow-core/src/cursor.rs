//! Snapshot cursors.
//!
//! A cursor walks one DBI of one pinned version. The snapshot is shared via
//! `Arc`, so the cursor stays valid however long the caller keeps it, and the
//! key/value views it returns live until the next cursor call.
//!
//! Position is tracked as the last key returned; stepping is a bounded range
//! query against the ordered map, so every operation is O(log n).

use std::ops::Bound;
use std::sync::Arc;

use crate::engine::DbiState;

/// Cursor positioning operations.
///
/// `Set` positions at the smallest key greater than or equal to the probe
/// (a seek-range). `Next`/`Prev` from an unpositioned cursor behave as
/// `First`/`Last`.
#[derive(Debug)]
pub enum CursorOp<'a> {
    First,
    Last,
    Next,
    Prev,
    Set(&'a [u8]),
    GetCurrent,
}

/// A cursor over one DBI of one snapshot.
pub struct Cursor {
    state: Arc<DbiState>,
    pos: Option<Vec<u8>>,
}

impl Cursor {
    pub(crate) fn new(state: Arc<DbiState>) -> Self {
        Self { state, pos: None }
    }

    /// Execute a cursor operation; `None` means the operation found no entry.
    ///
    /// The returned views borrow the snapshot and are valid until the next
    /// call on this cursor.
    pub fn get(&mut self, op: CursorOp<'_>) -> Option<(&[u8], &[u8])> {
        match op {
            CursorOp::First => {
                let (k, v) = self.state.entries.iter().next()?;
                self.pos = Some(k.clone());
                Some((k.as_slice(), v.as_slice()))
            }
            CursorOp::Last => {
                let (k, v) = self.state.entries.iter().next_back()?;
                self.pos = Some(k.clone());
                Some((k.as_slice(), v.as_slice()))
            }
            CursorOp::Next => {
                let pos = match self.pos.clone() {
                    Some(p) => p,
                    None => return self.get(CursorOp::First),
                };
                let (k, v) = self
                    .state
                    .entries
                    .range((Bound::Excluded(pos), Bound::Unbounded))
                    .next()?;
                self.pos = Some(k.clone());
                Some((k.as_slice(), v.as_slice()))
            }
            CursorOp::Prev => {
                let pos = match self.pos.clone() {
                    Some(p) => p,
                    None => return self.get(CursorOp::Last),
                };
                let (k, v) = self.state.entries.range(..pos).next_back()?;
                self.pos = Some(k.clone());
                Some((k.as_slice(), v.as_slice()))
            }
            CursorOp::Set(probe) => {
                let (k, v) = self
                    .state
                    .entries
                    .range::<[u8], _>((Bound::Included(probe), Bound::Unbounded))
                    .next()?;
                self.pos = Some(k.clone());
                Some((k.as_slice(), v.as_slice()))
            }
            CursorOp::GetCurrent => {
                let pos = self.pos.as_ref()?;
                let v = self.state.entries.get(pos)?;
                Some((pos.as_slice(), v.as_slice()))
            }
        }
    }
}
