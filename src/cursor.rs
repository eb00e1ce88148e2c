//! Cursor buffering and positioning
//!
//! [`FetchState`] is the row FIFO of a forward cursor together with the
//! bookkeeping that drives asynchronous prefetch. [`CachedRows`] backs the
//! client-cached strategy, where the whole result is read on first access and
//! positioned locally.

use std::collections::VecDeque;

use crate::codec::RowValue;
use crate::constants::ScrollOp;
use crate::error::{Error, Result};

/// Largest batch size below which prefetch never triggers
pub const PREFETCH_MIN_HIGH_WATER: usize = 15;

/// Buffered rows at or below which prefetch may trigger
pub const PREFETCH_MIN_LOW_WATER: usize = 10;

/// Row buffer and fetch bookkeeping of one open cursor
#[derive(Debug, Default)]
pub struct FetchState {
    rows: VecDeque<RowValue>,
    high_water: usize,
    async_pending: bool,
    end_of_cursor: bool,
    end_signalled: bool,
}

impl FetchState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget rows and flags, as for a newly opened cursor
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Rows waiting to be consumed
    pub fn buffered(&self) -> usize {
        self.rows.len()
    }

    /// Largest batch received so far
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Whether the server reported the end of the cursor
    pub fn is_end_of_cursor(&self) -> bool {
        self.end_of_cursor
    }

    /// Whether an asynchronous fetch is in flight
    pub fn is_async_pending(&self) -> bool {
        self.async_pending
    }

    pub(crate) fn set_async_pending(&mut self, pending: bool) {
        self.async_pending = pending;
    }

    /// Append a completed batch
    ///
    /// Returns the number of rows added and whether this batch is the first
    /// to report the end of the cursor.
    pub fn push_batch(&mut self, rows: Vec<RowValue>, end_of_cursor: bool) -> (usize, bool) {
        let added = rows.len();
        self.high_water = self.high_water.max(added);
        self.rows.extend(rows);
        if end_of_cursor {
            self.end_of_cursor = true;
        }
        let signal = self.end_of_cursor && !self.end_signalled;
        if signal {
            self.end_signalled = true;
        }
        (added, signal)
    }

    /// Buffer the single row of an `op_execute2` reply
    pub(crate) fn push_singleton(&mut self, row: RowValue) {
        self.reset();
        self.rows.push_back(row);
        self.end_of_cursor = true;
        self.end_signalled = true;
    }

    /// Take the next buffered row
    pub fn pop(&mut self) -> Option<RowValue> {
        self.rows.pop_front()
    }

    /// Drain every buffered row
    pub(crate) fn take_rows(&mut self) -> Vec<RowValue> {
        self.rows.drain(..).collect()
    }

    /// Drop buffered rows before moving a server-side cursor
    ///
    /// Returns how many rows the server cursor is ahead of the last row
    /// handed out: one per discarded row, plus one when it already ran past
    /// the end.
    pub(crate) fn reposition(&mut self) -> i32 {
        let ahead = self.rows.len() + usize::from(self.end_of_cursor);
        self.rows.clear();
        self.end_of_cursor = false;
        i32::try_from(ahead).unwrap_or(i32::MAX)
    }

    /// Whether the prefetch heuristic asks for another batch
    ///
    /// True once batches of at least [`PREFETCH_MIN_HIGH_WATER`] rows were
    /// seen and the buffer has shrunk to a third of that (but never less
    /// than [`PREFETCH_MIN_LOW_WATER`]).
    pub fn should_prefetch(&self) -> bool {
        if self.end_of_cursor || self.async_pending || self.high_water < PREFETCH_MIN_HIGH_WATER {
            return false;
        }
        self.rows.len() <= (self.high_water / 3).max(PREFETCH_MIN_LOW_WATER)
    }
}

/// Target of a positioned fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPosition {
    /// Row after the current one
    Next,
    /// Row before the current one
    Prior,
    /// First row
    First,
    /// Last row
    Last,
    /// Row at a 1-based position; negative counts from the end
    Absolute(i32),
    /// Row at an offset from the current one
    Relative(i32),
}

impl FetchPosition {
    /// Scroll operation and argument for `op_fetch_scroll`
    pub fn scroll_op(self) -> (ScrollOp, i32) {
        match self {
            FetchPosition::Next => (ScrollOp::Next, 0),
            FetchPosition::Prior => (ScrollOp::Prior, 0),
            FetchPosition::First => (ScrollOp::First, 0),
            FetchPosition::Last => (ScrollOp::Last, 0),
            FetchPosition::Absolute(n) => (ScrollOp::Absolute, n),
            FetchPosition::Relative(n) => (ScrollOp::Relative, n),
        }
    }

    /// Same target seen from a server cursor `ahead` rows further on
    ///
    /// Only the moves relative to the current row change.
    pub fn behind_server(self, ahead: i32) -> Self {
        if ahead == 0 {
            return self;
        }
        match self {
            FetchPosition::Next => FetchPosition::Relative(1 - ahead),
            FetchPosition::Prior => FetchPosition::Relative(-1 - ahead),
            FetchPosition::Relative(n) => FetchPosition::Relative(n.saturating_sub(ahead)),
            other => other,
        }
    }
}

/// Fully materialized result with a local cursor
///
/// Positions are 1-based; 0 is before the first row and `len + 1` after the
/// last.
#[derive(Debug, Default)]
pub struct CachedRows {
    rows: Vec<RowValue>,
    position: usize,
}

impl CachedRows {
    /// Wrap a complete result
    pub fn new(rows: Vec<RowValue>) -> Self {
        Self { rows, position: 0 }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move and return the row at the new position
    pub fn fetch(&mut self, target: FetchPosition) -> Option<RowValue> {
        let len = self.rows.len() as i64;
        let after_last = len + 1;
        let current = self.position as i64;
        let next = match target {
            FetchPosition::Next => current + 1,
            FetchPosition::Prior => current - 1,
            FetchPosition::First => 1,
            FetchPosition::Last => len,
            FetchPosition::Absolute(n) if n >= 0 => i64::from(n),
            FetchPosition::Absolute(n) => after_last + i64::from(n),
            FetchPosition::Relative(n) => current + i64::from(n),
        };
        self.position = next.clamp(0, after_last) as usize;
        self.current().cloned()
    }

    /// Row at the current position
    pub fn current(&self) -> Option<&RowValue> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
    }

    fn current_index(&self) -> Result<usize> {
        self.current()
            .map(|_| self.position - 1)
            .ok_or_else(|| Error::UnsupportedCursorOperation("cursor is not on a row".to_string()))
    }

    /// Replace the current row
    pub fn update_current(&mut self, row: RowValue) -> Result<()> {
        let index = self.current_index()?;
        self.rows[index] = row;
        Ok(())
    }

    /// Remove the current row; the cursor moves before the following row
    pub fn delete_current(&mut self) -> Result<RowValue> {
        let index = self.current_index()?;
        self.position -= 1;
        Ok(self.rows.remove(index))
    }

    /// Insert a row after the current position and move onto it
    pub fn insert(&mut self, row: RowValue) {
        let index = self.position.min(self.rows.len());
        self.rows.insert(index, row);
        self.position = index + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: i32) -> Vec<RowValue> {
        (1..=n).map(|i| RowValue::new().push_i32(i)).collect()
    }

    fn value(row: Option<RowValue>) -> Option<i32> {
        row.and_then(|r| r.get_i32(0).unwrap())
    }

    #[test]
    fn test_small_batches_never_prefetch() {
        let mut state = FetchState::new();
        state.push_batch(rows(12), false);
        for _ in 0..12 {
            assert!(!state.should_prefetch());
            state.pop();
        }
        assert!(!state.should_prefetch());
    }

    #[test]
    fn test_large_batches_prefetch_at_low_water() {
        let mut state = FetchState::new();
        state.push_batch(rows(30), false);
        while state.buffered() > 11 {
            state.pop();
            if state.buffered() > 10 {
                assert!(!state.should_prefetch(), "buffered {}", state.buffered());
            }
        }
        state.pop();
        assert_eq!(state.buffered(), 10);
        assert!(state.should_prefetch());

        state.set_async_pending(true);
        assert!(!state.should_prefetch());
    }

    #[test]
    fn test_high_water_third() {
        let mut state = FetchState::new();
        state.push_batch(rows(90), false);
        while state.buffered() > 31 {
            state.pop();
        }
        assert!(!state.should_prefetch());
        state.pop();
        assert!(state.should_prefetch());
    }

    #[test]
    fn test_end_signalled_once() {
        let mut state = FetchState::new();
        assert_eq!(state.push_batch(rows(3), false), (3, false));
        assert_eq!(state.push_batch(Vec::new(), true), (0, true));
        assert_eq!(state.push_batch(Vec::new(), true), (0, false));
        assert!(state.is_end_of_cursor());
        assert!(!state.should_prefetch());
    }

    #[test]
    fn test_cached_positioning() {
        let mut cache = CachedRows::new(rows(5));
        assert_eq!(value(cache.fetch(FetchPosition::Next)), Some(1));
        assert_eq!(value(cache.fetch(FetchPosition::Last)), Some(5));
        assert_eq!(value(cache.fetch(FetchPosition::Next)), None);
        assert_eq!(cache.position(), 6);
        assert_eq!(value(cache.fetch(FetchPosition::Prior)), Some(5));
        assert_eq!(value(cache.fetch(FetchPosition::Absolute(-2))), Some(4));
        assert_eq!(value(cache.fetch(FetchPosition::Relative(-2))), Some(2));
        assert_eq!(value(cache.fetch(FetchPosition::Absolute(0))), None);
        assert_eq!(value(cache.fetch(FetchPosition::Relative(-3))), None);
        assert_eq!(cache.position(), 0);
        assert_eq!(value(cache.fetch(FetchPosition::First)), Some(1));
    }

    #[test]
    fn test_cached_modifications() {
        let mut cache = CachedRows::new(rows(3));
        assert!(cache.update_current(RowValue::new()).is_err());

        cache.fetch(FetchPosition::Absolute(2));
        cache.update_current(RowValue::new().push_i32(20)).unwrap();
        assert_eq!(value(cache.current().cloned()), Some(20));

        let removed = cache.delete_current().unwrap();
        assert_eq!(removed.get_i32(0).unwrap(), Some(20));
        assert_eq!(cache.len(), 2);
        assert_eq!(value(cache.fetch(FetchPosition::Next)), Some(3));

        cache.insert(RowValue::new().push_i32(4));
        assert_eq!(cache.position(), 3);
        assert_eq!(value(cache.fetch(FetchPosition::Last)), Some(4));
    }

    #[test]
    fn test_scroll_op_mapping() {
        assert_eq!(FetchPosition::Absolute(7).scroll_op(), (ScrollOp::Absolute, 7));
        assert_eq!(FetchPosition::Prior.scroll_op(), (ScrollOp::Prior, 0));
    }

    #[test]
    fn test_reposition_counts_rows_the_server_passed() {
        let mut state = FetchState::new();
        state.push_batch(rows(3), false);
        state.pop();
        assert_eq!(state.reposition(), 2);
        assert_eq!(state.buffered(), 0);

        state.push_batch(rows(2), true);
        assert_eq!(state.reposition(), 3);
        assert!(!state.is_end_of_cursor());
        assert_eq!(state.reposition(), 0);
    }

    #[test]
    fn test_positions_behind_server() {
        assert_eq!(FetchPosition::Prior.behind_server(2), FetchPosition::Relative(-3));
        assert_eq!(FetchPosition::Relative(1).behind_server(2), FetchPosition::Relative(-1));
        assert_eq!(FetchPosition::Next.behind_server(1), FetchPosition::Relative(0));
        assert_eq!(FetchPosition::Absolute(4).behind_server(2), FetchPosition::Absolute(4));
        assert_eq!(FetchPosition::Prior.behind_server(0), FetchPosition::Prior);
    }
}
