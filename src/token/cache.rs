//! Incremental tokenizer check-point cache
//!
//! The cache samples `(position, state)` pairs roughly every
//! `CHECK_POINT_INTERVAL` bytes of scanned text so any window can start
//! colorizing from the nearest check-point instead of from byte zero.  On
//! edits the cache is patched: check-points shift across the edit, and a
//! bounded rescan from the nearest surviving check-point tries to re-join
//! the old token stream by matching `(position, state)`.

use crate::change::Change;
use crate::contents::Contents;

use super::{ScanState, Token, Tokenizer};

/// Minimum gap between stored check-points.
pub const CHECK_POINT_INTERVAL: u64 = 1024;

/// How far past the damage `update` will lex before giving up on
/// salvaging the tail.
const MAX_RESCAN: u64 = 8 * CHECK_POINT_INTERVAL;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckPoint {
    pub position: u64,
    pub state: ScanState,
}

/// Check-point cache for one buffer.
///
/// Invariants: `check_points` is strictly increasing in position; running
/// the tokenizer from any check-point reproduces the same tokens as
/// running from the start; after `update`, `change_index` equals the
/// buffer's change-log length.
pub struct TokenCache {
    pub check_points: Vec<CheckPoint>,
    /// Change-log length this cache is consistent with.
    pub change_index: usize,
    /// Exclusive position the cache has scanned to; always a token
    /// boundary.
    scanned_until: u64,
    /// Tokenizer state at `scanned_until`.
    tail_state: ScanState,
}

impl TokenCache {
    pub fn new() -> Self {
        TokenCache {
            check_points: Vec::new(),
            change_index: 0,
            scanned_until: 0,
            tail_state: ScanState::default(),
        }
    }

    /// Throw the cache away; the next `generate_check_points_until` starts
    /// from scratch.
    pub fn reset(&mut self, change_index: usize) {
        self.check_points.clear();
        self.scanned_until = 0;
        self.tail_state = ScanState::default();
        self.change_index = change_index;
    }

    /// True when the cache extends to `pos`.
    pub fn is_covered(&self, pos: u64) -> bool {
        self.scanned_until >= pos
    }

    pub fn covered_until(&self) -> u64 {
        self.scanned_until
    }

    /// Greatest check-point at or before `pos`, or the zero state.
    pub fn find_check_point(&self, pos: u64) -> CheckPoint {
        match self
            .check_points
            .binary_search_by_key(&pos, |check_point| check_point.position)
        {
            Ok(index) => self.check_points[index],
            Err(0) => CheckPoint {
                position: 0,
                state: ScanState::default(),
            },
            Err(index) => self.check_points[index - 1],
        }
    }

    /// Bring the cache up to the buffer's current change index.  Returns
    /// true when the previously covered region is still covered, false
    /// when the tail had to be discarded.
    pub fn update(&mut self, contents: &Contents, changes: &[Change], tokenizer: Tokenizer) -> bool {
        if self.change_index >= changes.len() {
            self.change_index = changes.len();
            return true;
        }

        let mut dirty: Option<u64> = None;
        for change in &changes[self.change_index..] {
            if change.is_redo {
                for edit in change.edits.iter() {
                    self.shift_for_edit(edit.position, edit.len(), edit.kind.is_insert(), &mut dirty);
                }
            } else {
                for edit in change.edits.iter().rev() {
                    // An undone insert removes text; an undone remove
                    // re-inserts it.
                    self.shift_for_edit(edit.position, edit.len(), !edit.kind.is_insert(), &mut dirty);
                }
            }
        }
        self.change_index = changes.len();

        match dirty {
            Some(dirty) if dirty < self.scanned_until => self.rescan(contents, tokenizer, dirty),
            _ => true,
        }
    }

    fn shift_for_edit(&mut self, position: u64, len: u64, is_insert: bool, dirty: &mut Option<u64>) {
        if is_insert {
            for check_point in &mut self.check_points {
                if check_point.position > position {
                    check_point.position += len;
                }
            }
            if self.scanned_until >= position {
                self.scanned_until += len;
            }
        } else {
            let end = position + len;
            self.check_points.retain_mut(|check_point| {
                if check_point.position >= end {
                    check_point.position -= len;
                    true
                } else {
                    // Check-points inside the removed range are straddled.
                    check_point.position <= position
                }
            });
            if self.scanned_until >= end {
                self.scanned_until -= len;
            } else if self.scanned_until > position {
                self.scanned_until = position;
            }
        }
        *dirty = Some(dirty.map_or(position, |d| d.min(position)));
    }

    /// Rescan from the check-point at or before `dirty`, trying to re-join
    /// the surviving check-points by state match.  Returns true if the
    /// cache still covers everything it covered before, false if the tail
    /// was cut (the caller should schedule asynchronous re-highlighting).
    fn rescan(&mut self, contents: &Contents, tokenizer: Tokenizer, dirty: u64) -> bool {
        let goal = self.scanned_until;
        let from = self.find_check_point(dirty);
        let mut iterator = contents.iterator_at(from.position);
        let mut state = from.state;
        let mut token = Token::default();

        let mut next = self
            .check_points
            .partition_point(|check_point| check_point.position <= from.position);
        let mut last_boundary = from.position;

        loop {
            // Candidates the scan has passed no longer sit on token
            // boundaries and cannot be salvaged.
            while next < self.check_points.len()
                && self.check_points[next].position < iterator.position()
            {
                self.check_points.remove(next);
            }

            if next < self.check_points.len()
                && self.check_points[next].position == iterator.position()
            {
                if self.check_points[next].state == state {
                    // Re-joined the old token stream; everything beyond
                    // this check-point is still good.
                    return true;
                }
                self.check_points.remove(next);
            }

            if iterator.position() >= goal && next >= self.check_points.len() {
                // Verified through the end of the covered region.
                self.scanned_until = iterator.position();
                self.tail_state = state;
                return true;
            }

            if iterator.position() >= dirty + MAX_RESCAN {
                // Not re-joining; cut the cache here rather than lexing an
                // unbounded amount of text on the frame path.
                self.check_points.truncate(next);
                self.scanned_until = iterator.position();
                self.tail_state = state;
                return false;
            }

            if !tokenizer(&mut iterator, &mut token, &mut state) {
                self.check_points.truncate(next);
                self.scanned_until = contents.len();
                self.tail_state = state;
                return self.scanned_until >= goal;
            }

            // Maintain density once the scan is past every salvage
            // candidate.
            if next >= self.check_points.len()
                && iterator.position() >= last_boundary + CHECK_POINT_INTERVAL
            {
                self.check_points.push(CheckPoint {
                    position: iterator.position(),
                    state,
                });
                next = self.check_points.len();
                last_boundary = iterator.position();
            }
        }
    }

    /// Extend the cache forward from its tail until it covers `pos`,
    /// appending a check-point every `CHECK_POINT_INTERVAL` bytes.
    pub fn generate_check_points_until(
        &mut self,
        contents: &Contents,
        tokenizer: Tokenizer,
        pos: u64,
    ) {
        let pos = pos.min(contents.len());
        if self.scanned_until >= pos {
            return;
        }

        let mut iterator = contents.iterator_at(self.scanned_until);
        let mut state = self.tail_state;
        let mut token = Token::default();
        let mut last = self
            .check_points
            .last()
            .map_or(0, |check_point| check_point.position);

        while iterator.position() < pos {
            if !tokenizer(&mut iterator, &mut token, &mut state) {
                // No more tokens: trailing bytes are covered implicitly.
                self.scanned_until = contents.len();
                self.tail_state = state;
                return;
            }
            if iterator.position() >= last + CHECK_POINT_INTERVAL {
                self.check_points.push(CheckPoint {
                    position: iterator.position(),
                    state,
                });
                last = iterator.position();
            }
        }

        self.scanned_until = self.scanned_until.max(iterator.position());
        self.tail_state = state;
    }

    /// Tokens overlapping `[start, end)`, starting from the nearest
    /// check-point.
    pub fn tokens_in(
        &self,
        contents: &Contents,
        tokenizer: Tokenizer,
        start: u64,
        end: u64,
    ) -> Vec<Token> {
        let from = self.find_check_point(start);
        let mut iterator = contents.iterator_at(from.position);
        let mut state = from.state;
        let mut token = Token::default();
        let mut out = Vec::new();
        while tokenizer(&mut iterator, &mut token, &mut state) {
            if token.end > start {
                out.push(token);
            }
            if token.end >= end || iterator.position() >= end {
                break;
            }
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for pair in self.check_points.windows(2) {
            assert!(pair[0].position < pair[1].position);
        }
        if let Some(last) = self.check_points.last() {
            assert!(last.position <= self.scanned_until);
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        TokenCache::new()
    }
}
