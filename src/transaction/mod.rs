//! Transactions: batched edits applied atomically
//!
//! Commands describe their whole batch of edits against the buffer state
//! they observed (multi-cursor commands push one edit per cursor, all in
//! pre-transaction coordinates).  `commit` re-bases each edit so the batch
//! applies sequentially, validates every position, applies the batch, and
//! records one commit in the change log.  A failing validation leaves the
//! buffer untouched: commits are never partially applied.

use crate::buffer::Buffer;
use crate::change::{self, CommitId, Edit, EditKind};
use crate::error::{ErrorKind, SkeinError};

pub struct Transaction {
    edits: Vec<Edit>,
    start_change_index: usize,
}

impl Transaction {
    /// Start a batch against the buffer's current state.
    pub fn init(buffer: &Buffer) -> Transaction {
        Transaction {
            edits: Vec::new(),
            start_change_index: buffer.changes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Queue an edit.  Positions refer to the buffer state at `init` time.
    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn insert(&mut self, position: u64, value: impl Into<String>) {
        self.push(Edit::insert(position, value));
    }

    /// Insert that does not drag cursors sitting exactly at `position`.
    pub fn insert_after(&mut self, position: u64, value: impl Into<String>) {
        self.push(Edit::insert_after(position, value));
    }

    /// Queue removal of `[start, end)`, capturing the removed bytes so the
    /// commit can be reversed losslessly.
    pub fn remove_range(&mut self, buffer: &Buffer, start: u64, end: u64) {
        debug_assert!(start <= end && end <= buffer.contents.len());
        let value = buffer.contents.slice_string(start, end);
        self.push(Edit::remove(start, value));
    }

    /// Re-base, validate, apply, and record the batch.  Returns the new
    /// commit id, or `None` for an empty batch.
    pub fn commit(self, buffer: &mut Buffer) -> Result<Option<CommitId>, SkeinError> {
        debug_assert_eq!(
            buffer.changes.len(),
            self.start_change_index,
            "buffer changed between transaction init and commit"
        );
        buffer.check_writable()?;
        if self.edits.is_empty() {
            return Ok(None);
        }

        let mut edits = self.edits;
        // Stable by position: edits pushed earlier win ties, so paired
        // inserts at one cursor keep their order.
        edits.sort_by_key(|edit| edit.position);

        // Re-base each edit over the net shift of the edits before it.
        let mut shift: i64 = 0;
        for edit in &mut edits {
            let rebased = edit.position as i64 + shift;
            debug_assert!(rebased >= 0, "overlapping edits in one transaction");
            edit.position = rebased.max(0) as u64;
            if edit.kind.is_insert() {
                shift += edit.len() as i64;
            } else {
                shift -= edit.len() as i64;
            }
        }

        // Validate the whole batch before touching the contents.
        let mut len_here = buffer.contents.len() as i64;
        for edit in &edits {
            match edit.kind {
                EditKind::Insert | EditKind::InsertAfterPosition => {
                    if (edit.position as i64) > len_here {
                        return Err(invalid(edit, len_here));
                    }
                    len_here += edit.len() as i64;
                }
                EditKind::Remove => {
                    if (edit.position + edit.len()) as i64 > len_here {
                        return Err(invalid(edit, len_here));
                    }
                    len_here -= edit.len() as i64;
                }
            }
        }
        debug_assert!(len_here >= 0);

        for edit in &edits {
            // Validated above; application cannot fail.
            change::apply_edit(&mut buffer.contents, edit)?;
        }

        Ok(Some(buffer.changes.push_commit(edits)))
    }
}

fn invalid(edit: &Edit, len: i64) -> SkeinError {
    SkeinError::new(
        ErrorKind::Edit,
        "INVALID_EDIT",
        format!(
            "transaction edit at {} (len {}) out of range for buffer of {} bytes",
            edit.position,
            edit.len(),
            len
        ),
    )
}
