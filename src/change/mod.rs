//! Edits, commits, and the undo DAG
//!
//! Every buffer mutation is described by `Edit`s grouped into `Commit`s.
//! Commits form a tree rooted at the buffer's initial state: undo walks to
//! the parent, redo follows the most recently taken child, and editing
//! after an undo starts a new branch without discarding the old one.
//!
//! Next to the commit tree sits a flat `changes` vector with one entry per
//! *applied* transition (commit, undo, or redo).  Anything that caches
//! positions against a buffer (cursors, window viewports, the token cache,
//! jump entries) records the length of `changes` it saw and replays the
//! tail to catch up; because undo appends rather than truncates, replay
//! only ever moves forward.

use std::sync::Arc;

use crate::contents::Contents;
use crate::error::{ErrorKind, SkeinError};

/// How an edit mutates the contents, and how positions around it shift.
///
/// `Insert` biases a cursor sitting exactly at the edit position to move
/// past the inserted text; `InsertAfterPosition` leaves it in place.  The
/// two must stay distinct: paired-bracket insertion relies on the close
/// bracket not dragging the cursor along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Remove,
    InsertAfterPosition,
}

impl EditKind {
    pub fn is_insert(self) -> bool {
        matches!(self, EditKind::Insert | EditKind::InsertAfterPosition)
    }
}

/// A single insertion or removal.  Removes store the exact bytes they
/// removed so reversal is lossless.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub value: String,
    pub position: u64,
    pub kind: EditKind,
}

impl Edit {
    pub fn insert(position: u64, value: impl Into<String>) -> Edit {
        Edit {
            value: value.into(),
            position,
            kind: EditKind::Insert,
        }
    }

    pub fn insert_after(position: u64, value: impl Into<String>) -> Edit {
        Edit {
            value: value.into(),
            position,
            kind: EditKind::InsertAfterPosition,
        }
    }

    pub fn remove(position: u64, value: impl Into<String>) -> Edit {
        Edit {
            value: value.into(),
            position,
            kind: EditKind::Remove,
        }
    }

    pub fn len(&self) -> u64 {
        self.value.len() as u64
    }
}

/// Index of a commit in a buffer's change log.  Id 0 is the sentinel root
/// representing the initial state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitId(pub usize);

impl CommitId {
    pub const ROOT: CommitId = CommitId(0);
}

/// A node in the commit tree.
#[derive(Debug)]
pub struct Commit {
    pub id: CommitId,
    pub parent: Option<CommitId>,
    pub children: Vec<CommitId>,
    /// Index into `children` of the branch redo follows.
    pub last_child: Option<usize>,
    pub edits: Arc<[Edit]>,
}

/// One applied transition: a commit's edits, forward or reversed.
#[derive(Clone, Debug)]
pub struct Change {
    pub edits: Arc<[Edit]>,
    pub is_redo: bool,
}

/// Apply an edit to `contents`, validating positions first.
pub fn apply_edit(contents: &mut Contents, edit: &Edit) -> Result<(), SkeinError> {
    match edit.kind {
        EditKind::Insert | EditKind::InsertAfterPosition => {
            if edit.position > contents.len() {
                return Err(invalid_edit(edit, contents.len()));
            }
            contents.insert(edit.position, edit.value.as_bytes());
        }
        EditKind::Remove => {
            if edit.position + edit.len() > contents.len() {
                return Err(invalid_edit(edit, contents.len()));
            }
            debug_assert_eq!(
                contents.slice(edit.position, edit.position + edit.len()),
                edit.value.as_bytes(),
                "removed bytes must match the edit's stored value"
            );
            contents.remove(edit.position, edit.len());
        }
    }
    Ok(())
}

/// Apply the reverse of an edit (inserts remove, removes re-insert).
pub fn unapply_edit(contents: &mut Contents, edit: &Edit) -> Result<(), SkeinError> {
    match edit.kind {
        EditKind::Insert | EditKind::InsertAfterPosition => {
            if edit.position + edit.len() > contents.len() {
                return Err(invalid_edit(edit, contents.len()));
            }
            contents.remove(edit.position, edit.len());
        }
        EditKind::Remove => {
            if edit.position > contents.len() {
                return Err(invalid_edit(edit, contents.len()));
            }
            contents.insert(edit.position, edit.value.as_bytes());
        }
    }
    Ok(())
}

fn invalid_edit(edit: &Edit, len: u64) -> SkeinError {
    SkeinError::new(
        ErrorKind::Edit,
        "INVALID_EDIT",
        format!(
            "edit at {} (len {}) out of range for buffer of {} bytes",
            edit.position,
            edit.len(),
            len
        ),
    )
}

/// Shift `pos` across one forward-applied edit.
pub fn position_after_edit(edit: &Edit, pos: &mut u64) {
    match edit.kind {
        EditKind::Insert => {
            if edit.position <= *pos {
                *pos += edit.len();
            }
        }
        EditKind::InsertAfterPosition => {
            if edit.position < *pos {
                *pos += edit.len();
            }
        }
        EditKind::Remove => {
            let end = edit.position + edit.len();
            if *pos <= edit.position {
                // Unchanged.
            } else if *pos >= end {
                *pos -= edit.len();
            } else {
                *pos = edit.position;
            }
        }
    }
}

/// Shift `pos` across one reverse-applied edit.
pub fn position_before_edit(edit: &Edit, pos: &mut u64) {
    match edit.kind {
        EditKind::Insert | EditKind::InsertAfterPosition => {
            // Undoing an insert removes the inserted range.
            let end = edit.position + edit.len();
            if *pos <= edit.position {
                // Unchanged.
            } else if *pos >= end {
                *pos -= edit.len();
            } else {
                *pos = edit.position;
            }
        }
        EditKind::Remove => {
            // Undoing a remove re-inserts the removed text.
            if edit.position <= *pos {
                *pos += edit.len();
            }
        }
    }
}

/// Shift `pos` across one applied change.
pub fn position_after_change(change: &Change, pos: &mut u64) {
    if change.is_redo {
        for edit in change.edits.iter() {
            position_after_edit(edit, pos);
        }
    } else {
        for edit in change.edits.iter().rev() {
            position_before_edit(edit, pos);
        }
    }
}

/// Shift `pos` across a run of applied changes, in order.
pub fn position_after_changes(changes: &[Change], pos: &mut u64) {
    for change in changes {
        position_after_change(change, pos);
    }
}

/// The per-buffer change log: the commit tree plus the applied-transition
/// vector and the current/saved markers.
pub struct ChangeLog {
    commits: Vec<Commit>,
    pub changes: Vec<Change>,
    current: CommitId,
    saved: Option<CommitId>,
}

impl ChangeLog {
    pub fn new() -> Self {
        ChangeLog {
            commits: vec![Commit {
                id: CommitId::ROOT,
                parent: None,
                children: Vec::new(),
                last_child: None,
                edits: Vec::new().into(),
            }],
            changes: Vec::new(),
            current: CommitId::ROOT,
            saved: Some(CommitId::ROOT),
        }
    }

    pub fn current_commit_id(&self) -> CommitId {
        self.current
    }

    pub fn saved_commit_id(&self) -> Option<CommitId> {
        self.saved
    }

    pub fn commit(&self, id: CommitId) -> &Commit {
        &self.commits[id.0]
    }

    /// Length of the applied-change vector; the `change_index` caches
    /// compare against.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Record a freshly applied commit as a child of the current tip.
    pub fn push_commit(&mut self, edits: Vec<Edit>) -> CommitId {
        let edits: Arc<[Edit]> = edits.into();
        let id = CommitId(self.commits.len());
        let parent = self.current;
        self.commits.push(Commit {
            id,
            parent: Some(parent),
            children: Vec::new(),
            last_child: None,
            edits: edits.clone(),
        });
        let parent_node = &mut self.commits[parent.0];
        parent_node.last_child = Some(parent_node.children.len());
        parent_node.children.push(id);
        self.changes.push(Change {
            edits,
            is_redo: true,
        });
        self.current = id;
        id
    }

    pub fn can_undo(&self) -> bool {
        self.current != CommitId::ROOT
    }

    pub fn can_redo(&self) -> bool {
        !self.commits[self.current.0].children.is_empty()
    }

    /// Walk to the parent commit.  Returns the edits to reverse-apply, or
    /// `None` at the root.
    pub fn undo(&mut self) -> Option<Arc<[Edit]>> {
        let node = &self.commits[self.current.0];
        let parent = node.parent?;
        let edits = node.edits.clone();
        self.current = parent;
        self.changes.push(Change {
            edits: edits.clone(),
            is_redo: false,
        });
        Some(edits)
    }

    /// Walk forward along the most recently taken branch.  Returns the
    /// edits to forward-apply, or `None` at a leaf.
    pub fn redo(&mut self) -> Option<Arc<[Edit]>> {
        let node = &self.commits[self.current.0];
        let child_index = node.last_child.unwrap_or(0);
        let child = *node.children.get(child_index)?;
        let edits = self.commits[child.0].edits.clone();
        self.current = child;
        self.changes.push(Change {
            edits: edits.clone(),
            is_redo: true,
        });
        Some(edits)
    }

    /// Record that the current commit matches the bytes on disk.
    pub fn mark_saved(&mut self) {
        self.saved = Some(self.current);
    }

    /// Forget the save point (the on-disk file diverged).
    pub fn clear_saved(&mut self) {
        self.saved = None;
    }

    pub fn is_unchanged(&self) -> bool {
        self.saved == Some(self.current)
    }

    fn ancestors(&self, mut id: CommitId) -> Vec<CommitId> {
        let mut out = vec![id];
        while let Some(parent) = self.commits[id.0].parent {
            out.push(parent);
            id = parent;
        }
        out
    }

    /// The undo/redo steps from the current commit to `target`: first the
    /// number of undos up to the common ancestor, then the redo path down.
    pub fn path_to(&self, target: CommitId) -> (usize, Vec<CommitId>) {
        let up = self.ancestors(self.current);
        let down = self.ancestors(target);
        let common = *down
            .iter()
            .find(|id| up.contains(id))
            .unwrap_or(&CommitId::ROOT);
        let undos = up.iter().take_while(|id| **id != common).count();
        let mut redo_path: Vec<CommitId> = down
            .iter()
            .take_while(|id| **id != common)
            .copied()
            .collect();
        redo_path.reverse();
        (undos, redo_path)
    }

    /// Point redo at `child` from its parent, so a later `redo` follows it.
    pub fn select_branch(&mut self, parent: CommitId, child: CommitId) {
        let node = &mut self.commits[parent.0];
        if let Some(index) = node.children.iter().position(|c| *c == child) {
            node.last_child = Some(index);
        }
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        ChangeLog::new()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
