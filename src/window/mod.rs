//! The window tree
//!
//! Windows form a binary tree: UNIFIED leaves show a buffer through a
//! cursor set and viewport, split nodes divide their rectangle between two
//! children with a one-cell separator.  Nodes live in an id-keyed arena;
//! parent links are plain ids, so the tree owns its children and never the
//! other way around.

use std::sync::Arc;

use crate::buffer::{Buffer, BufferHandle};
use crate::change::position_after_changes;
use crate::completion::CompletionCache;
use crate::cursor::{self, Cursor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub usize);

/// `Vertical` puts children side by side (vertical separator column);
/// `Horizontal` stacks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitDirection {
    Vertical,
    Horizontal,
}

/// A leaf window: one buffer, one cursor set, one viewport.
pub struct WindowUnified {
    pub id: WindowId,
    pub parent: Option<WindowId>,
    pub buffer: Arc<BufferHandle>,
    pub cursors: Vec<Cursor>,
    pub selected_cursor: usize,
    /// Byte offset of the first glyph drawn.
    pub start_position: u64,
    /// Horizontal scroll, in columns.
    pub column_offset: u64,
    /// Change-log length of `buffer` the cursors were last updated to.
    pub change_index: usize,
    /// Inline completion state, if a completion session is open.
    pub completion: Option<CompletionCache>,
    pub show_marks: bool,
    /// Pinned windows are skipped when a command wants to reuse a window
    /// for another buffer.
    pub pinned: bool,
    pub total_rows: u16,
    pub total_cols: u16,
}

impl WindowUnified {
    pub fn new(id: WindowId, buffer: Arc<BufferHandle>) -> WindowUnified {
        WindowUnified {
            id,
            parent: None,
            buffer,
            cursors: vec![Cursor::at(0)],
            selected_cursor: 0,
            start_position: 0,
            column_offset: 0,
            change_index: 0,
            completion: None,
            show_marks: false,
            pinned: false,
            total_rows: 0,
            total_cols: 0,
        }
    }

    pub fn selected_cursor(&self) -> &Cursor {
        &self.cursors[self.selected_cursor]
    }

    pub fn selected_cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursors[self.selected_cursor]
    }

    /// Rows available for buffer text (one row is the mode line).
    pub fn text_rows(&self) -> u16 {
        self.total_rows.saturating_sub(1)
    }

    /// Replay unseen changes over every cursor and the scroll anchor,
    /// then clamp, sort, and dedup.
    pub fn update_cursors(&mut self, buffer: &Buffer) {
        debug_assert_eq!(buffer.id, self.buffer.id());
        let changes = &buffer.changes.changes[self.change_index.min(buffer.changes.len())..];
        if !changes.is_empty() {
            for cursor in &mut self.cursors {
                position_after_changes(changes, &mut cursor.point);
                position_after_changes(changes, &mut cursor.mark);
            }
            position_after_changes(changes, &mut self.start_position);
        }
        self.change_index = buffer.changes.len();

        let len = buffer.contents.len();
        for cursor in &mut self.cursors {
            cursor.point = cursor.point.min(len);
            cursor.mark = cursor.mark.min(len);
        }
        self.start_position = self.start_position.min(len);

        cursor::sort_cursors(&mut self.cursors, &mut self.selected_cursor);
        cursor::dedup_cursors(&mut self.cursors, &mut self.selected_cursor);
    }

    /// Retain only the selected cursor.
    pub fn kill_extra_cursors(&mut self) {
        let selected = self.cursors[self.selected_cursor];
        self.cursors.clear();
        self.cursors.push(selected);
        self.selected_cursor = 0;
        self.show_marks &= selected.has_region();
    }

    /// Point this window at a different buffer, resetting per-buffer
    /// state.  `change_index` is the new buffer's change-log length; it is
    /// passed in so callers already holding the buffer lock do not
    /// re-acquire it.
    pub fn replace_buffer(&mut self, buffer: Arc<BufferHandle>, change_index: usize) {
        self.buffer = buffer;
        self.cursors = vec![Cursor::at(0)];
        self.selected_cursor = 0;
        self.start_position = 0;
        self.column_offset = 0;
        self.change_index = change_index;
        self.completion = None;
        self.show_marks = false;
    }
}

/// An interior split node.
pub struct WindowSplit {
    pub id: WindowId,
    pub parent: Option<WindowId>,
    pub direction: SplitDirection,
    pub first: WindowId,
    pub second: WindowId,
    /// Fused splits close together when one side is closed.
    pub fused: bool,
    pub total_rows: u16,
    pub total_cols: u16,
}

pub enum WindowNode {
    Unified(WindowUnified),
    Split(WindowSplit),
}

impl WindowNode {
    pub fn id(&self) -> WindowId {
        match self {
            WindowNode::Unified(window) => window.id,
            WindowNode::Split(split) => split.id,
        }
    }

    pub fn parent(&self) -> Option<WindowId> {
        match self {
            WindowNode::Unified(window) => window.parent,
            WindowNode::Split(split) => split.parent,
        }
    }

    fn set_parent(&mut self, parent: Option<WindowId>) {
        match self {
            WindowNode::Unified(window) => window.parent = parent,
            WindowNode::Split(split) => split.parent = parent,
        }
    }
}

/// Arena of window nodes plus the root of the visible tree.
pub struct WindowTree {
    nodes: Vec<Option<WindowNode>>,
    root: WindowId,
}

impl WindowTree {
    /// A tree with a single unified window on `buffer`.
    pub fn new(buffer: Arc<BufferHandle>) -> WindowTree {
        let mut tree = WindowTree {
            nodes: Vec::new(),
            root: WindowId(0),
        };
        let root = tree.alloc_unified(buffer);
        tree.root = root;
        tree
    }

    pub fn root(&self) -> WindowId {
        self.root
    }

    fn alloc(&mut self, node: WindowNode) -> WindowId {
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                let id = WindowId(index);
                *slot = Some(node);
                return id;
            }
        }
        self.nodes.push(Some(node));
        WindowId(self.nodes.len() - 1)
    }

    fn alloc_unified(&mut self, buffer: Arc<BufferHandle>) -> WindowId {
        let id = WindowId(self.nodes.iter().position(|slot| slot.is_none()).unwrap_or(self.nodes.len()));
        let window = WindowUnified::new(id, buffer);
        self.alloc_at(id, WindowNode::Unified(window))
    }

    fn alloc_at(&mut self, id: WindowId, node: WindowNode) -> WindowId {
        if id.0 == self.nodes.len() {
            self.nodes.push(Some(node));
        } else {
            debug_assert!(self.nodes[id.0].is_none());
            self.nodes[id.0] = Some(node);
        }
        id
    }

    pub fn get(&self, id: WindowId) -> &WindowNode {
        self.nodes[id.0].as_ref().expect("window id is live")
    }

    pub fn get_mut(&mut self, id: WindowId) -> &mut WindowNode {
        self.nodes[id.0].as_mut().expect("window id is live")
    }

    pub fn unified(&self, id: WindowId) -> &WindowUnified {
        match self.get(id) {
            WindowNode::Unified(window) => window,
            WindowNode::Split(_) => panic!("window {:?} is a split", id),
        }
    }

    pub fn unified_mut(&mut self, id: WindowId) -> &mut WindowUnified {
        match self.get_mut(id) {
            WindowNode::Unified(window) => window,
            WindowNode::Split(_) => panic!("window {:?} is a split", id),
        }
    }

    /// All unified windows, leftmost first.
    pub fn leaves(&self) -> Vec<WindowId> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, &mut out);
        out
    }

    fn collect_leaves(&self, id: WindowId, out: &mut Vec<WindowId>) {
        match self.get(id) {
            WindowNode::Unified(_) => out.push(id),
            WindowNode::Split(split) => {
                self.collect_leaves(split.first, out);
                self.collect_leaves(split.second, out);
            }
        }
    }

    /// First unified descendant of `id`.
    pub fn first_leaf(&self, mut id: WindowId) -> WindowId {
        loop {
            match self.get(id) {
                WindowNode::Unified(_) => return id,
                WindowNode::Split(split) => id = split.first,
            }
        }
    }

    /// The leaf after `id` in tree order, wrapping around.
    pub fn cycle_next(&self, id: WindowId) -> WindowId {
        let leaves = self.leaves();
        let index = leaves.iter().position(|leaf| *leaf == id).unwrap_or(0);
        leaves[(index + 1) % leaves.len()]
    }

    /// Replace the leaf `target` with a split holding `target` and a new
    /// window on the same buffer.  Returns the new leaf's id.
    pub fn split(&mut self, target: WindowId, direction: SplitDirection) -> WindowId {
        let (buffer, cursors, selected_cursor, start_position, parent) = {
            let window = self.unified(target);
            (
                window.buffer.clone(),
                window.cursors.clone(),
                window.selected_cursor,
                window.start_position,
                window.parent,
            )
        };

        let sibling = self.alloc_unified(buffer);
        {
            let change_index = self.unified(target).change_index;
            let new_window = self.unified_mut(sibling);
            new_window.cursors = cursors;
            new_window.selected_cursor = selected_cursor;
            new_window.start_position = start_position;
            new_window.change_index = change_index;
        }

        let split = self.alloc(WindowNode::Split(WindowSplit {
            id: WindowId(0), // patched below
            parent,
            direction,
            first: target,
            second: sibling,
            fused: false,
            total_rows: 0,
            total_cols: 0,
        }));
        if let WindowNode::Split(node) = self.get_mut(split) {
            node.id = split;
        }

        // Patch the grandparent's child pointer.
        match parent {
            Some(grandparent) => self.replace_child(grandparent, target, split),
            None => self.root = split,
        }
        self.get_mut(target).set_parent(Some(split));
        self.get_mut(sibling).set_parent(Some(split));

        sibling
    }

    fn replace_child(&mut self, parent: WindowId, old: WindowId, new: WindowId) {
        if let WindowNode::Split(split) = self.get_mut(parent) {
            if split.first == old {
                split.first = new;
            } else {
                debug_assert_eq!(split.second, old);
                split.second = new;
            }
        }
    }

    /// Detach the leaf `id`, promoting its sibling.  Returns the detached
    /// window for the off-screen stash, or `None` for the last window.
    pub fn close(&mut self, id: WindowId) -> Option<WindowUnified> {
        let parent = self.get(id).parent()?;
        let (sibling, grandparent) = {
            let WindowNode::Split(split) = self.get(parent) else {
                unreachable!("parent of a leaf is a split");
            };
            let sibling = if split.first == id {
                split.second
            } else {
                split.first
            };
            (sibling, split.parent)
        };

        self.get_mut(sibling).set_parent(grandparent);
        match grandparent {
            Some(node) => self.replace_child(node, parent, sibling),
            None => self.root = sibling,
        }

        self.nodes[parent.0] = None;
        let node = self.nodes[id.0].take().expect("window id is live");
        match node {
            WindowNode::Unified(mut window) => {
                window.parent = None;
                Some(window)
            }
            WindowNode::Split(_) => unreachable!("close target is a leaf"),
        }
    }

    /// Re-insert a stashed window in place of `target`, returning the
    /// window that was shown there.
    pub fn swap_in(&mut self, target: WindowId, mut window: WindowUnified) -> WindowUnified {
        window.parent = self.get(target).parent();
        window.id = target;
        let node = std::mem::replace(
            self.nodes[target.0].as_mut().expect("window id is live"),
            WindowNode::Unified(window),
        );
        match node {
            WindowNode::Unified(old) => old,
            WindowNode::Split(_) => panic!("swap_in target is a leaf"),
        }
    }

    /// Assign rectangle sizes: each split divides its rectangle between
    /// children with a one-cell separator on the split axis.
    pub fn set_size(&mut self, rows: u16, cols: u16) {
        self.set_size_inner(self.root, rows, cols);
    }

    fn set_size_inner(&mut self, id: WindowId, rows: u16, cols: u16) {
        match self.get_mut(id) {
            WindowNode::Unified(window) => {
                window.total_rows = rows;
                window.total_cols = cols;
            }
            WindowNode::Split(split) => {
                split.total_rows = rows;
                split.total_cols = cols;
                let (first, second, direction) = (split.first, split.second, split.direction);
                match direction {
                    SplitDirection::Vertical => {
                        let left = cols.saturating_sub(1) / 2;
                        let right = cols.saturating_sub(1) - left;
                        self.set_size_inner(first, rows, left);
                        self.set_size_inner(second, rows, right);
                    }
                    SplitDirection::Horizontal => {
                        let top = rows.saturating_sub(1) / 2;
                        let bottom = rows.saturating_sub(1) - top;
                        self.set_size_inner(first, top, cols);
                        self.set_size_inner(second, bottom, cols);
                    }
                }
            }
        }
    }

    pub fn window_count(&self) -> usize {
        self.leaves().len()
    }
}
