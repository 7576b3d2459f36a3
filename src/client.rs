//! Per-client state
//!
//! A client is one attached UI: the window tree, the mini-buffer prompt,
//! the `*client messages*` buffer, the pending key chain, macro recording,
//! the jump ring, and the copy chain synchronized with the system
//! clipboard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::{BufferHandle, BufferId, WeakBufferHandle};
use crate::change::position_after_changes;
use crate::completion::{CompletionCache, CompletionEngine, CompletionFilter};
use crate::editor::Editor;
use crate::error::SkeinError;
use crate::keymap::Key;
use crate::transaction::Transaction;
use crate::window::{WindowId, WindowTree, WindowUnified};

/// How long a message stays on the message line without new input.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MessageLine {
    pub text: String,
    pub since: Instant,
}

pub type PromptCallback = fn(&mut Editor, &mut Client, &str) -> Result<(), SkeinError>;

/// An open mini-buffer prompt.
pub struct Prompt {
    pub label: String,
    pub completion: CompletionCache,
    pub callback: PromptCallback,
    /// Runs every frame with the current mini-buffer text.
    pub interactive: Option<PromptCallback>,
}

/// Copied regions, newest last.  The newest entry mirrors the system
/// clipboard.
#[derive(Default)]
pub struct CopyChain {
    entries: Vec<String>,
}

impl CopyChain {
    pub fn push(&mut self, text: String) {
        if self.entries.last() != Some(&text) {
            self.entries.push(text);
        }
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Jump {
    buffer: WeakBufferHandle,
    position: u64,
    change_index: usize,
}

/// Ring of places the cursor came from, for jump-backward/forward.
#[derive(Default)]
pub struct JumpRing {
    jumps: Vec<Jump>,
    /// Index one past the jump `backward` would go to.
    index: usize,
}

const JUMP_RING_LIMIT: usize = 100;

impl JumpRing {
    pub fn push(&mut self, buffer: &Arc<BufferHandle>, position: u64, change_index: usize) {
        self.jumps.truncate(self.index);
        self.jumps.push(Jump {
            buffer: Arc::downgrade(buffer),
            position,
            change_index,
        });
        if self.jumps.len() > JUMP_RING_LIMIT {
            self.jumps.remove(0);
        }
        self.index = self.jumps.len();
    }

    /// Resolve a jump to its buffer and its position rewritten past any
    /// changes committed since the jump was taken.
    fn resolve(jump: &mut Jump) -> Option<(Arc<BufferHandle>, u64)> {
        let handle = jump.buffer.upgrade()?;
        {
            let buffer = handle.lock_reading();
            let changes = &buffer.changes.changes[jump.change_index.min(buffer.changes.len())..];
            position_after_changes(changes, &mut jump.position);
            jump.position = jump.position.min(buffer.contents.len());
            jump.change_index = buffer.changes.len();
        }
        Some((handle, jump.position))
    }

    pub fn backward(&mut self) -> Option<(Arc<BufferHandle>, u64)> {
        while self.index > 0 {
            self.index -= 1;
            if let Some(resolved) = Self::resolve(&mut self.jumps[self.index]) {
                return Some(resolved);
            }
            self.jumps.remove(self.index);
        }
        None
    }

    pub fn forward(&mut self) -> Option<(Arc<BufferHandle>, u64)> {
        while self.index < self.jumps.len() {
            let jump = &mut self.jumps[self.index];
            if let Some(resolved) = Self::resolve(jump) {
                self.index += 1;
                return Some(resolved);
            }
            self.jumps.remove(self.index);
        }
        None
    }
}

pub struct Client {
    pub windows: WindowTree,
    pub selected_window: WindowId,
    pub mini_buffer: Arc<BufferHandle>,
    pub messages: Arc<BufferHandle>,
    pub message: Option<MessageLine>,
    pub prompt: Option<Prompt>,

    pub key_chain: Vec<Key>,
    pub key_chain_offset: usize,
    pub record_key_presses: bool,
    pub recorded_keys: Vec<Key>,
    pub frozen_macro: Vec<Key>,

    pub jump_ring: JumpRing,
    pub copy_chain: CopyChain,
    pub offscreen_windows: Vec<WindowUnified>,
    pub mouse_pressed: [bool; 5],
    pub quit: bool,

    clipboard: Option<arboard::Clipboard>,
    last_clipboard: String,
}

impl Client {
    pub fn new(
        selected_buffer: Arc<BufferHandle>,
        mini_buffer: Arc<BufferHandle>,
        messages: Arc<BufferHandle>,
    ) -> Client {
        let windows = WindowTree::new(selected_buffer);
        let selected_window = windows.root();
        Client {
            windows,
            selected_window,
            mini_buffer,
            messages,
            message: None,
            prompt: None,
            key_chain: Vec::new(),
            key_chain_offset: 0,
            record_key_presses: false,
            recorded_keys: Vec::new(),
            frozen_macro: Vec::new(),
            jump_ring: JumpRing::default(),
            copy_chain: CopyChain::default(),
            offscreen_windows: Vec::new(),
            mouse_pressed: [false; 5],
            quit: false,
            clipboard: arboard::Clipboard::new().ok(),
            last_clipboard: String::new(),
        }
    }

    pub fn selected_unified(&self) -> &WindowUnified {
        self.windows.unified(self.selected_window)
    }

    pub fn selected_unified_mut(&mut self) -> &mut WindowUnified {
        self.windows.unified_mut(self.selected_window)
    }

    pub fn selected_buffer_handle(&self) -> Arc<BufferHandle> {
        self.selected_unified().buffer.clone()
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Show `text` on the timed message line and append it to the
    /// `*client messages*` buffer.
    pub fn show_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut messages = self.messages.lock_writing();
            let len = messages.contents.len();
            messages.contents.insert(len, text.as_bytes());
            messages.contents.insert(len + text.len() as u64, b"\n");
        }
        self.message = Some(MessageLine {
            text,
            since: Instant::now(),
        });
    }

    /// The message to draw this frame, if it has not timed out.
    pub fn active_message(&self) -> Option<&str> {
        let message = self.message.as_ref()?;
        if message.since.elapsed() < MESSAGE_TIMEOUT {
            Some(&message.text)
        } else {
            None
        }
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    pub fn has_open_prompt(&self) -> bool {
        self.prompt.is_some()
    }

    /// Open a mini-buffer prompt.  The callback runs when the response is
    /// submitted.
    pub fn show_dialog(
        &mut self,
        label: impl Into<String>,
        engine: CompletionEngine,
        filter: CompletionFilter,
        callback: PromptCallback,
    ) {
        {
            let mut mini = self.mini_buffer.lock_writing();
            let len = mini.contents.len();
            if len > 0 {
                let mut transaction = Transaction::init(&mini);
                transaction.remove_range(&mini, 0, len);
                let _ = transaction.commit(&mut mini);
            }
        }
        self.prompt = Some(Prompt {
            label: label.into(),
            completion: CompletionCache::new(engine, filter),
            callback,
            interactive: None,
        });
    }

    pub fn close_prompt(&mut self) {
        self.prompt = None;
    }

    pub fn mini_buffer_text(&self) -> String {
        self.mini_buffer.lock_reading().contents.stringify()
    }

    /// Append a character to the prompt response.
    pub fn mini_buffer_insert(&mut self, c: char) {
        let mut mini = self.mini_buffer.lock_writing();
        let len = mini.contents.len();
        let mut transaction = Transaction::init(&mini);
        transaction.insert(len, c.to_string());
        let _ = transaction.commit(&mut mini);
    }

    /// Delete the last character of the prompt response.
    pub fn mini_buffer_backspace(&mut self) {
        let mut mini = self.mini_buffer.lock_writing();
        let len = mini.contents.len();
        if len == 0 {
            return;
        }
        // Back up over a whole UTF-8 sequence.
        let mut start = len - 1;
        while start > 0 {
            match mini.contents.get(start) {
                Some(byte) if byte & 0xC0 == 0x80 => start -= 1,
                _ => break,
            }
        }
        let mut transaction = Transaction::init(&mini);
        transaction.remove_range(&mini, start, len);
        let _ = transaction.commit(&mut mini);
    }

    pub fn set_mini_buffer_text(&mut self, text: &str) {
        let mut mini = self.mini_buffer.lock_writing();
        let len = mini.contents.len();
        let mut transaction = Transaction::init(&mini);
        if len > 0 {
            transaction.remove_range(&mini, 0, len);
        }
        // Pre-state coordinates: the end of the removed range lands at 0.
        transaction.insert(len, text);
        let _ = transaction.commit(&mut mini);
    }

    // =========================================================================
    // Jumps
    // =========================================================================

    /// Save the current location before a long-distance motion.
    pub fn push_jump(&mut self) {
        let window = self.selected_unified();
        let handle = window.buffer.clone();
        let position = window.selected_cursor().point;
        let change_index = window.change_index;
        self.jump_ring.push(&handle, position, change_index);
    }

    // =========================================================================
    // Window / buffer selection
    // =========================================================================

    /// Select a window already showing `buffer`, or swap the buffer into
    /// the selected window (stashing the old view off-screen so switching
    /// back restores the viewport).  Pinned windows are never repointed;
    /// another leaf is used instead.
    pub fn show_buffer(&mut self, handle: Arc<BufferHandle>, change_index: usize) {
        if self.selected_unified().buffer.id() == handle.id() {
            return;
        }
        if let Some(leaf) = self
            .windows
            .leaves()
            .into_iter()
            .find(|leaf| self.windows.unified(*leaf).buffer.id() == handle.id())
        {
            self.selected_window = leaf;
            return;
        }

        let mut target = self.selected_window;
        if self.windows.unified(target).pinned {
            if let Some(leaf) = self
                .windows
                .leaves()
                .into_iter()
                .find(|leaf| !self.windows.unified(*leaf).pinned)
            {
                target = leaf;
            }
        }
        self.selected_window = target;
        if let Some(index) = self
            .offscreen_windows
            .iter()
            .position(|window| window.buffer.id() == handle.id())
        {
            let stashed = self.offscreen_windows.remove(index);
            let shown = self.windows.swap_in(target, stashed);
            self.offscreen_windows.push(shown);
        } else {
            // Stash a copy of the current view before repointing it.
            let window = self.windows.unified_mut(target);
            let mut stash = WindowUnified::new(WindowId(usize::MAX), window.buffer.clone());
            stash.cursors = window.cursors.clone();
            stash.selected_cursor = window.selected_cursor;
            stash.start_position = window.start_position;
            stash.column_offset = window.column_offset;
            stash.change_index = window.change_index;
            self.offscreen_windows.push(stash);
            window.replace_buffer(handle, change_index);
        }
    }

    /// Drop stashed windows whose buffer died.
    pub fn prune_offscreen(&mut self, live: impl Fn(BufferId) -> bool) {
        self.offscreen_windows
            .retain(|window| live(window.buffer.id()));
    }

    // =========================================================================
    // Clipboard / copy chain
    // =========================================================================

    /// Record a copy and mirror it to the system clipboard.
    pub fn copy(&mut self, text: String) {
        if let Some(clipboard) = &mut self.clipboard {
            let _ = clipboard.set_text(text.clone());
        }
        self.last_clipboard = text.clone();
        self.copy_chain.push(text);
    }

    /// Poll the system clipboard; push a new chain entry when some other
    /// program copied since last frame.
    pub fn sync_clipboard(&mut self) {
        let Some(clipboard) = &mut self.clipboard else {
            return;
        };
        let Ok(text) = clipboard.get_text() else {
            return;
        };
        if text != self.last_clipboard {
            self.last_clipboard = text.clone();
            self.copy_chain.push(text);
        }
    }
}
