//! Buffers
//!
//! A buffer owns one `Contents`, its change log, the tokenizer cache, and
//! a mode describing how it is edited and colorized.  Buffers are reached
//! through reference-counted handles (`handle` module) guarding them with
//! a single-writer / many-reader lock.

pub mod handle;

pub use handle::{BufferHandle, ReadGuard, WeakBufferHandle, WriteGuard};

use std::path::PathBuf;
use std::time::SystemTime;

use crate::change::{self, ChangeLog, CommitId};
use crate::contents::Contents;
use crate::error::{ErrorKind, SkeinError};
use crate::keymap::KeyMap;
use crate::token::{code_tokenizer, default_tokenizer, TokenCache, Tokenizer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    File,
    Directory,
    Temporary,
}

/// How a buffer is edited and colorized.  Per-buffer so directory buffers
/// and prompts can carry their own key maps.
pub struct Mode {
    pub tokenizer: Tokenizer,
    pub indent_width: u32,
    pub wrap_long_lines: bool,
    pub key_map: KeyMap,
    pub completion_key_map: KeyMap,
}

impl Mode {
    pub fn plain() -> Mode {
        Mode {
            tokenizer: default_tokenizer,
            indent_width: 4,
            wrap_long_lines: false,
            key_map: KeyMap::new(),
            completion_key_map: KeyMap::new(),
        }
    }

    pub fn code() -> Mode {
        Mode {
            tokenizer: code_tokenizer,
            ..Mode::plain()
        }
    }
}

pub struct Buffer {
    pub id: BufferId,
    /// Display name: file name for FILE buffers, `*name*` for TEMPORARY.
    pub name: String,
    /// Directory the buffer is anchored in, if any.
    pub directory: Option<PathBuf>,
    pub kind: BufferKind,
    pub read_only: bool,
    /// Detected on first load; saving re-adds `\r` when set.
    pub use_carriage_returns: bool,
    /// Modification time of the backing file at last load/save.
    pub file_time: Option<SystemTime>,
    pub contents: Contents,
    pub changes: ChangeLog,
    pub token_cache: TokenCache,
    pub mode: Mode,
}

impl Buffer {
    pub fn new_file(id: BufferId, name: String, directory: Option<PathBuf>) -> Buffer {
        Buffer {
            id,
            name,
            directory,
            kind: BufferKind::File,
            read_only: false,
            use_carriage_returns: false,
            file_time: None,
            contents: Contents::new(),
            changes: ChangeLog::new(),
            token_cache: TokenCache::new(),
            mode: Mode::code(),
        }
    }

    pub fn new_temporary(id: BufferId, name: &str, directory: Option<PathBuf>) -> Buffer {
        Buffer {
            name: format!("*{}*", name),
            kind: BufferKind::Temporary,
            mode: Mode::plain(),
            ..Buffer::new_file(id, String::new(), directory)
        }
    }

    pub fn new_directory(id: BufferId, directory: PathBuf) -> Buffer {
        Buffer {
            kind: BufferKind::Directory,
            read_only: true,
            mode: Mode::plain(),
            ..Buffer::new_file(id, String::new(), Some(directory))
        }
    }

    /// Full path of the backing file, if any.
    pub fn path(&self) -> Option<PathBuf> {
        match self.kind {
            BufferKind::File => Some(match &self.directory {
                Some(directory) => directory.join(&self.name),
                None => PathBuf::from(&self.name),
            }),
            BufferKind::Directory => self.directory.clone(),
            BufferKind::Temporary => None,
        }
    }

    /// Name shown in mode lines and buffer switchers.
    pub fn render_name(&self) -> String {
        match self.kind {
            BufferKind::File | BufferKind::Temporary => match &self.directory {
                Some(directory) => format!("{} ({})", self.name, directory.display()),
                None => self.name.clone(),
            },
            BufferKind::Directory => match &self.directory {
                Some(directory) => format!("{}/", directory.display()),
                None => self.name.clone(),
            },
        }
    }

    /// Replace the contents wholesale without recording history.  Only for
    /// freshly created or reloaded buffers.
    pub fn set_text(&mut self, text: &str) {
        self.contents = Contents::from_str(text);
        self.token_cache.reset(self.changes.len());
    }

    /// Walk one commit toward the root, reversing its edits.
    pub fn undo(&mut self) -> bool {
        let Some(edits) = self.changes.undo() else {
            return false;
        };
        for edit in edits.iter().rev() {
            // Commits only enter the log after applying cleanly, so
            // reversal cannot fail.
            let _ = change::unapply_edit(&mut self.contents, edit);
        }
        true
    }

    /// Walk one commit forward along the most recently taken branch.
    pub fn redo(&mut self) -> bool {
        let Some(edits) = self.changes.redo() else {
            return false;
        };
        for edit in edits.iter() {
            let _ = change::apply_edit(&mut self.contents, edit);
        }
        true
    }

    pub fn mark_saved(&mut self) {
        self.changes.mark_saved();
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_unchanged()
    }

    /// Undo/redo until the contents equal the last save point.  Returns
    /// false when there is no reachable save point.
    pub fn restore_last_save_point(&mut self) -> bool {
        let Some(saved) = self.changes.saved_commit_id() else {
            return false;
        };
        let (undos, redo_path) = self.changes.path_to(saved);
        for _ in 0..undos {
            if !self.undo() {
                return false;
            }
        }
        for commit in redo_path {
            let parent = self.changes.current_commit_id();
            self.changes.select_branch(parent, commit);
            if !self.redo() {
                return false;
            }
        }
        debug_assert!(self.is_unchanged());
        true
    }

    /// Bring the token cache up to date.  Returns false when the cache
    /// tail was discarded and asynchronous re-highlighting should run.
    pub fn update_token_cache(&mut self) -> bool {
        let mut cache = std::mem::take(&mut self.token_cache);
        let valid = cache.update(&self.contents, &self.changes.changes, self.mode.tokenizer);
        self.token_cache = cache;
        valid
    }

    /// Extend the token cache to cover `pos`.
    pub fn generate_check_points_until(&mut self, pos: u64) {
        let mut cache = std::mem::take(&mut self.token_cache);
        cache.generate_check_points_until(&self.contents, self.mode.tokenizer, pos);
        self.token_cache = cache;
    }

    /// Absolute position of 1-based `line`/`column`, clamped to the line
    /// and buffer ends.
    pub fn position_of_line_column(&self, line: u64, column: u64) -> u64 {
        let line = line
            .saturating_sub(1)
            .min(self.contents.line_count().saturating_sub(1));
        let start = self.contents.line_start(line);
        let end = {
            let mut iterator = self.contents.iterator_at(start);
            iterator.end_of_line();
            iterator.position()
        };
        (start + column.saturating_sub(1)).min(end)
    }

    pub fn current_commit_id(&self) -> CommitId {
        self.changes.current_commit_id()
    }

    /// Refuse edits on read-only buffers.
    pub fn check_writable(&self) -> Result<(), SkeinError> {
        if self.read_only {
            Err(SkeinError::new(
                ErrorKind::Edit,
                "READ_ONLY",
                format!("buffer {} is read only", self.render_name()),
            ))
        } else {
            Ok(())
        }
    }
}
