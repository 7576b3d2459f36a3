//! Terminal backend abstraction
//!
//! The render pipeline produces cell batches; a backend blits them and
//! turns host input into `Key`s.  Only the crossterm backend ships in
//! this crate; GUI backends implement the same trait out of tree.

pub mod crossterm;

pub use self::crossterm::CrosstermBackend;

use std::time::Duration;

use crate::keymap::Key;
use crate::screen::CellBatch;

/// One host event, already translated to editor vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    Key(Key),
    /// Key released; only mouse buttons are reported.
    Release(Key),
    /// New size in (rows, cols).
    Resize(u16, u16),
}

pub trait TerminalBackend {
    /// Enter raw mode / alternate screen.  Nothing may write to stdout
    /// after this until `deinit`.
    fn init(&mut self) -> anyhow::Result<()>;

    /// Restore the terminal.  Must be safe to call twice.
    fn deinit(&mut self);

    /// Wait up to `timeout` for one event.
    fn poll_event(&mut self, timeout: Duration) -> anyhow::Result<Option<BackendEvent>>;

    /// Current size as (rows, cols).
    fn size(&self) -> anyhow::Result<(u16, u16)>;

    /// Blit changed cells.
    fn draw(&mut self, batches: &[CellBatch]) -> anyhow::Result<()>;

    /// Park the hardware cursor (after drawing a frame).
    fn place_cursor(&mut self, row: u16, col: u16) -> anyhow::Result<()>;
}
