//! Double-buffered cell grid
//!
//! The render pipeline writes a frame of cells; the back-end draws only
//! the cells that differ from the previous frame.  The first frame after
//! creation or a resize is always a full redraw.

use unicode_width::UnicodeWidthChar;

use crate::theme::Style;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub style: Style,
}

impl Cell {
    pub fn empty() -> Cell {
        Cell {
            ch: ' ',
            style: Style::default(),
        }
    }
}

/// A run of consecutive changed cells on one row.
#[derive(Debug)]
pub struct CellBatch {
    pub row: u16,
    pub start_col: u16,
    pub cells: Vec<Cell>,
}

pub struct ScreenBuffer {
    current: Vec<Vec<Cell>>,
    previous: Vec<Vec<Cell>>,
    rows: u16,
    cols: u16,
    force_full_redraw: bool,
}

impl ScreenBuffer {
    pub fn new(rows: u16, cols: u16) -> ScreenBuffer {
        ScreenBuffer {
            current: vec![vec![Cell::empty(); cols as usize]; rows as usize],
            previous: vec![vec![Cell::empty(); cols as usize]; rows as usize],
            rows,
            cols,
            force_full_redraw: true,
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Drop both frames and force a full redraw at the new size.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        *self = ScreenBuffer::new(rows, cols);
    }

    /// Fill the whole current frame.
    pub fn clear(&mut self, style: Style) {
        for row in &mut self.current {
            for cell in row {
                *cell = Cell { ch: ' ', style };
            }
        }
    }

    pub fn set(&mut self, row: u16, col: u16, ch: char, style: Style) {
        if row < self.rows && col < self.cols {
            self.current[row as usize][col as usize] = Cell { ch, style };
        }
    }

    pub fn get(&self, row: u16, col: u16) -> Option<&Cell> {
        self.current
            .get(row as usize)
            .and_then(|cells| cells.get(col as usize))
    }

    /// Write `text` starting at `(row, col)`, clipped to `max_col`
    /// (exclusive).  Returns the column after the last cell written.
    /// Wide glyphs occupy their width; control characters render as `?`.
    pub fn write_str(&mut self, row: u16, col: u16, text: &str, style: Style, max_col: u16) -> u16 {
        let mut col = col;
        for ch in text.chars() {
            if col >= max_col {
                break;
            }
            let ch = if ch.is_control() { '?' } else { ch };
            let width = ch.width().unwrap_or(1).max(1) as u16;
            self.set(row, col, ch, style);
            // Wide characters own their trailing columns.
            for extra in 1..width {
                self.set(row, col + extra, ' ', style);
            }
            col = col.saturating_add(width);
        }
        col
    }

    /// Batches of changed cells since the last `present`.
    pub fn diff(&self) -> Vec<CellBatch> {
        let mut batches = Vec::new();
        for row in 0..self.rows as usize {
            let mut open: Option<CellBatch> = None;
            for col in 0..self.cols as usize {
                let changed =
                    self.force_full_redraw || self.current[row][col] != self.previous[row][col];
                if changed {
                    let cell = self.current[row][col].clone();
                    match &mut open {
                        Some(batch) => batch.cells.push(cell),
                        None => {
                            open = Some(CellBatch {
                                row: row as u16,
                                start_col: col as u16,
                                cells: vec![cell],
                            });
                        }
                    }
                } else if let Some(batch) = open.take() {
                    batches.push(batch);
                }
            }
            if let Some(batch) = open.take() {
                batches.push(batch);
            }
        }
        batches
    }

    /// Promote the current frame to previous.
    pub fn present(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        // The stale frame becomes the canvas for the next one.
        for (current_row, previous_row) in self.current.iter_mut().zip(&self.previous) {
            current_row.clone_from_slice(previous_row);
        }
        self.force_full_redraw = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_full_redraw() {
        let screen = ScreenBuffer::new(2, 3);
        let batches = screen.diff();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].cells.len(), 3);
    }

    #[test]
    fn test_diff_only_changed_cells() {
        let mut screen = ScreenBuffer::new(2, 10);
        screen.present();

        screen.set(1, 4, 'x', Style::default());
        screen.set(1, 5, 'y', Style::default());
        let batches = screen.diff();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].row, 1);
        assert_eq!(batches[0].start_col, 4);
        assert_eq!(batches[0].cells.len(), 2);
    }

    #[test]
    fn test_write_str_clips_at_max_col() {
        let mut screen = ScreenBuffer::new(1, 10);
        let end = screen.write_str(0, 6, "abcdef", Style::default(), 8);
        assert_eq!(end, 8);
        assert_eq!(screen.get(0, 6).unwrap().ch, 'a');
        assert_eq!(screen.get(0, 7).unwrap().ch, 'b');
        assert_eq!(screen.get(0, 8).unwrap().ch, ' ');
    }

    #[test]
    fn test_present_resets_diff() {
        let mut screen = ScreenBuffer::new(1, 4);
        screen.set(0, 0, 'z', Style::default());
        screen.present();
        assert!(screen.diff().is_empty());
    }

    #[test]
    fn test_resize_forces_full_redraw() {
        let mut screen = ScreenBuffer::new(1, 2);
        screen.present();
        assert!(screen.diff().is_empty());
        screen.resize(2, 2);
        assert_eq!(screen.diff().len(), 2);
    }
}
