//! The render pipeline
//!
//! Every frame walks the window tree, brings each visible window's cursors
//! and token cache up to date, computes the viewport (scroll margins,
//! half-page jumps, horizontal grace, animated scrolling), and writes
//! styled cells into the screen buffer.  The bottom row belongs to the
//! mini-buffer prompt or the timed message line; the completion popup
//! stacks above it.

pub mod cache;

pub use cache::{AnimatedScroll, WindowCache, WindowCaches};

use std::time::Instant;

use crate::buffer::Buffer;
use crate::client::Client;
use crate::editor::Editor;
use crate::screen::ScreenBuffer;
use crate::theme::Theme;
use crate::token::Token;
use crate::window::{SplitDirection, WindowId, WindowNode};

#[derive(Clone, Copy, Debug)]
struct Rect {
    row: u16,
    col: u16,
    rows: u16,
    cols: u16,
}

/// Render one frame into `screen`.
pub fn render_frame(
    screen: &mut ScreenBuffer,
    editor: &mut Editor,
    client: &mut Client,
    caches: &mut WindowCaches,
    now: Instant,
) {
    let total_rows = screen.rows();
    let total_cols = screen.cols();
    if total_rows < 2 || total_cols < 2 {
        return;
    }

    screen.clear(editor.theme.default_style);

    // Bottom row is the mini-buffer / message line.
    let tree_rows = total_rows - 1;
    client.windows.set_size(tree_rows, total_cols);
    caches.retain_windows(&client.windows.leaves());

    let root = client.windows.root();
    render_node(
        screen,
        editor,
        client,
        caches,
        root,
        Rect {
            row: 0,
            col: 0,
            rows: tree_rows,
            cols: total_cols,
        },
        now,
    );

    render_bottom_line(screen, editor, client, total_rows - 1, total_cols);
}

fn render_node(
    screen: &mut ScreenBuffer,
    editor: &mut Editor,
    client: &mut Client,
    caches: &mut WindowCaches,
    id: WindowId,
    rect: Rect,
    now: Instant,
) {
    match client.windows.get(id) {
        WindowNode::Unified(_) => {
            let selected = client.selected_window == id;
            render_unified(screen, editor, client, caches, id, rect, selected, now);
        }
        WindowNode::Split(split) => {
            let direction = split.direction;
            let (first, second) = (split.first, split.second);
            match direction {
                SplitDirection::Vertical => {
                    let left = rect.cols.saturating_sub(1) / 2;
                    let right = rect.cols.saturating_sub(1) - left;
                    let separator_col = rect.col + left;
                    for row in rect.row..rect.row + rect.rows {
                        screen.set(row, separator_col, '|', editor.theme.separator_style);
                    }
                    render_node(
                        screen,
                        editor,
                        client,
                        caches,
                        first,
                        Rect { cols: left, ..rect },
                        now,
                    );
                    render_node(
                        screen,
                        editor,
                        client,
                        caches,
                        second,
                        Rect {
                            col: separator_col + 1,
                            cols: right,
                            ..rect
                        },
                        now,
                    );
                }
                SplitDirection::Horizontal => {
                    let top = rect.rows.saturating_sub(1) / 2;
                    let bottom = rect.rows.saturating_sub(1) - top;
                    let separator_row = rect.row + top;
                    for col in rect.col..rect.col + rect.cols {
                        screen.set(separator_row, col, '-', editor.theme.separator_style);
                    }
                    render_node(
                        screen,
                        editor,
                        client,
                        caches,
                        first,
                        Rect { rows: top, ..rect },
                        now,
                    );
                    render_node(
                        screen,
                        editor,
                        client,
                        caches,
                        second,
                        Rect {
                            row: separator_row + 1,
                            rows: bottom,
                            ..rect
                        },
                        now,
                    );
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render_unified(
    screen: &mut ScreenBuffer,
    editor: &mut Editor,
    client: &mut Client,
    caches: &mut WindowCaches,
    id: WindowId,
    rect: Rect,
    selected: bool,
    now: Instant,
) {
    if rect.rows < 1 {
        return;
    }
    let handle = client.windows.unified(id).buffer.clone();

    // Lock contention is resolved by waiting a frame, never by blocking:
    // prefer a write lock so the token cache can be updated, fall back to
    // read-only drawing, and give up until next frame otherwise.
    enum Guard<'a> {
        Write(crate::buffer::WriteGuard<'a>),
        Read(crate::buffer::ReadGuard<'a>),
    }
    let guard = if let Some(mut write) = handle.try_lock_writing() {
        if !write.update_token_cache() {
            editor.schedule_syntax_highlight(&handle);
        }
        Guard::Write(write)
    } else if let Some(read) = handle.try_lock_reading() {
        Guard::Read(read)
    } else {
        return;
    };

    {
        let window = client.windows.unified_mut(id);
        let buffer: &Buffer = match &guard {
            Guard::Write(write) => write,
            Guard::Read(read) => read,
        };
        window.update_cursors(buffer);
    }

    let cache = caches.validate(id, handle.id());
    let window = client.windows.unified_mut(id);
    let text_rows = rect.rows.saturating_sub(1);

    let (draw_start, draw_end);
    {
        let buffer: &Buffer = match &guard {
            Guard::Write(write) => write,
            Guard::Read(read) => read,
        };
        let viewport = compute_viewport(buffer, window, cache, &editor.theme, text_rows, now);
        draw_start = viewport.0;
        draw_end = viewport.1;
    }

    // Make sure the visible region is tokenized before drawing it.
    let mut guard = guard;
    if let Guard::Write(write) = &mut guard {
        if !write.token_cache.is_covered(draw_end) {
            write.generate_check_points_until(draw_end);
        }
    }

    let buffer: &Buffer = match &guard {
        Guard::Write(write) => write,
        Guard::Read(read) => read,
    };

    cache.change_index = buffer.changes.len();
    cache.visible_start = draw_start;
    cache.visible_end = draw_end;
    cache.cursor_count = window.cursors.len();
    cache.selected_cursor_mark = window.selected_cursor().mark;

    draw_buffer_text(screen, buffer, window, &editor.theme, rect, draw_start, text_rows);
    draw_cursors_and_regions(
        screen,
        buffer,
        window,
        &editor.theme,
        rect,
        draw_start,
        text_rows,
        selected,
    );
    draw_mode_line(screen, buffer, window, &editor.theme, rect, selected);
    draw_window_completion(screen, window, &editor.theme, rect);
}

/// Compute `(draw_start, draw_end)` for this frame, updating the window's
/// logical anchor and the animation record.
fn compute_viewport(
    buffer: &Buffer,
    window: &mut crate::window::WindowUnified,
    cache: &mut WindowCache,
    theme: &Theme,
    text_rows: u16,
    now: Instant,
) -> (u64, u64) {
    let contents = &buffer.contents;
    let text_rows = text_rows.max(1) as u64;
    let cursor = *window.selected_cursor();
    let cursor_line = contents.get_line_number(cursor.point);
    let start_line = contents.get_line_number(window.start_position);

    let margin = (theme.scroll_outside_visual_rows as u64).min(text_rows.saturating_sub(1) / 2);

    let mut target_line = start_line;
    if cursor_line < start_line + margin {
        target_line = cursor_line.saturating_sub(margin);
    } else if cursor_line + 1 + margin > start_line + text_rows {
        target_line = cursor_line + 1 + margin - text_rows;
    }

    if target_line != start_line && theme.scroll_jump_half_page_when_outside_visible_region {
        // Snap so the cursor lands mid-window.
        target_line = cursor_line.saturating_sub(text_rows / 2);
    }

    // Newly added cursors above the selected one should be visible too.
    if window.cursors.len() > cache.cursor_count {
        let first_line = contents.get_line_number(window.cursors[0].point);
        if first_line < target_line && cursor_line - first_line < text_rows {
            target_line = first_line;
        }
    }

    // A freshly moved mark is worth scrolling for when regions are shown.
    if window.show_marks && cursor.mark != cache.selected_cursor_mark {
        let mark_line = contents.get_line_number(cursor.mark);
        if mark_line < target_line && cursor_line - mark_line < text_rows {
            target_line = mark_line;
        }
    }

    // Horizontal: keep the cursor within the column grace band.
    if buffer.mode.wrap_long_lines {
        window.column_offset = 0;
    } else {
        let line_begin = contents.line_start(cursor_line);
        let cursor_col = cursor.point - line_begin;
        let grace = theme.scroll_outside_visual_columns as u64;
        let cols = window.total_cols.max(1) as u64;
        if cursor_col < window.column_offset + grace {
            window.column_offset = cursor_col.saturating_sub(grace);
        } else if cursor_col + 1 + grace > window.column_offset + cols {
            window.column_offset = cursor_col + 1 + grace - cols;
        }
    }

    let target_position = contents.line_start(target_line);
    window.start_position = target_position;

    let draw_line = cache.animate_toward(
        now,
        start_line,
        target_line,
        target_position,
        theme.allow_animated_scrolling,
    );
    let draw_start = contents.line_start(draw_line);
    let draw_end = contents.line_start(draw_line + text_rows);
    (draw_start, draw_end)
}

fn draw_buffer_text(
    screen: &mut ScreenBuffer,
    buffer: &Buffer,
    window: &crate::window::WindowUnified,
    theme: &Theme,
    rect: Rect,
    draw_start: u64,
    text_rows: u16,
) {
    let contents = &buffer.contents;
    let start_line = contents.get_line_number(draw_start);
    let draw_end = contents.line_start(start_line + text_rows as u64);
    let tokens: Vec<Token> = if buffer.token_cache.is_covered(draw_start) {
        buffer
            .token_cache
            .tokens_in(contents, buffer.mode.tokenizer, draw_start, draw_end)
    } else {
        Vec::new()
    };
    let mut token_index = 0;

    let mut iterator = contents.iterator_at(draw_start);
    let mut row = rect.row;
    let mut col_in_line: u64 = 0;
    let max_row = rect.row + text_rows;
    while !iterator.at_eob() && row < max_row {
        let pos = iterator.position();
        let byte = iterator.get();
        iterator.advance();

        if byte == b'\n' {
            row += 1;
            col_in_line = 0;
            continue;
        }

        while token_index < tokens.len() && tokens[token_index].end <= pos {
            token_index += 1;
        }
        let style = tokens
            .get(token_index)
            .filter(|token| token.start <= pos && pos < token.end)
            .map(|token| theme.token_style(token.kind))
            .unwrap_or(theme.default_style);

        if col_in_line >= window.column_offset {
            let col = (col_in_line - window.column_offset) as u16;
            if col < rect.cols {
                let ch = match byte {
                    b'\t' => ' ',
                    byte if byte.is_ascii_graphic() || byte == b' ' => byte as char,
                    // Multi-byte sequences draw one placeholder per byte;
                    // the terminal back-end owns real width handling.
                    byte if byte >= 0x80 => byte as char,
                    _ => '?',
                };
                screen.set(row, rect.col + col, ch, style);
            }
        }
        col_in_line += if byte == b'\t' {
            buffer.mode.indent_width as u64
        } else {
            1
        };
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_cursors_and_regions(
    screen: &mut ScreenBuffer,
    buffer: &Buffer,
    window: &crate::window::WindowUnified,
    theme: &Theme,
    rect: Rect,
    draw_start: u64,
    text_rows: u16,
    selected: bool,
) {
    let contents = &buffer.contents;
    let start_line = contents.get_line_number(draw_start);
    let end_line = start_line + text_rows as u64;

    let cell_of = |pos: u64| -> Option<(u16, u16)> {
        let line = contents.get_line_number(pos);
        if line < start_line || line >= end_line {
            return None;
        }
        let col_in_line = pos - contents.line_start(line);
        if col_in_line < window.column_offset {
            return None;
        }
        let col = col_in_line - window.column_offset;
        if col >= rect.cols as u64 {
            return None;
        }
        Some((rect.row + (line - start_line) as u16, rect.col + col as u16))
    };

    for cursor in &window.cursors {
        if window.show_marks && cursor.has_region() {
            for pos in cursor.start()..cursor.end() {
                if let Some((row, col)) = cell_of(pos) {
                    if let Some(cell) = screen.get(row, col) {
                        let ch = cell.ch;
                        screen.set(row, col, ch, theme.selection_style);
                    }
                }
            }
        }
        if selected {
            if let Some((row, col)) = cell_of(cursor.point) {
                let ch = screen.get(row, col).map(|cell| cell.ch).unwrap_or(' ');
                screen.set(row, col, ch, theme.cursor_style);
            }
        }
    }
}

fn draw_mode_line(
    screen: &mut ScreenBuffer,
    buffer: &Buffer,
    window: &crate::window::WindowUnified,
    theme: &Theme,
    rect: Rect,
    selected: bool,
) {
    if rect.rows == 0 {
        return;
    }
    let row = rect.row + rect.rows - 1;
    let style = if buffer.is_unchanged() {
        theme.mode_line_style
    } else {
        theme.mode_line_modified_style
    };

    let cursor = window.selected_cursor();
    let line = buffer.contents.get_line_number(cursor.point);
    let column = cursor.point - buffer.contents.line_start(line);
    let mut text = format!(
        "{}{}{}  L{}:C{}",
        if selected { "> " } else { "  " },
        buffer.render_name(),
        if buffer.is_unchanged() { "" } else { " *" },
        line + 1,
        column + 1,
    );
    if window.cursors.len() > 1 {
        text.push_str(&format!("  ({} cursors)", window.cursors.len()));
    }

    for col in 0..rect.cols {
        screen.set(row, rect.col + col, ' ', style);
    }
    screen.write_str(row, rect.col, &text, style, rect.col + rect.cols);
}

/// Inline completion popup: filtered results drawn under the window's
/// mode line region, selected row highlighted.
fn draw_window_completion(
    screen: &mut ScreenBuffer,
    window: &crate::window::WindowUnified,
    theme: &Theme,
    rect: Rect,
) {
    let Some(completion) = &window.completion else {
        return;
    };
    let results = &completion.filter_context.results;
    if results.is_empty() {
        return;
    }
    let rows = (results.len() as u16).min(rect.rows.saturating_sub(2)).min(8);
    let first_row = rect.row + rect.rows.saturating_sub(1 + rows);
    for (index, result) in results.iter().take(rows as usize).enumerate() {
        let style = if index == completion.filter_context.selected {
            theme.completion_selected_style
        } else {
            theme.completion_style
        };
        let row = first_row + index as u16;
        for col in 0..rect.cols {
            screen.set(row, rect.col + col, ' ', style);
        }
        screen.write_str(row, rect.col + 1, result, style, rect.col + rect.cols);
    }
}

/// Bottom row: open prompt (label, response, popup above) or the timed
/// message line.
fn render_bottom_line(
    screen: &mut ScreenBuffer,
    editor: &Editor,
    client: &Client,
    row: u16,
    cols: u16,
) {
    let theme = &editor.theme;
    if let Some(prompt) = &client.prompt {
        let text = format!("{}{}", prompt.label, client.mini_buffer_text());
        screen.write_str(row, 0, &text, theme.message_style, cols);

        // Completion popup stacked above the prompt line.
        let results = &prompt.completion.filter_context.results;
        if !results.is_empty() {
            let rows = (results.len() as u16)
                .min(theme.mini_buffer_max_height)
                .min(row);
            let selected = prompt.completion.filter_context.selected;
            // Keep the selected result inside the popup.
            let first = selected.saturating_sub(rows.saturating_sub(1) as usize);
            for offset in 0..rows as usize {
                let index = first + offset;
                let Some(result) = results.get(index) else {
                    break;
                };
                let style = if index == selected {
                    theme.completion_selected_style
                } else {
                    theme.completion_style
                };
                let popup_row = row - rows + offset as u16;
                for col in 0..cols {
                    screen.set(popup_row, col, ' ', style);
                }
                screen.write_str(popup_row, 1, result, style, cols);
            }
        }
    } else if let Some(message) = client.active_message() {
        screen.write_str(row, 0, message, theme.message_style, cols);
    }
}
