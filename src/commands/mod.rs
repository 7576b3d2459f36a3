//! The compiled-in command set
//!
//! Commands are `(function, stable-name)` pairs resolved through the
//! registry below.  Every command runs with the editor and a context
//! carrying the client and the key chain that matched; errors become
//! messages, never crashes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::{Buffer, BufferHandle, BufferKind, WriteGuard};
use crate::client::Client;
use crate::command::{Command, CommandContext};
use crate::completion::{
    buffer_completion_engine, buffer_word_completion_results, file_completion_engine,
    no_completion_engine, prefix_completion_filter, spaces_are_wildcards_completion_filter,
    CompletionCache, CompletionState,
};
use crate::contents::Contents;
use crate::cursor::Cursor;
use crate::editor::Editor;
use crate::error::{ErrorKind, SkeinError};
use crate::keymap::{Key, KeyMap};
use crate::transaction::Transaction;
use crate::window::SplitDirection;

type CommandResult = Result<(), SkeinError>;

// =============================================================================
// Registry
// =============================================================================

macro_rules! registry {
    ($($name:ident),* $(,)?) => {
        pub static COMMANDS: &[Command] = &[
            $(Command::new($name, stringify!($name)),)*
        ];
    };
}

registry![
    command_insert_char,
    command_insert_newline,
    command_delete_backward_char,
    command_delete_forward_char,
    command_open_pair,
    command_close_pair,
    command_undo,
    command_redo,
    command_save_file,
    command_open_file,
    command_quit,
    command_forward_char,
    command_backward_char,
    command_forward_line,
    command_backward_line,
    command_start_of_line,
    command_end_of_line,
    command_start_of_buffer,
    command_end_of_buffer,
    command_set_mark,
    command_delete_region,
    command_copy,
    command_cut,
    command_paste,
    command_create_cursor_forward,
    command_create_cursor_backward,
    command_kill_extra_cursors,
    command_split_window_horizontal,
    command_split_window_vertical,
    command_close_window,
    command_cycle_window,
    command_scroll_up_page,
    command_scroll_down_page,
    command_goto_line,
    command_switch_buffer,
    command_kill_buffer,
    command_open_directory,
    command_directory_reload,
    command_directory_toggle_sort,
    command_directory_open_entry,
    command_record_macro_start,
    command_record_macro_stop,
    command_run_macro,
    command_jump_backward,
    command_jump_forward,
    command_complete_at_point,
    command_completion_next,
    command_completion_previous,
    command_completion_accept,
    command_completion_abort,
    command_start_server,
    command_kill_server,
    command_run_command_by_name,
    command_invalid,
];

pub fn lookup_command(name: &str) -> Option<Command> {
    COMMANDS.iter().find(|command| command.name == name).copied()
}

/// The global key map installed at startup.
pub fn default_key_map() -> KeyMap {
    let mut map = KeyMap::new();
    let bind = |map: &mut KeyMap, keys: &str, name: &str| {
        map.bind(keys, lookup_command(name).expect("registered command"));
    };

    bind(&mut map, "c-x c-s", "command_save_file");
    bind(&mut map, "c-x c-f", "command_open_file");
    bind(&mut map, "c-x c-c", "command_quit");
    bind(&mut map, "c-x b", "command_switch_buffer");
    bind(&mut map, "c-x k", "command_kill_buffer");
    bind(&mut map, "c-x d", "command_open_directory");
    bind(&mut map, "c-x 2", "command_split_window_horizontal");
    bind(&mut map, "c-x 3", "command_split_window_vertical");
    bind(&mut map, "c-x 0", "command_close_window");
    bind(&mut map, "c-x o", "command_cycle_window");
    bind(&mut map, "c-x e", "command_run_macro");
    bind(&mut map, "c-x c-r", "command_start_server");
    bind(&mut map, "c-z", "command_undo");
    bind(&mut map, "a-z", "command_redo");
    bind(&mut map, "c-SPACE", "command_set_mark");
    bind(&mut map, "c-w", "command_cut");
    bind(&mut map, "a-w", "command_copy");
    bind(&mut map, "c-y", "command_paste");
    bind(&mut map, "c-d", "command_delete_region");
    bind(&mut map, "UP", "command_backward_line");
    bind(&mut map, "DOWN", "command_forward_line");
    bind(&mut map, "LEFT", "command_backward_char");
    bind(&mut map, "RIGHT", "command_forward_char");
    bind(&mut map, "HOME", "command_start_of_line");
    bind(&mut map, "END", "command_end_of_line");
    bind(&mut map, "c-HOME", "command_start_of_buffer");
    bind(&mut map, "c-END", "command_end_of_buffer");
    bind(&mut map, "PAGE_UP", "command_scroll_up_page");
    bind(&mut map, "PAGE_DOWN", "command_scroll_down_page");
    bind(&mut map, "SCROLL_UP", "command_backward_line");
    bind(&mut map, "SCROLL_DOWN", "command_forward_line");
    bind(&mut map, "BACKSPACE", "command_delete_backward_char");
    bind(&mut map, "DELETE", "command_delete_forward_char");
    bind(&mut map, "a-g", "command_goto_line");
    bind(&mut map, "a-LEFT", "command_jump_backward");
    bind(&mut map, "a-RIGHT", "command_jump_forward");
    bind(&mut map, "a-/", "command_complete_at_point");
    bind(&mut map, "a-c", "command_create_cursor_forward");
    bind(&mut map, "a-C", "command_create_cursor_backward");
    bind(&mut map, "ESCAPE", "command_kill_extra_cursors");
    bind(&mut map, "F3", "command_record_macro_start");
    bind(&mut map, "F4", "command_record_macro_stop");
    bind(&mut map, "a-x", "command_run_command_by_name");
    map
}

/// Key map for code buffers: paired-bracket insertion.
pub fn code_buffer_key_map() -> KeyMap {
    let mut map = KeyMap::new();
    let bind = |map: &mut KeyMap, keys: &str, name: &str| {
        map.bind(keys, lookup_command(name).expect("registered command"));
    };
    bind(&mut map, "(", "command_open_pair");
    bind(&mut map, "[", "command_open_pair");
    bind(&mut map, "{", "command_open_pair");
    bind(&mut map, ")", "command_close_pair");
    bind(&mut map, "]", "command_close_pair");
    bind(&mut map, "}", "command_close_pair");
    map
}

/// Key map consulted while a window completion is open.
pub fn completion_key_map() -> KeyMap {
    let mut map = KeyMap::new();
    let bind = |map: &mut KeyMap, keys: &str, name: &str| {
        map.bind(keys, lookup_command(name).expect("registered command"));
    };
    bind(&mut map, "c-n", "command_completion_next");
    bind(&mut map, "c-p", "command_completion_previous");
    bind(&mut map, "TAB", "command_completion_accept");
    bind(&mut map, "ESCAPE", "command_completion_abort");
    map
}

/// Key map for DIRECTORY buffers.
pub fn directory_key_map() -> KeyMap {
    let mut map = KeyMap::new();
    let bind = |map: &mut KeyMap, keys: &str, name: &str| {
        map.bind(keys, lookup_command(name).expect("registered command"));
    };
    bind(&mut map, "ENTER", "command_directory_open_entry");
    bind(&mut map, "g", "command_directory_reload");
    bind(&mut map, "s", "command_directory_toggle_sort");
    map
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Start of the UTF-8 character before `pos`.
fn previous_char_start(contents: &Contents, pos: u64) -> u64 {
    if pos == 0 {
        return 0;
    }
    let mut start = pos - 1;
    while start > 0 {
        match contents.get(start) {
            Some(byte) if byte & 0xC0 == 0x80 => start -= 1,
            _ => break,
        }
    }
    start
}

/// End of the UTF-8 character starting at `pos`.
fn next_char_end(contents: &Contents, pos: u64) -> u64 {
    let mut end = (pos + 1).min(contents.len());
    while end < contents.len() {
        match contents.get(end) {
            Some(byte) if byte & 0xC0 == 0x80 => end += 1,
            _ => break,
        }
    }
    end
}

/// Commit a transaction built against the selected buffer and bring the
/// acting window's cursors forward.
fn commit_in_window(
    transaction: Transaction,
    buffer: &mut WriteGuard<'_>,
    window: &mut crate::window::WindowUnified,
) -> CommandResult {
    transaction.commit(buffer)?;
    window.update_cursors(buffer);
    Ok(())
}

/// Move every cursor with `step`, collapsing regions unless marks are
/// shown.
fn move_cursors(
    context: &mut CommandContext<'_>,
    step: impl Fn(&Buffer, &Cursor) -> u64,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);
    let show_marks = window.show_marks;
    for cursor in &mut window.cursors {
        cursor.point = step(&buffer, cursor);
        if !show_marks {
            cursor.mark = cursor.point;
        }
    }
    drop(buffer);
    Ok(())
}

/// The printable text carried by the matched key chain.
fn keys_to_text(keys: &[Key]) -> String {
    keys.iter().filter_map(|key| key.insert_text()).collect()
}

// =============================================================================
// Editing
// =============================================================================

pub fn command_insert_char(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let text = keys_to_text(context.keys);
    if text.is_empty() {
        return Ok(());
    }
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        transaction.insert(cursor.point, text.clone());
    }
    commit_in_window(transaction, &mut buffer, window)?;
    drop(buffer);
    maybe_refresh_window_completion(editor, context);
    Ok(())
}

pub fn command_insert_newline(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);
    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        transaction.insert(cursor.point, "\n");
    }
    commit_in_window(transaction, &mut buffer, window)
}

pub fn command_delete_backward_char(
    editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        if window.show_marks && cursor.has_region() {
            transaction.remove_range(&buffer, cursor.start(), cursor.end());
        } else if cursor.point > 0 {
            let start = previous_char_start(&buffer.contents, cursor.point);
            transaction.remove_range(&buffer, start, cursor.point);
        }
    }
    if transaction.is_empty() {
        return Ok(());
    }
    window.show_marks = false;
    commit_in_window(transaction, &mut buffer, window)?;
    drop(buffer);
    maybe_refresh_window_completion(editor, context);
    Ok(())
}

pub fn command_delete_forward_char(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        if window.show_marks && cursor.has_region() {
            transaction.remove_range(&buffer, cursor.start(), cursor.end());
        } else if cursor.point < buffer.contents.len() {
            let end = next_char_end(&buffer.contents, cursor.point);
            transaction.remove_range(&buffer, cursor.point, end);
        }
    }
    if transaction.is_empty() {
        return Ok(());
    }
    window.show_marks = false;
    commit_in_window(transaction, &mut buffer, window)
}

fn matching_close(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        other => other,
    }
}

/// Insert the typed open bracket and its partner, leaving every cursor
/// between the two.
pub fn command_open_pair(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let Some(open) = context.keys.last().and_then(|key| key.insert_text()) else {
        return Ok(());
    };
    let close = matching_close(open);
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        transaction.insert(cursor.point, open.to_string());
        transaction.insert_after(cursor.point, close.to_string());
    }
    commit_in_window(transaction, &mut buffer, window)
}

pub fn command_close_pair(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let Some(close) = context.keys.last().and_then(|key| key.insert_text()) else {
        return Ok(());
    };
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    // When the close bracket is already there, step over it instead of
    // inserting a duplicate.
    let mut transaction = Transaction::init(&buffer);
    let mut all_skipped = true;
    for cursor in &window.cursors {
        if buffer.contents.get(cursor.point) == Some(close as u8) {
            continue;
        }
        all_skipped = false;
        transaction.insert(cursor.point, close.to_string());
    }
    if all_skipped {
        let show_marks = window.show_marks;
        for cursor in &mut window.cursors {
            cursor.point += 1;
            if !show_marks {
                cursor.mark = cursor.point;
            }
        }
        return Ok(());
    }
    commit_in_window(transaction, &mut buffer, window)
}

pub fn command_undo(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    if !buffer.undo() {
        drop(buffer);
        context.client.show_message("Nothing to undo");
        return Ok(());
    }
    if !buffer.update_token_cache() {
        editor.schedule_syntax_highlight(&handle);
    }
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);
    Ok(())
}

pub fn command_redo(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    if !buffer.redo() {
        drop(buffer);
        context.client.show_message("Nothing to redo");
        return Ok(());
    }
    if !buffer.update_token_cache() {
        editor.schedule_syntax_highlight(&handle);
    }
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);
    Ok(())
}

// =============================================================================
// Files
// =============================================================================

pub fn command_save_file(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let name = {
        let mut buffer = handle.lock_writing();
        crate::fileio::save_buffer(&mut buffer)?;
        buffer.render_name()
    };
    context.client.show_message(format!("Saved {}", name));
    Ok(())
}

pub fn command_open_file(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    context.client.show_dialog(
        "Open file: ",
        file_completion_engine,
        spaces_are_wildcards_completion_filter,
        |editor, client, response| open_file_arg(editor, client, response),
    );
    Ok(())
}

pub fn command_quit(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let modified = editor.buffers().iter().any(|handle| {
        let buffer = handle.lock_reading();
        buffer.kind == BufferKind::File && !buffer.is_unchanged()
    });
    if !modified {
        context.client.quit = true;
        return Ok(());
    }
    context.client.show_dialog(
        "Modified buffers exist; quit anyway? (y/n): ",
        no_completion_engine,
        prefix_completion_filter,
        |_editor, client, response| {
            if response.trim().eq_ignore_ascii_case("y") {
                client.quit = true;
            }
            Ok(())
        },
    );
    Ok(())
}

/// Open `arg` (`FILE`, `FILE:LINE`, `FILE:LINE:COLUMN`, or a directory)
/// and select a window for it.
pub fn open_file_arg(editor: &mut Editor, client: &mut Client, arg: &str) -> CommandResult {
    if arg.is_empty() {
        return Err(SkeinError::new(ErrorKind::Parse, "EMPTY_ARG", "no file given"));
    }
    let expanded = crate::fileio::expand_tilde(arg);
    let expanded = expanded.to_string_lossy().into_owned();
    let (file, line, column) = crate::fileio::parse_file_arg(&expanded);
    let path = absolute_path(Path::new(file));

    client.push_jump();

    if path.is_dir() {
        let handle = open_directory_buffer(editor, &path)?;
        let change_index = handle.lock_reading().changes.len();
        client.show_buffer(handle, change_index);
        return Ok(());
    }

    let handle = match editor.find_buffer_by_path(&path) {
        Some(handle) => handle,
        None => {
            // Load (or create) outside the registry closure so I/O errors
            // propagate instead of leaving a broken buffer behind.
            let loaded = if path.exists() {
                Some(crate::fileio::load_file(&path)?)
            } else {
                None
            };
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            let directory = path.parent().map(Path::to_path_buf);
            let handle = editor.create_buffer(move |id| {
                let mut buffer = Buffer::new_file(id, name, directory);
                buffer.mode.key_map = code_buffer_key_map();
                buffer.mode.completion_key_map = completion_key_map();
                if let Some(loaded) = loaded {
                    buffer.set_text(&loaded.text);
                    buffer.use_carriage_returns = loaded.use_carriage_returns;
                    buffer.read_only = loaded.read_only;
                    buffer.file_time = loaded.file_time;
                    buffer.mark_saved();
                }
                buffer
            });
            editor.schedule_syntax_highlight(&handle);
            handle
        }
    };

    let change_index = handle.lock_reading().changes.len();
    client.show_buffer(handle.clone(), change_index);

    if line > 0 {
        let buffer = handle.lock_reading();
        let position = buffer.position_of_line_column(line, column.max(1));
        drop(buffer);
        let window = client.selected_unified_mut();
        window.kill_extra_cursors();
        *window.selected_cursor_mut() = Cursor::at(position);
    }
    Ok(())
}

fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn open_directory_buffer(
    editor: &mut Editor,
    path: &Path,
) -> Result<Arc<BufferHandle>, SkeinError> {
    if let Some(handle) = editor.find_buffer_by_path(path) {
        let mut buffer = handle.lock_writing();
        if buffer.kind == BufferKind::Directory {
            crate::dirbuf::reload_directory_buffer(&mut buffer)?;
            drop(buffer);
            return Ok(handle);
        }
    }
    // Render the listing before registering so a failed read creates
    // nothing.
    let text = crate::dirbuf::format_directory_listing(path, false)?;
    let path = path.to_path_buf();
    let handle = editor.create_buffer(move |id| {
        let mut buffer = Buffer::new_directory(id, path);
        buffer.mode.key_map = directory_key_map();
        buffer.set_text(&text);
        buffer
    });
    Ok(handle)
}

// =============================================================================
// Motion
// =============================================================================

pub fn command_forward_char(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| {
        next_char_end(&buffer.contents, cursor.point).min(buffer.contents.len())
    })
}

pub fn command_backward_char(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| {
        previous_char_start(&buffer.contents, cursor.point)
    })
}

fn move_line(buffer: &Buffer, cursor: &Cursor, delta: i64) -> u64 {
    let contents = &buffer.contents;
    let line = contents.get_line_number(cursor.point) as i64;
    let target = (line + delta).clamp(0, contents.line_count() as i64 - 1) as u64;
    if target == line as u64 {
        return cursor.point;
    }
    let column = cursor.point - contents.line_start(line as u64);
    let start = contents.line_start(target);
    let end = {
        let mut iterator = contents.iterator_at(start);
        iterator.end_of_line();
        iterator.position()
    };
    (start + column).min(end)
}

pub fn command_forward_line(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| move_line(buffer, cursor, 1))
}

pub fn command_backward_line(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| move_line(buffer, cursor, -1))
}

pub fn command_start_of_line(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| {
        let line = buffer.contents.get_line_number(cursor.point);
        buffer.contents.line_start(line)
    })
}

pub fn command_end_of_line(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    move_cursors(context, |buffer, cursor| {
        let mut iterator = buffer.contents.iterator_at(cursor.point);
        iterator.end_of_line();
        iterator.position()
    })
}

pub fn command_start_of_buffer(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.push_jump();
    let window = context.client.selected_unified_mut();
    window.kill_extra_cursors();
    *window.selected_cursor_mut() = Cursor::at(0);
    Ok(())
}

pub fn command_end_of_buffer(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.push_jump();
    let handle = context.client.selected_buffer_handle();
    let len = handle.lock_reading().contents.len();
    let window = context.client.selected_unified_mut();
    window.kill_extra_cursors();
    *window.selected_cursor_mut() = Cursor::at(len);
    Ok(())
}

pub fn command_scroll_up_page(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let rows = context.client.selected_unified().text_rows().max(1) as i64;
    move_cursors(context, move |buffer, cursor| {
        move_line(buffer, cursor, -rows)
    })
}

pub fn command_scroll_down_page(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let rows = context.client.selected_unified().text_rows().max(1) as i64;
    move_cursors(context, move |buffer, cursor| move_line(buffer, cursor, rows))
}

pub fn command_goto_line(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    context.client.show_dialog(
        "Goto line: ",
        no_completion_engine,
        prefix_completion_filter,
        |_editor, client, response| {
            let line: u64 = response.trim().parse().map_err(|_| {
                SkeinError::new(ErrorKind::Parse, "BAD_LINE", "line must be a number")
            })?;
            client.push_jump();
            let handle = client.selected_buffer_handle();
            let position = handle.lock_reading().position_of_line_column(line, 1);
            let window = client.selected_unified_mut();
            window.kill_extra_cursors();
            *window.selected_cursor_mut() = Cursor::at(position);
            Ok(())
        },
    );
    Ok(())
}

// =============================================================================
// Regions and the copy chain
// =============================================================================

pub fn command_set_mark(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let window = context.client.selected_unified_mut();
    for cursor in &mut window.cursors {
        cursor.mark = cursor.point;
    }
    window.show_marks = true;
    Ok(())
}

pub fn command_delete_region(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        if cursor.has_region() {
            transaction.remove_range(&buffer, cursor.start(), cursor.end());
        }
    }
    window.show_marks = false;
    commit_in_window(transaction, &mut buffer, window)
}

fn region_text(buffer: &Buffer, window: &crate::window::WindowUnified) -> String {
    let mut parts = Vec::new();
    for cursor in &window.cursors {
        if cursor.has_region() {
            parts.push(buffer.contents.slice_string(cursor.start(), cursor.end()));
        }
    }
    parts.join("\n")
}

pub fn command_copy(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let text = {
        let buffer = handle.lock_reading();
        let window = context.client.selected_unified_mut();
        window.update_cursors(&buffer);
        region_text(&buffer, window)
    };
    if text.is_empty() {
        context.client.show_message("Nothing to copy");
        return Ok(());
    }
    context.client.selected_unified_mut().show_marks = false;
    context.client.copy(text);
    Ok(())
}

pub fn command_cut(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let text = region_text(&buffer, window);
    if text.is_empty() {
        drop(buffer);
        context.client.show_message("Nothing to cut");
        return Ok(());
    }

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        if cursor.has_region() {
            transaction.remove_range(&buffer, cursor.start(), cursor.end());
        }
    }
    window.show_marks = false;
    commit_in_window(transaction, &mut buffer, window)?;
    drop(buffer);
    context.client.copy(text);
    Ok(())
}

pub fn command_paste(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    context.client.sync_clipboard();
    let Some(text) = context.client.copy_chain.last().map(str::to_string) else {
        context.client.show_message("Copy chain is empty");
        return Ok(());
    };

    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        if window.show_marks && cursor.has_region() {
            transaction.remove_range(&buffer, cursor.start(), cursor.end());
            // End-of-region in pre-state coordinates rebases onto the
            // removal site.
            transaction.insert(cursor.end(), text.clone());
        } else {
            transaction.insert(cursor.point, text.clone());
        }
    }
    window.show_marks = false;
    commit_in_window(transaction, &mut buffer, window)
}

// =============================================================================
// Multiple cursors
// =============================================================================

fn create_cursor(context: &mut CommandContext<'_>, forward: bool) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let anchor = if forward {
        *window.cursors.last().expect("windows keep one cursor")
    } else {
        window.cursors[0]
    };
    let target = move_line(&buffer, &anchor, if forward { 1 } else { -1 });
    if target == anchor.point {
        drop(buffer);
        context.client.show_message("No room for another cursor");
        return Ok(());
    }
    window.cursors.push(Cursor::at(target));
    let selected = *window.selected_cursor();
    crate::cursor::sort_cursors(&mut window.cursors, &mut window.selected_cursor);
    crate::cursor::dedup_cursors(&mut window.cursors, &mut window.selected_cursor);
    debug_assert!(window.cursors.contains(&selected));
    Ok(())
}

pub fn command_create_cursor_forward(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    create_cursor(context, true)
}

pub fn command_create_cursor_backward(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    create_cursor(context, false)
}

pub fn command_kill_extra_cursors(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let window = context.client.selected_unified_mut();
    window.kill_extra_cursors();
    window.show_marks = false;
    window.completion = None;
    Ok(())
}

// =============================================================================
// Windows
// =============================================================================

pub fn command_split_window_horizontal(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let selected = context.client.selected_window;
    context.client.windows.split(selected, SplitDirection::Horizontal);
    Ok(())
}

pub fn command_split_window_vertical(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let selected = context.client.selected_window;
    context.client.windows.split(selected, SplitDirection::Vertical);
    Ok(())
}

pub fn command_close_window(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let client = &mut *context.client;
    let selected = client.selected_window;
    // Fused splits close as a unit: the sibling goes with us.
    let (fused, sibling) = match client.windows.get(selected).parent() {
        Some(parent) => match client.windows.get(parent) {
            crate::window::WindowNode::Split(split) => {
                let sibling = if split.first == selected {
                    split.second
                } else {
                    split.first
                };
                (split.fused, Some(sibling))
            }
            crate::window::WindowNode::Unified(_) => (false, None),
        },
        None => (false, None),
    };

    let next = client.windows.cycle_next(selected);
    match client.windows.close(selected) {
        Some(window) => {
            client.offscreen_windows.push(window);
            client.selected_window = next;
            if fused {
                if let Some(sibling) = sibling {
                    let next = client.windows.cycle_next(sibling);
                    if let Some(window) = client.windows.close(client.windows.first_leaf(sibling)) {
                        client.offscreen_windows.push(window);
                        client.selected_window = next;
                    }
                }
            }
            Ok(())
        }
        None => {
            client.show_message("Cannot close the last window");
            Ok(())
        }
    }
}

pub fn command_cycle_window(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.selected_window = context
        .client
        .windows
        .cycle_next(context.client.selected_window);
    Ok(())
}

// =============================================================================
// Buffers
// =============================================================================

pub fn command_switch_buffer(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.show_dialog(
        "Switch buffer: ",
        buffer_completion_engine,
        spaces_are_wildcards_completion_filter,
        |editor, client, response| {
            let handle = editor.find_buffer_by_name(response).ok_or_else(|| {
                SkeinError::new(
                    ErrorKind::Other,
                    "NO_SUCH_BUFFER",
                    format!("no buffer named {}", response),
                )
            })?;
            let change_index = handle.lock_reading().changes.len();
            client.show_buffer(handle, change_index);
            Ok(())
        },
    );
    Ok(())
}

pub fn command_kill_buffer(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let id = handle.id();
    editor.kill_buffer(id);

    // Repoint every window that showed the dead buffer, skipping the
    // client-private mini and messages buffers.
    let mini = context.client.mini_buffer.id();
    let messages = context.client.messages.id();
    let survivor = editor
        .buffers()
        .iter()
        .rev()
        .find(|handle| handle.id() != mini && handle.id() != messages)
        .map(|handle| (*handle).clone());
    let replacement = match survivor {
        Some(handle) => handle,
        None => editor.create_temp_buffer("scratch", None),
    };
    let change_index = replacement.lock_reading().changes.len();
    for leaf in context.client.windows.leaves() {
        let window = context.client.windows.unified_mut(leaf);
        if window.buffer.id() == id {
            window.replace_buffer(replacement.clone(), change_index);
        }
    }
    context.client.prune_offscreen(|buffer_id| buffer_id != id);
    Ok(())
}

pub fn command_open_directory(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.show_dialog(
        "Open directory: ",
        file_completion_engine,
        spaces_are_wildcards_completion_filter,
        |editor, client, response| open_file_arg(editor, client, response),
    );
    Ok(())
}

// =============================================================================
// Directory buffers
// =============================================================================

fn with_directory_buffer(
    context: &mut CommandContext<'_>,
    reload: impl FnOnce(&mut Buffer) -> Result<(), SkeinError>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    if buffer.kind != BufferKind::Directory {
        return Err(SkeinError::new(
            ErrorKind::Other,
            "NOT_A_DIRECTORY",
            "not a directory buffer",
        ));
    }

    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);
    let selected_entry = crate::dirbuf::entry_at(&buffer.contents, window.selected_cursor().point);

    reload(&mut buffer)?;

    // The listing was rebuilt wholesale; re-find the entry by name.
    window.kill_extra_cursors();
    window.change_index = buffer.changes.len();
    let position = selected_entry
        .and_then(|name| crate::dirbuf::position_of_entry(&buffer.contents, &name))
        .unwrap_or_else(|| window.selected_cursor().point.min(buffer.contents.len()).min(26));
    *window.selected_cursor_mut() = Cursor::at(position);
    Ok(())
}

pub fn command_directory_reload(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    with_directory_buffer(context, crate::dirbuf::reload_directory_buffer)
}

pub fn command_directory_toggle_sort(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    with_directory_buffer(context, crate::dirbuf::toggle_directory_sort)
}

pub fn command_directory_open_entry(
    editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let target = {
        let buffer = handle.lock_reading();
        if buffer.kind != BufferKind::Directory {
            return Err(SkeinError::new(
                ErrorKind::Other,
                "NOT_A_DIRECTORY",
                "not a directory buffer",
            ));
        }
        let window = context.client.selected_unified();
        let entry = crate::dirbuf::entry_at(&buffer.contents, window.selected_cursor().point)
            .ok_or_else(|| {
                SkeinError::new(ErrorKind::Other, "NO_ENTRY", "cursor is not on an entry")
            })?;
        buffer
            .directory
            .clone()
            .unwrap_or_default()
            .join(entry)
    };
    open_file_arg(editor, context.client, &target.to_string_lossy())
}

// =============================================================================
// Macros
// =============================================================================

pub fn command_record_macro_start(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let client = &mut *context.client;
    client.recorded_keys.clear();
    client.record_key_presses = true;
    client.show_message("Recording macro");
    Ok(())
}

pub fn command_record_macro_stop(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let client = &mut *context.client;
    if !client.record_key_presses {
        client.show_message("Not recording");
        return Ok(());
    }
    client.record_key_presses = false;
    // The keys that invoked this command are part of the recording; strip
    // them so replay does not stop itself.
    let recorded_len = client.recorded_keys.len();
    let strip = context.keys.len().min(recorded_len);
    client.recorded_keys.truncate(recorded_len - strip);
    client.frozen_macro = std::mem::take(&mut client.recorded_keys);
    // Recording kept the consumed prefix of the key chain; release it.
    client.key_chain.drain(..client.key_chain_offset);
    client.key_chain_offset = 0;
    client.show_message(format!(
        "Recorded macro: {}",
        crate::keymap::stringify_keys(&client.frozen_macro)
    ));
    Ok(())
}

pub fn command_run_macro(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    let client = &mut *context.client;
    if client.frozen_macro.is_empty() {
        client.show_message("No macro recorded");
        return Ok(());
    }
    let frozen = client.frozen_macro.clone();
    let offset = client.key_chain_offset;
    client.key_chain.splice(offset..offset, frozen);
    Ok(())
}

// =============================================================================
// Jumps
// =============================================================================

pub fn command_jump_backward(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let Some((handle, position)) = context.client.jump_ring.backward() else {
        context.client.show_message("No previous jump");
        return Ok(());
    };
    let change_index = handle.lock_reading().changes.len();
    context.client.show_buffer(handle, change_index);
    let window = context.client.selected_unified_mut();
    window.kill_extra_cursors();
    *window.selected_cursor_mut() = Cursor::at(position);
    Ok(())
}

pub fn command_jump_forward(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let Some((handle, position)) = context.client.jump_ring.forward() else {
        context.client.show_message("No next jump");
        return Ok(());
    };
    let change_index = handle.lock_reading().changes.len();
    context.client.show_buffer(handle, change_index);
    let window = context.client.selected_unified_mut();
    window.kill_extra_cursors();
    *window.selected_cursor_mut() = Cursor::at(position);
    Ok(())
}

// =============================================================================
// Inline completion
// =============================================================================

/// Word prefix ending at `pos`, with its start position.
fn completion_query(contents: &Contents, pos: u64) -> (u64, String) {
    let mut start = pos;
    while start > 0 {
        let byte = contents.get(start - 1).unwrap_or(b' ');
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            start -= 1;
        } else {
            break;
        }
    }
    (start, contents.slice_string(start, pos))
}

pub fn command_complete_at_point(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let point = window.selected_cursor().point;
    let (_, query) = completion_query(&buffer.contents, point);
    if query.is_empty() {
        drop(buffer);
        context.client.show_message("Nothing to complete");
        return Ok(());
    }

    let results = buffer_word_completion_results(&buffer.contents, &query);
    if results.is_empty() {
        drop(buffer);
        context
            .client
            .show_message(format!("No completions for {}", query));
        return Ok(());
    }

    let mut cache = CompletionCache::new(no_completion_engine, prefix_completion_filter);
    cache.engine_context.query = query;
    cache.engine_context.results = results.clone();
    cache.filter_context.results = results;
    cache.state = CompletionState::Loaded;
    cache.change_index = buffer.changes.len();
    window.completion = Some(cache);
    Ok(())
}

fn window_completion_move(context: &mut CommandContext<'_>, delta: i64) -> CommandResult {
    let window = context.client.selected_unified_mut();
    let Some(completion) = window.completion.as_mut() else {
        return Ok(());
    };
    let len = completion.filter_context.results.len();
    if len == 0 {
        return Ok(());
    }
    let selected = completion.filter_context.selected as i64;
    completion.filter_context.selected = (selected + delta).rem_euclid(len as i64) as usize;
    Ok(())
}

pub fn command_completion_next(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    window_completion_move(context, 1)
}

pub fn command_completion_previous(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    window_completion_move(context, -1)
}

pub fn command_completion_accept(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    let handle = context.client.selected_buffer_handle();
    let mut buffer = handle.lock_writing();
    let window = context.client.selected_unified_mut();
    window.update_cursors(&buffer);

    let Some(completion) = window.completion.take() else {
        return Ok(());
    };
    let Some(result) = completion
        .filter_context
        .results
        .get(completion.filter_context.selected)
    else {
        return Ok(());
    };
    let query_len = completion.engine_context.query.len() as u64;

    let mut transaction = Transaction::init(&buffer);
    for cursor in &window.cursors {
        let start = cursor.point.saturating_sub(query_len);
        transaction.remove_range(&buffer, start, cursor.point);
        // The cursor's pre-state position rebases onto the removal site.
        transaction.insert(cursor.point, result.clone());
    }
    commit_in_window(transaction, &mut buffer, window)
}

pub fn command_completion_abort(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.selected_unified_mut().completion = None;
    Ok(())
}

/// Re-filter an open inline completion after the buffer changed under it.
fn maybe_refresh_window_completion(_editor: &mut Editor, context: &mut CommandContext<'_>) {
    let handle = context.client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    let window = context.client.selected_unified_mut();
    if window.completion.is_none() {
        return;
    }
    let point = window.selected_cursor().point;
    let (_, query) = completion_query(&buffer.contents, point);
    if query.is_empty() {
        window.completion = None;
        return;
    }
    let completion = window.completion.as_mut().expect("checked above");
    completion.engine_context.query = query;
    let selected = completion
        .filter_context
        .results
        .get(completion.filter_context.selected)
        .cloned();
    (completion.filter)(
        &mut completion.filter_context,
        &completion.engine_context,
        selected.as_deref(),
    );
    completion.change_index = buffer.changes.len();
}

// =============================================================================
// Remote
// =============================================================================

pub fn command_start_server(
    editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    if editor.remote.as_ref().map(|state| state.is_running()) == Some(true) {
        context.client.show_message("Server already running");
        return Ok(());
    }
    let state = crate::remote::start_server(editor)?;
    editor.remote = Some(state);
    context.client.show_message("Server listening");
    Ok(())
}

pub fn command_kill_server(editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    match editor.remote.take() {
        Some(state) => state.kill(),
        None => context.client.show_message("Server not running"),
    }
    Ok(())
}

// =============================================================================
// Odds and ends
// =============================================================================

pub fn command_run_command_by_name(
    _editor: &mut Editor,
    context: &mut CommandContext<'_>,
) -> CommandResult {
    context.client.show_dialog(
        "Command: ",
        command_name_completion_engine,
        prefix_completion_filter,
        |editor, client, response| {
            let command = lookup_command(response.trim()).ok_or_else(|| {
                SkeinError::new(
                    ErrorKind::Other,
                    "NO_SUCH_COMMAND",
                    format!("no command named {}", response.trim()),
                )
            })?;
            let mut context = CommandContext {
                client,
                keys: &[],
                previous_command: None,
            };
            (command.function)(editor, &mut context)
        },
    );
    Ok(())
}

fn command_name_completion_engine(
    _editor: &mut Editor,
    context: &mut crate::completion::CompletionEngineContext,
    is_initial_frame: bool,
) -> bool {
    if !is_initial_frame && !context.results.is_empty() {
        return false;
    }
    context.results = COMMANDS
        .iter()
        .map(|command| command.name.to_string())
        .collect();
    true
}

pub fn command_invalid(_editor: &mut Editor, context: &mut CommandContext<'_>) -> CommandResult {
    context.client.show_message(format!(
        "Invalid key combination: {}",
        crate::keymap::stringify_keys(context.keys)
    ));
    Ok(())
}

/// Run a shell script with its merged output appended to the named
/// TEMPORARY buffer, creating or reusing it.
pub fn run_console_command(
    editor: &mut Editor,
    client: &mut Client,
    working_directory: Option<&Path>,
    script: &str,
    buffer_name: &str,
) -> Result<Arc<BufferHandle>, SkeinError> {
    let directory = match working_directory {
        Some(directory) => directory.to_path_buf(),
        None => std::env::current_dir().map_err(SkeinError::from)?,
    };

    client.push_jump();

    let handle = match editor.find_temp_buffer(buffer_name, Some(&directory)) {
        Some(handle) => handle,
        None => editor.create_temp_buffer(buffer_name, Some(directory.clone())),
    };

    {
        let mut buffer = handle.lock_writing();
        let len = buffer.contents.len();
        buffer.contents.remove(0, len);
        buffer.contents.append(script.as_bytes());
        buffer.contents.append(b"\n");
    }
    let change_index = handle.lock_reading().changes.len();
    client.show_buffer(handle.clone(), change_index);

    let child = std::process::Command::new("sh")
        .arg("-c")
        // Route stderr through the same pipe as stdout.
        .arg(format!("( {} ) 2>&1", script))
        .current_dir(&directory)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|err| {
            SkeinError::new(
                ErrorKind::Job,
                "SPAWN_FAILED",
                format!("failed to run {}: {}", script, err),
            )
        })?;

    editor.add_asynchronous_job(Box::new(crate::jobs::job_process_append(
        Arc::downgrade(&handle),
        child,
        None,
    )));
    Ok(handle)
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
