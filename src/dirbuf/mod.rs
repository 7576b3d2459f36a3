//! Directory buffers
//!
//! A DIRECTORY buffer shows one header line and one entry line per file.
//! The layout is fixed and byte-addressed: entry names start at offset 22
//! from the start of the line (19 date columns, a space, the directory
//! marker, a space), and byte 19 of the buffer holds `V` exactly when the
//! listing is sorted by modification time.  Commands that reload the
//! listing re-find the entry the cursor was on by name.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::buffer::Buffer;
use crate::contents::Contents;
use crate::error::{ErrorKind, SkeinError};

/// Offset of the entry name from the start of an entry line.
pub const ENTRY_OFFSET: u64 = 22;

/// Byte holding the `V` marker when sorted by modification time.
const SORT_MARKER_POSITION: u64 = 19;

/// Header when sorted by name (the default).
const HEADER_BY_NAME: &str = "Modification Date     File (V)\n";

/// Header when sorted by modification time.
const HEADER_BY_TIME: &str = "Modification Date (V) File\n";

struct Entry {
    name: String,
    is_directory: bool,
    modified: Option<SystemTime>,
}

fn list_entries(path: &Path) -> Result<Vec<Entry>, SkeinError> {
    let entries = std::fs::read_dir(path).map_err(|err| {
        SkeinError::new(
            ErrorKind::Io,
            "DIR_READ",
            format!("cannot list {}: {}", path.display(), err),
        )
    })?;

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let metadata = entry.metadata().ok();
        out.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_directory: metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false),
            modified: metadata.and_then(|m| m.modified().ok()),
        });
    }
    Ok(out)
}

fn format_date(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => DateTime::<Local>::from(time)
            .format("%Y/%m/%d %H:%M:%S")
            .to_string(),
        None => " ".repeat(19),
    }
}

/// Render the full listing text for `path`.
pub fn format_directory_listing(path: &Path, sort_by_time: bool) -> Result<String, SkeinError> {
    let mut entries = list_entries(path)?;
    if sort_by_time {
        // Newest first.
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.name.cmp(&b.name)));
    } else {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut out = String::new();
    out.push_str(if sort_by_time {
        HEADER_BY_TIME
    } else {
        HEADER_BY_NAME
    });
    for entry in &entries {
        out.push_str(&format_date(entry.modified));
        out.push(' ');
        out.push(if entry.is_directory { '/' } else { ' ' });
        out.push(' ');
        out.push_str(&entry.name);
        out.push('\n');
    }
    Ok(out)
}

/// True when the listing's header carries the by-time sort marker.
pub fn is_sorted_by_time(contents: &Contents) -> bool {
    contents.get(SORT_MARKER_POSITION) == Some(b'V')
}

/// Rebuild the listing from disk, keeping the current sort order.
pub fn reload_directory_buffer(buffer: &mut Buffer) -> Result<(), SkeinError> {
    let directory = buffer.directory.clone().ok_or_else(|| {
        SkeinError::new(ErrorKind::Io, "DIR_READ", "buffer has no directory")
    })?;
    let sort_by_time = is_sorted_by_time(&buffer.contents);
    let text = format_directory_listing(&directory, sort_by_time)?;
    buffer.set_text(&text);
    Ok(())
}

/// Flip the sort order marker and rebuild the listing.
pub fn toggle_directory_sort(buffer: &mut Buffer) -> Result<(), SkeinError> {
    let directory = buffer.directory.clone().ok_or_else(|| {
        SkeinError::new(ErrorKind::Io, "DIR_READ", "buffer has no directory")
    })?;
    let sort_by_time = !is_sorted_by_time(&buffer.contents);
    let text = format_directory_listing(&directory, sort_by_time)?;
    buffer.set_text(&text);
    Ok(())
}

/// Name of the entry on the line containing `pos`, or `None` on the
/// header line.
pub fn entry_at(contents: &Contents, pos: u64) -> Option<String> {
    let line = contents.get_line_number(pos);
    if line == 0 {
        return None;
    }
    let start = contents.line_start(line);
    if start + ENTRY_OFFSET >= contents.len() {
        return None;
    }
    let mut end = contents.iterator_at(start);
    end.end_of_line();
    Some(contents.slice_string(start + ENTRY_OFFSET, end.position()))
}

/// Position of the start of `name`'s entry, if present.
pub fn position_of_entry(contents: &Contents, name: &str) -> Option<u64> {
    for line in 1..contents.line_count() {
        let start = contents.line_start(line);
        if start + ENTRY_OFFSET >= contents.len() {
            continue;
        }
        let mut end = contents.iterator_at(start);
        end.end_of_line();
        if contents.slice_string(start + ENTRY_OFFSET, end.position()) == name {
            return Some(start + ENTRY_OFFSET);
        }
    }
    None
}
