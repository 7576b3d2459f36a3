//! File loading and saving
//!
//! Buffers detect CRLF on first read and write it back on save.  Paths
//! given on the command line or over the remote socket may carry trailing
//! `:LINE` / `:LINE:COLUMN` parts; the grammar prefers an existing file
//! with the literal name, then peels one colon group, then two.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::buffer::{Buffer, BufferId, BufferKind};
use crate::error::{ErrorKind, SkeinError};
use crate::jobs::process::strip_carriage_returns;

/// `$HOME`, used to resolve `~` in path completion and arguments.
pub fn home_directory() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand a leading `~/` through `$HOME`.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_directory() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Split `arg` into `(file, line, column)` without consulting the disk.
/// Lines and columns are 1-based; 0 means "not given".
pub fn parse_file_arg_no_disk(arg: &str) -> (&str, u64, u64) {
    let Some(colon) = arg.rfind(':') else {
        return (arg, 0, 0);
    };
    let Ok(last_number) = arg[colon + 1..].parse::<u64>() else {
        return (arg, 0, 0);
    };

    let rest = &arg[..colon];
    let Some(colon2) = rest.rfind(':') else {
        return (rest, last_number, 0);
    };
    let Ok(first_number) = rest[colon2 + 1..].parse::<u64>() else {
        return (rest, last_number, 0);
    };

    (&rest[..colon2], first_number, last_number)
}

/// Split `arg` into `(file, line, column)`, checking the disk at each
/// step: a file that literally exists wins over peeling `:N` suffixes.
pub fn parse_file_arg(arg: &str) -> (&str, u64, u64) {
    if Path::new(arg).exists() {
        return (arg, 0, 0);
    }

    let Some(colon) = arg.rfind(':') else {
        return (arg, 0, 0);
    };
    let Ok(last_number) = arg[colon + 1..].parse::<u64>() else {
        return (arg, 0, 0);
    };
    let rest = &arg[..colon];
    if Path::new(rest).exists() {
        return (rest, last_number, 0);
    }

    let Some(colon2) = rest.rfind(':') else {
        return (arg, 0, 0);
    };
    let Ok(first_number) = rest[colon2 + 1..].parse::<u64>() else {
        return (arg, 0, 0);
    };
    if Path::new(&rest[..colon2]).exists() {
        return (&rest[..colon2], first_number, last_number);
    }

    (arg, 0, 0)
}

/// Result of loading a file into text form.
pub struct LoadedFile {
    pub text: String,
    pub use_carriage_returns: bool,
    pub read_only: bool,
    pub file_time: Option<SystemTime>,
}

/// Read `path`, stripping CRLF with a carry and noting the detected line
/// ending convention.
pub fn load_file(path: &Path) -> Result<LoadedFile, SkeinError> {
    let bytes = fs::read(path).map_err(|err| {
        SkeinError::new(
            ErrorKind::Io,
            "FILE_READ",
            format!("cannot read {}: {}", path.display(), err),
        )
    })?;

    // The convention is decided by the first newline in the file.
    let use_carriage_returns = match bytes.iter().position(|byte| *byte == b'\n') {
        Some(index) => index > 0 && bytes[index - 1] == b'\r',
        None => false,
    };

    let mut stripped = Vec::with_capacity(bytes.len());
    let mut carry = false;
    strip_carriage_returns(&bytes, &mut carry, &mut stripped);
    if carry {
        stripped.push(b'\r');
    }

    let metadata = fs::metadata(path).ok();
    let read_only = metadata
        .as_ref()
        .map(|m| m.permissions().readonly())
        .unwrap_or(false);
    let file_time = metadata.and_then(|m| m.modified().ok());

    Ok(LoadedFile {
        text: String::from_utf8_lossy(&stripped).into_owned(),
        use_carriage_returns,
        read_only,
        file_time,
    })
}

/// Build a FILE buffer for `path`.  A path that does not exist yields an
/// empty writable buffer; an existing but unreadable file is an error.
pub fn open_file_buffer(id: BufferId, path: &Path) -> Result<Buffer, SkeinError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let directory = path.parent().map(Path::to_path_buf);
    let mut buffer = Buffer::new_file(id, name, directory);

    if path.exists() {
        let loaded = load_file(path)?;
        buffer.set_text(&loaded.text);
        buffer.use_carriage_returns = loaded.use_carriage_returns;
        buffer.read_only = loaded.read_only;
        buffer.file_time = loaded.file_time;
        buffer.mark_saved();
    }
    Ok(buffer)
}

/// Stringify contents with the buffer's line ending convention.
fn contents_to_disk_bytes(buffer: &Buffer) -> Vec<u8> {
    let text = buffer.contents.stringify();
    if !buffer.use_carriage_returns {
        return text.into_bytes();
    }
    let mut out = Vec::with_capacity(text.len() + buffer.contents.line_count() as usize);
    for byte in text.bytes() {
        if byte == b'\n' {
            out.push(b'\r');
        }
        out.push(byte);
    }
    out
}

/// Save through a temp file in the same directory, then rename over the
/// target.  Refuses to clobber a file modified on disk since load.
pub fn save_buffer(buffer: &mut Buffer) -> Result<(), SkeinError> {
    let path = buffer.path().ok_or_else(|| {
        SkeinError::new(
            ErrorKind::Io,
            "NOT_A_FILE",
            format!("buffer {} has no backing file", buffer.render_name()),
        )
    })?;
    if buffer.kind != BufferKind::File {
        return Err(SkeinError::new(
            ErrorKind::Io,
            "NOT_A_FILE",
            format!("cannot save {}", buffer.render_name()),
        ));
    }

    if let (Some(loaded_time), Ok(metadata)) = (buffer.file_time, fs::metadata(&path)) {
        if let Ok(on_disk) = metadata.modified() {
            if on_disk > loaded_time {
                return Err(SkeinError::warning(
                    ErrorKind::Io,
                    "FILE_CHANGED_ON_DISK",
                    format!("{} changed on disk; not saving", path.display()),
                ));
            }
        }
    }

    let bytes = contents_to_disk_bytes(buffer);
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = directory.join(format!(
        ".{}.skein-save",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "buffer".into())
    ));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    })();
    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(SkeinError::new(
            ErrorKind::Io,
            "FILE_WRITE",
            format!("cannot save {}: {}", path.display(), err),
        ));
    }

    buffer.file_time = fs::metadata(&path).and_then(|m| m.modified()).ok();
    buffer.mark_saved();
    Ok(())
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
