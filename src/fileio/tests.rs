use super::*;

use std::path::PathBuf;
use std::time::SystemTime;

use crate::transaction::Transaction;

#[test]
fn test_parse_file_arg_no_disk() {
    assert_eq!(parse_file_arg_no_disk("file.rs"), ("file.rs", 0, 0));
    assert_eq!(parse_file_arg_no_disk("file.rs:10"), ("file.rs", 10, 0));
    assert_eq!(parse_file_arg_no_disk("file.rs:10:4"), ("file.rs", 10, 4));
    // Non-numeric suffixes are part of the name.
    assert_eq!(parse_file_arg_no_disk("a:b"), ("a:b", 0, 0));
    assert_eq!(parse_file_arg_no_disk("a:b:7"), ("a:b", 7, 0));
}

#[test]
fn test_parse_file_arg_prefers_existing_path() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    std::fs::write(&plain, "x").unwrap();
    let weird = dir.path().join("weird:3");
    std::fs::write(&weird, "x").unwrap();

    // The whole string exists: no peeling.
    let weird_arg = weird.to_string_lossy().into_owned();
    assert_eq!(parse_file_arg(&weird_arg), (weird_arg.as_str(), 0, 0));

    // Peel one :N.
    let one = format!("{}:12", plain.display());
    let plain_str = plain.to_string_lossy().into_owned();
    assert_eq!(parse_file_arg(&one), (plain_str.as_str(), 12, 0));

    // Peel two :N groups.
    let two = format!("{}:12:5", plain.display());
    assert_eq!(parse_file_arg(&two), (plain_str.as_str(), 12, 5));

    // Nothing exists: keep the arg whole.
    let missing = format!("{}/missing:1:2", dir.path().display());
    assert_eq!(parse_file_arg(&missing), (missing.as_str(), 0, 0));
}

#[test]
fn test_load_detects_crlf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dos.txt");
    std::fs::write(&path, b"one\r\ntwo\r\n").unwrap();

    let loaded = load_file(&path).unwrap();
    assert!(loaded.use_carriage_returns);
    assert_eq!(loaded.text, "one\ntwo\n");

    let unix = dir.path().join("unix.txt");
    std::fs::write(&unix, b"one\ntwo\n").unwrap();
    let loaded = load_file(&unix).unwrap();
    assert!(!loaded.use_carriage_returns);
    assert_eq!(loaded.text, "one\ntwo\n");
}

#[test]
fn test_save_load_roundtrip_preserves_line_endings() {
    let dir = tempfile::tempdir().unwrap();
    for (name, bytes) in [("dos.txt", b"a\r\nb\r\n".as_slice()), ("unix.txt", b"a\nb\n")] {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();

        let mut buffer = open_file_buffer(BufferId(1), &path).unwrap();
        assert!(buffer.is_unchanged());
        save_buffer(&mut buffer).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes, "roundtrip of {}", name);
    }
}

#[test]
fn test_open_missing_file_creates_empty_writable_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.txt");
    let buffer = open_file_buffer(BufferId(1), &path).unwrap();
    assert!(buffer.contents.is_empty());
    assert!(!buffer.read_only);
    assert!(buffer.file_time.is_none());
}

#[test]
fn test_save_after_edit_marks_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");
    std::fs::write(&path, "hello").unwrap();

    let mut buffer = open_file_buffer(BufferId(1), &path).unwrap();
    let mut transaction = Transaction::init(&buffer);
    transaction.insert(5, " world");
    transaction.commit(&mut buffer).unwrap();
    assert!(!buffer.is_unchanged());

    save_buffer(&mut buffer).unwrap();
    assert!(buffer.is_unchanged());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");

    // Undoing back past the save point flips the indicator again.
    buffer.undo();
    assert!(!buffer.is_unchanged());
}

#[test]
fn test_save_refuses_external_modification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");
    std::fs::write(&path, "original").unwrap();

    let mut buffer = open_file_buffer(BufferId(1), &path).unwrap();
    // Make the on-disk file strictly newer than the recorded file time.
    buffer.file_time = Some(SystemTime::now() - std::time::Duration::from_secs(60));
    std::fs::write(&path, "changed externally").unwrap();

    let err = save_buffer(&mut buffer).unwrap_err();
    assert_eq!(err.code, "FILE_CHANGED_ON_DISK");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "changed externally");
}

#[test]
fn test_expand_tilde() {
    std::env::set_var("HOME", "/home/tester");
    assert_eq!(expand_tilde("~/x.txt"), PathBuf::from("/home/tester/x.txt"));
    assert_eq!(expand_tilde("/abs/x.txt"), PathBuf::from("/abs/x.txt"));
}
