use super::*;

fn apply_all(contents: &mut Contents, edits: &[Edit]) {
    for edit in edits {
        apply_edit(contents, edit).unwrap();
    }
}

fn unapply_all(contents: &mut Contents, edits: &[Edit]) {
    for edit in edits.iter().rev() {
        unapply_edit(contents, edit).unwrap();
    }
}

#[test]
fn test_apply_insert_and_remove() {
    let mut contents = Contents::from_str("hello world");
    apply_edit(&mut contents, &Edit::insert(5, ",")).unwrap();
    assert_eq!(contents.stringify(), "hello, world");
    apply_edit(&mut contents, &Edit::remove(0, "hello")).unwrap();
    assert_eq!(contents.stringify(), ", world");
}

#[test]
fn test_apply_out_of_range_fails() {
    let mut contents = Contents::from_str("ab");
    let err = apply_edit(&mut contents, &Edit::insert(3, "x")).unwrap_err();
    assert_eq!(err.code, "INVALID_EDIT");
    assert_eq!(err.kind, ErrorKind::Edit);
    let err = apply_edit(&mut contents, &Edit::remove(1, "bc")).unwrap_err();
    assert_eq!(err.code, "INVALID_EDIT");
    assert_eq!(contents.stringify(), "ab");
}

#[test]
fn test_commit_reversal_restores_contents_and_lines() {
    let mut contents = Contents::from_str("one\ntwo\nthree\n");
    let before = contents.stringify();
    let before_lines: Vec<u64> = (0..contents.line_count())
        .map(|l| contents.line_start(l))
        .collect();

    let edits = vec![
        Edit::remove(4, "two\n"),
        Edit::insert(4, "2\n2\n"),
        Edit::insert_after(0, "# "),
    ];
    apply_all(&mut contents, &edits);
    assert_ne!(contents.stringify(), before);

    unapply_all(&mut contents, &edits);
    assert_eq!(contents.stringify(), before);
    let after_lines: Vec<u64> = (0..contents.line_count())
        .map(|l| contents.line_start(l))
        .collect();
    assert_eq!(after_lines, before_lines);
}

// =============================================================================
// Position adjustment rules
// =============================================================================

fn adjusted(edit: &Edit, pos: u64) -> u64 {
    let mut pos = pos;
    position_after_edit(edit, &mut pos);
    pos
}

#[test]
fn test_insert_biases_cursor_forward_at_position() {
    let edit = Edit::insert(5, "xx");
    assert_eq!(adjusted(&edit, 3), 3);
    assert_eq!(adjusted(&edit, 5), 7);
    assert_eq!(adjusted(&edit, 6), 8);
}

#[test]
fn test_insert_after_position_leaves_cursor_at_position() {
    let edit = Edit::insert_after(5, "xx");
    assert_eq!(adjusted(&edit, 3), 3);
    assert_eq!(adjusted(&edit, 5), 5);
    assert_eq!(adjusted(&edit, 6), 8);
}

#[test]
fn test_remove_adjustment() {
    let edit = Edit::remove(5, "abc");
    assert_eq!(adjusted(&edit, 4), 4);
    assert_eq!(adjusted(&edit, 5), 5);
    assert_eq!(adjusted(&edit, 6), 5);
    assert_eq!(adjusted(&edit, 8), 5);
    assert_eq!(adjusted(&edit, 9), 6);
}

#[test]
fn test_position_before_edit_is_inverse_shift() {
    let edit = Edit::insert(5, "xx");
    let mut pos = 9;
    position_before_edit(&edit, &mut pos);
    assert_eq!(pos, 7);

    let edit = Edit::remove(5, "abc");
    let mut pos = 6;
    position_before_edit(&edit, &mut pos);
    assert_eq!(pos, 9);
}

#[test]
fn test_position_after_changes_over_undo_entries() {
    let mut log = ChangeLog::new();
    log.push_commit(vec![Edit::insert(0, "hello")]);
    let mut pos = 3;
    position_after_changes(&log.changes, &mut pos);
    assert_eq!(pos, 8);

    log.undo().unwrap();
    let mut pos = 8;
    position_after_changes(&log.changes[1..], &mut pos);
    assert_eq!(pos, 3);
}

// =============================================================================
// Undo tree
// =============================================================================

#[test]
fn test_undo_redo_walks_tree() {
    let mut log = ChangeLog::new();
    assert!(!log.can_undo());
    assert!(!log.can_redo());

    let first = log.push_commit(vec![Edit::insert(0, "a")]);
    let second = log.push_commit(vec![Edit::insert(1, "b")]);
    assert_eq!(log.current_commit_id(), second);
    assert_eq!(log.len(), 2);

    let edits = log.undo().unwrap();
    assert_eq!(edits[0].value, "b");
    assert_eq!(log.current_commit_id(), first);
    assert_eq!(log.len(), 3);
    assert!(log.can_redo());

    let edits = log.redo().unwrap();
    assert_eq!(edits[0].value, "b");
    assert_eq!(log.current_commit_id(), second);
    assert_eq!(log.len(), 4);
    assert!(log.redo().is_none());
}

#[test]
fn test_branching_prefers_latest_child() {
    let mut log = ChangeLog::new();
    let a = log.push_commit(vec![Edit::insert(0, "a")]);
    log.undo().unwrap();
    let b = log.push_commit(vec![Edit::insert(0, "b")]);
    log.undo().unwrap();

    // Both `a` and `b` hang off the root; redo takes the newest branch.
    assert_eq!(log.current_commit_id(), CommitId::ROOT);
    let edits = log.redo().unwrap();
    assert_eq!(edits[0].value, "b");
    assert_eq!(log.current_commit_id(), b);

    // Re-selecting the older branch changes what redo does.
    log.undo().unwrap();
    log.select_branch(CommitId::ROOT, a);
    let edits = log.redo().unwrap();
    assert_eq!(edits[0].value, "a");
}

#[test]
fn test_saved_marker() {
    let mut log = ChangeLog::new();
    assert!(log.is_unchanged());

    log.push_commit(vec![Edit::insert(0, "a")]);
    assert!(!log.is_unchanged());

    log.mark_saved();
    assert!(log.is_unchanged());

    log.undo().unwrap();
    assert!(!log.is_unchanged());
    log.redo().unwrap();
    assert!(log.is_unchanged());

    log.clear_saved();
    assert!(!log.is_unchanged());
}

#[test]
fn test_path_to_crosses_branches() {
    let mut log = ChangeLog::new();
    let a = log.push_commit(vec![Edit::insert(0, "a")]);
    let b = log.push_commit(vec![Edit::insert(1, "b")]);
    log.undo().unwrap();
    log.undo().unwrap();
    let c = log.push_commit(vec![Edit::insert(0, "c")]);

    let (undos, redos) = log.path_to(b);
    assert_eq!(undos, 1);
    assert_eq!(redos, vec![a, b]);

    let (undos, redos) = log.path_to(c);
    assert_eq!(undos, 0);
    assert!(redos.is_empty());

    let (undos, redos) = log.path_to(CommitId::ROOT);
    assert_eq!(undos, 1);
    assert!(redos.is_empty());
}
