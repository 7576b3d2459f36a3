use super::*;

#[test]
fn test_create_buffer_assigns_unique_ids() {
    let mut editor = Editor::new();
    let first = editor.create_temp_buffer("console", None);
    let second = editor.create_temp_buffer("other", None);
    assert_ne!(first.id(), second.id());
    assert_eq!(editor.buffers().len(), 2);
}

#[test]
fn test_colliding_names_get_suffix() {
    let mut editor = Editor::new();
    let first = editor.create_temp_buffer("console", None);
    let second = editor.create_temp_buffer("console", None);
    assert_eq!(first.lock_reading().name, "*console*");
    assert_eq!(second.lock_reading().name, "*console* <2>");
}

#[test]
fn test_find_temp_buffer() {
    let mut editor = Editor::new();
    let console = editor.create_temp_buffer("console", None);
    assert_eq!(
        editor.find_temp_buffer("console", None).unwrap().id(),
        console.id()
    );
    assert!(editor.find_temp_buffer("missing", None).is_none());
}

#[test]
fn test_find_buffer_by_path() {
    let mut editor = Editor::new();
    let handle = editor.create_buffer(|id| {
        Buffer::new_file(id, "main.rs".into(), Some("/tmp/project".into()))
    });
    let found = editor
        .find_buffer_by_path(Path::new("/tmp/project/main.rs"))
        .unwrap();
    assert_eq!(found.id(), handle.id());
    assert!(editor.find_buffer_by_path(Path::new("/nope")).is_none());
}

#[test]
fn test_kill_buffer_removes_registry_reference() {
    let mut editor = Editor::new();
    let handle = editor.create_temp_buffer("gone", None);
    let id = handle.id();
    assert!(editor.kill_buffer(id));
    assert!(!editor.kill_buffer(id));
    assert!(editor.find_buffer(id).is_none());

    // Outstanding handles keep the buffer alive; the weak snapshot dies
    // with the last strong reference.
    let weak = std::sync::Arc::downgrade(&handle);
    assert!(weak.upgrade().is_some());
    drop(handle);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_schedule_syntax_highlight_queues_job() {
    let mut editor = Editor::new();
    let handle = editor.create_temp_buffer("x", None);
    editor.schedule_syntax_highlight(&handle);
    assert_eq!(editor.pending_jobs.len(), 1);
}
