use super::*;

use crate::keymap::parse_keys;
use crate::server::Server;

fn fixture(text: &str) -> (Server, Client) {
    let mut editor = Editor::new();
    editor.key_map = default_key_map();
    editor.create_buffer(|id| {
        let mut buffer = Buffer::new_file(id, "test.txt".into(), None);
        buffer.mode.key_map = code_buffer_key_map();
        buffer.mode.completion_key_map = completion_key_map();
        buffer.set_text(text);
        buffer
    });
    let mut server = Server::new(editor);
    let client = server.make_client();
    (server, client)
}

fn send(server: &mut Server, client: &mut Client, description: &str) {
    for key in parse_keys(description).unwrap() {
        server.receive(client, key);
    }
    server.process_key_chain(client, false);
}

fn send_batch(server: &mut Server, client: &mut Client, description: &str) {
    for key in parse_keys(description).unwrap() {
        server.receive(client, key);
    }
    server.process_key_chain(client, true);
}

fn buffer_text(client: &Client) -> String {
    client
        .selected_buffer_handle()
        .lock_reading()
        .contents
        .stringify()
}

fn cursor_point(client: &Client) -> u64 {
    client.selected_unified().selected_cursor().point
}

#[test]
fn test_insert_and_undo_scenario() {
    // Batch-pasting "hello" into an empty buffer is one commit; the
    // cursor lands at 5 and undo restores both text and cursor.
    let (mut server, mut client) = fixture("");
    send_batch(&mut server, &mut client, "h e l l o");
    assert_eq!(buffer_text(&client), "hello");
    assert_eq!(cursor_point(&client), 5);

    send(&mut server, &mut client, "c-z");
    assert_eq!(buffer_text(&client), "");
    assert_eq!(cursor_point(&client), 0);

    send(&mut server, &mut client, "a-z");
    assert_eq!(buffer_text(&client), "hello");
    assert_eq!(cursor_point(&client), 5);
}

#[test]
fn test_self_insert_without_batch() {
    let (mut server, mut client) = fixture("");
    send(&mut server, &mut client, "a b");
    assert_eq!(buffer_text(&client), "ab");
    // Each key was its own commit.
    send(&mut server, &mut client, "c-z");
    assert_eq!(buffer_text(&client), "a");
}

#[test]
fn test_multi_cursor_region_delete_scenario() {
    let (mut server, mut client) = fixture("(y\n(y\n");
    {
        let window = client.selected_unified_mut();
        window.cursors = vec![
            crate::cursor::Cursor::with_region(0, 2),
            crate::cursor::Cursor::with_region(3, 5),
        ];
        window.show_marks = true;
    }

    send(&mut server, &mut client, "c-d");
    assert_eq!(buffer_text(&client), "\n\n");
    let window = client.selected_unified();
    let cursors: Vec<(u64, u64)> = window.cursors.iter().map(|c| (c.mark, c.point)).collect();
    assert_eq!(cursors, vec![(0, 0), (1, 1)]);
}

#[test]
fn test_paired_insert_keeps_cursor_between() {
    let (mut server, mut client) = fixture("x");
    client.selected_unified_mut().cursors = vec![crate::cursor::Cursor::at(1)];

    send(&mut server, &mut client, "(");
    assert_eq!(buffer_text(&client), "x()");
    assert_eq!(cursor_point(&client), 2, "cursor sits between the parens");
}

#[test]
fn test_close_pair_steps_over_existing() {
    let (mut server, mut client) = fixture("x()");
    client.selected_unified_mut().cursors = vec![crate::cursor::Cursor::at(2)];

    send(&mut server, &mut client, ")");
    assert_eq!(buffer_text(&client), "x()", "no duplicate close bracket");
    assert_eq!(cursor_point(&client), 3);
}

#[test]
fn test_motion_commands() {
    let (mut server, mut client) = fixture("one\ntwo\nthree\n");
    send(&mut server, &mut client, "RIGHT RIGHT");
    assert_eq!(cursor_point(&client), 2);
    send(&mut server, &mut client, "DOWN");
    assert_eq!(cursor_point(&client), 6);
    send(&mut server, &mut client, "HOME");
    assert_eq!(cursor_point(&client), 4);
    send(&mut server, &mut client, "END");
    assert_eq!(cursor_point(&client), 7);
    send(&mut server, &mut client, "UP LEFT");
    assert_eq!(cursor_point(&client), 2);
    send(&mut server, &mut client, "c-END");
    assert_eq!(cursor_point(&client), 14);
    send(&mut server, &mut client, "c-HOME");
    assert_eq!(cursor_point(&client), 0);
}

#[test]
fn test_region_copy_cut_paste() {
    let (mut server, mut client) = fixture("hello world");
    // Mark at 0, move to 5, cut "hello".
    send(&mut server, &mut client, "c-SPACE");
    send(&mut server, &mut client, "RIGHT RIGHT RIGHT RIGHT RIGHT");
    send(&mut server, &mut client, "c-w");
    assert_eq!(buffer_text(&client), " world");
    assert_eq!(client.copy_chain.last(), Some("hello"));

    send(&mut server, &mut client, "c-END");
    send(&mut server, &mut client, "c-y");
    assert_eq!(buffer_text(&client), " worldhello");
}

#[test]
fn test_mark_extends_selection_through_motion() {
    let (mut server, mut client) = fixture("abcdef");
    send(&mut server, &mut client, "c-SPACE RIGHT RIGHT RIGHT");
    let cursor = *client.selected_unified().selected_cursor();
    assert_eq!(cursor.mark, 0);
    assert_eq!(cursor.point, 3);
    assert!(client.selected_unified().show_marks);
}

#[test]
fn test_create_and_kill_cursors() {
    let (mut server, mut client) = fixture("aaa\nbbb\nccc\n");
    send(&mut server, &mut client, "a-c a-c");
    assert_eq!(client.selected_unified().cursors.len(), 3);

    // Typing inserts at every cursor.
    send(&mut server, &mut client, "x");
    assert_eq!(buffer_text(&client), "xaaa\nxbbb\nxccc\n");

    send(&mut server, &mut client, "ESCAPE");
    assert_eq!(client.selected_unified().cursors.len(), 1);
}

#[test]
fn test_undo_branching_through_commands() {
    let (mut server, mut client) = fixture("");
    send_batch(&mut server, &mut client, "a");
    send(&mut server, &mut client, "c-z");
    send_batch(&mut server, &mut client, "b");
    // Undo/redo walks the newest branch.
    send(&mut server, &mut client, "c-z");
    assert_eq!(buffer_text(&client), "");
    send(&mut server, &mut client, "a-z");
    assert_eq!(buffer_text(&client), "b");
}

#[test]
fn test_save_file_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save_me.txt");
    std::fs::write(&path, "start").unwrap();

    let mut editor = Editor::new();
    editor.key_map = default_key_map();
    let mut server = Server::new(editor);
    let mut client = server.make_client();
    open_file_arg(&mut server.editor, &mut client, &path.to_string_lossy()).unwrap();

    send_batch(&mut server, &mut client, "n e w SPACE");
    send(&mut server, &mut client, "c-x c-s");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new start");
    assert!(client.selected_buffer_handle().lock_reading().is_unchanged());
}

#[test]
fn test_open_file_at_line_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("numbered.txt");
    std::fs::write(&path, "first\nsecond\nthird\n").unwrap();

    let (mut server, mut client) = fixture("");
    let arg = format!("{}:2:3", path.display());
    open_file_arg(&mut server.editor, &mut client, &arg).unwrap();

    assert_eq!(
        client.selected_buffer_handle().lock_reading().name,
        "numbered.txt"
    );
    // Line 2 column 3 is the byte after "fi rst\nse".
    assert_eq!(cursor_point(&client), 8);
}

#[test]
fn test_open_missing_file_creates_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brand_new.txt");
    let (mut server, mut client) = fixture("");
    open_file_arg(&mut server.editor, &mut client, &path.to_string_lossy()).unwrap();

    let handle = client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    assert_eq!(buffer.name, "brand_new.txt");
    assert!(buffer.contents.is_empty());
    assert!(!buffer.read_only);
}

#[test]
fn test_switch_buffer_through_prompt() {
    let (mut server, mut client) = fixture("first buffer");
    server.editor.create_buffer(|id| {
        let mut buffer = Buffer::new_file(id, "other.txt".into(), None);
        buffer.set_text("second buffer");
        buffer
    });

    send(&mut server, &mut client, "c-x b");
    assert!(client.has_open_prompt());
    send(&mut server, &mut client, "o t h e r . t x t");
    send(&mut server, &mut client, "ENTER");
    assert!(!client.has_open_prompt());
    assert_eq!(buffer_text(&client), "second buffer");
}

#[test]
fn test_prompt_escape_cancels() {
    let (mut server, mut client) = fixture("text");
    send(&mut server, &mut client, "c-x b");
    assert!(client.has_open_prompt());
    send(&mut server, &mut client, "ESCAPE");
    assert!(!client.has_open_prompt());
    assert_eq!(buffer_text(&client), "text");
}

#[test]
fn test_goto_line_prompt() {
    let (mut server, mut client) = fixture("one\ntwo\nthree\n");
    send(&mut server, &mut client, "a-g");
    send(&mut server, &mut client, "3");
    send(&mut server, &mut client, "ENTER");
    assert_eq!(cursor_point(&client), 8);

    // The jump ring remembers where we came from.
    send(&mut server, &mut client, "a-LEFT");
    assert_eq!(cursor_point(&client), 0);
}

#[test]
fn test_invalid_key_posts_message() {
    let (mut server, mut client) = fixture("");
    send(&mut server, &mut client, "F9");
    let message = client.active_message().unwrap_or_default().to_string();
    assert!(message.contains("Invalid key combination"), "{}", message);
    assert!(message.contains("F9"));
}

#[test]
fn test_key_remap_alternate_is_tried() {
    let (mut server, mut client) = fixture("ab");
    server.editor.key_remap.bind("c-h", "BACKSPACE");
    send(&mut server, &mut client, "c-END");
    send(&mut server, &mut client, "c-h");
    assert_eq!(buffer_text(&client), "a");
}

#[test]
fn test_macro_record_and_replay() {
    let (mut server, mut client) = fixture("");
    send(&mut server, &mut client, "F3");
    send(&mut server, &mut client, "a b");
    send(&mut server, &mut client, "F4");
    assert_eq!(buffer_text(&client), "ab");
    assert_eq!(client.frozen_macro.len(), 2);

    send(&mut server, &mut client, "c-x e");
    assert_eq!(buffer_text(&client), "abab");
}

#[test]
fn test_window_split_and_cycle() {
    let (mut server, mut client) = fixture("shared");
    send(&mut server, &mut client, "c-x 3");
    assert_eq!(client.windows.window_count(), 2);

    let before = client.selected_window;
    send(&mut server, &mut client, "c-x o");
    assert_ne!(client.selected_window, before);

    send(&mut server, &mut client, "c-x 0");
    assert_eq!(client.windows.window_count(), 1);
    assert_eq!(client.offscreen_windows.len(), 1);
}

#[test]
fn test_kill_buffer_repoints_windows() {
    let (mut server, mut client) = fixture("doomed");
    let doomed = client.selected_buffer_handle().id();
    send(&mut server, &mut client, "c-x k");
    assert_ne!(client.selected_buffer_handle().id(), doomed);
    assert!(server.editor.find_buffer(doomed).is_none());
}

#[test]
fn test_inline_completion_flow() {
    let (mut server, mut client) = fixture("alpha alpine al");
    send(&mut server, &mut client, "c-END");
    send(&mut server, &mut client, "a-/");
    assert!(client.selected_unified().completion.is_some());

    // c-n moves selection to "alpine"; TAB accepts it.
    send(&mut server, &mut client, "c-n");
    send(&mut server, &mut client, "TAB");
    assert_eq!(buffer_text(&client), "alpha alpine alpine");
    assert!(client.selected_unified().completion.is_none());
}

#[test]
fn test_inline_completion_narrows_as_typed() {
    let (mut server, mut client) = fixture("alpha alpine al");
    send(&mut server, &mut client, "c-END");
    send(&mut server, &mut client, "a-/");
    {
        let window = client.selected_unified();
        let completion = window.completion.as_ref().unwrap();
        assert_eq!(completion.filter_context.results.len(), 2);
    }

    send(&mut server, &mut client, "p h");
    let window = client.selected_unified();
    let completion = window.completion.as_ref().unwrap();
    assert_eq!(completion.filter_context.results, vec!["alpha".to_string()]);
}

#[test]
fn test_directory_commands_preserve_selection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("B"), "x").unwrap();
    std::fs::write(dir.path().join("A"), "x").unwrap();
    std::fs::write(dir.path().join("C"), "x").unwrap();

    let (mut server, mut client) = fixture("");
    open_file_arg(&mut server.editor, &mut client, &dir.path().to_string_lossy()).unwrap();
    {
        let handle = client.selected_buffer_handle();
        let buffer = handle.lock_reading();
        assert_eq!(buffer.kind, BufferKind::Directory);
        let position = crate::dirbuf::position_of_entry(&buffer.contents, "B").unwrap();
        drop(buffer);
        client.selected_unified_mut().cursors = vec![crate::cursor::Cursor::at(position)];
    }

    send(&mut server, &mut client, "s");
    let handle = client.selected_buffer_handle();
    let buffer = handle.lock_reading();
    assert!(crate::dirbuf::is_sorted_by_time(&buffer.contents));
    let cursor = client.selected_unified().selected_cursor().point;
    assert_eq!(crate::dirbuf::entry_at(&buffer.contents, cursor), Some("B".into()));
}

#[test]
fn test_directory_open_entry() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("inner.txt"), "inner contents").unwrap();

    let (mut server, mut client) = fixture("");
    open_file_arg(&mut server.editor, &mut client, &dir.path().to_string_lossy()).unwrap();
    {
        let handle = client.selected_buffer_handle();
        let buffer = handle.lock_reading();
        let position = crate::dirbuf::position_of_entry(&buffer.contents, "inner.txt").unwrap();
        drop(buffer);
        client.selected_unified_mut().cursors = vec![crate::cursor::Cursor::at(position)];
    }

    send(&mut server, &mut client, "ENTER");
    assert_eq!(buffer_text(&client), "inner contents");
}

#[test]
fn test_run_command_by_name() {
    let (mut server, mut client) = fixture("abc");
    send(&mut server, &mut client, "a-x");
    assert!(client.has_open_prompt());
    client.set_mini_buffer_text("command_end_of_buffer");
    send(&mut server, &mut client, "ENTER");
    assert_eq!(cursor_point(&client), 3);
}

#[test]
fn test_lookup_command_registry() {
    assert!(lookup_command("command_undo").is_some());
    assert!(lookup_command("command_missing").is_none());
    // Names are stable: the function name is the registry name.
    for command in COMMANDS {
        assert!(command.name.starts_with("command_"), "{}", command.name);
    }
}

#[test]
fn test_run_console_command_captures_output() {
    let (mut server, mut client) = fixture("");
    let handle = run_console_command(
        &mut server.editor,
        &mut client,
        None,
        "echo from-script",
        "console",
    )
    .unwrap();

    // The script line is written synchronously.
    assert!(handle
        .lock_reading()
        .contents
        .stringify()
        .starts_with("echo from-script\n"));

    // Pump the job queues until the process output lands.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        server.slurp_jobs();
        server.run_synchronous_jobs(&mut client);
        if handle
            .lock_reading()
            .contents
            .stringify()
            .contains("from-script\nfrom-script")
            || handle.lock_reading().contents.stringify().ends_with("from-script\n")
                && handle.lock_reading().contents.len() > 17
        {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "output never arrived");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    server.shutdown();
}
