use super::*;

fn engine_with(results: &[&str], query: &str) -> CompletionEngineContext {
    let mut context = CompletionEngineContext::new();
    context.results = results.iter().map(|s| s.to_string()).collect();
    context.query = query.to_string();
    context
}

#[test]
fn test_prefix_filter() {
    let engine_context = engine_with(&["alpha", "beta", "alps", "Alpha"], "al");
    let mut context = CompletionFilterContext::default();
    prefix_completion_filter(&mut context, &engine_context, None);
    assert_eq!(context.results, vec!["alpha", "alps"]);
    assert_eq!(context.selected, 0);
}

#[test]
fn test_infix_filter_tracks_selection() {
    let engine_context = engine_with(&["main.rs", "domain.rs", "lib.rs"], "ain");
    let mut context = CompletionFilterContext::default();
    infix_completion_filter(&mut context, &engine_context, Some("domain.rs"));
    assert_eq!(context.results, vec!["main.rs", "domain.rs"]);
    assert_eq!(context.selected, 1);
}

// =============================================================================
// Wildcard pattern
// =============================================================================

fn matches(query: &str, string: &str) -> bool {
    WildcardPattern::parse(query).matches(string)
}

#[test]
fn test_wildcard_pieces_in_order() {
    assert!(matches("foo bar", "foo_middle_bar"));
    assert!(matches("foo bar", "xxfooxxbarxx"));
    assert!(!matches("bar foo", "foo_middle_bar"));
    assert!(!matches("foo baz", "foo_middle_bar"));
}

#[test]
fn test_wildcard_case_sticky() {
    // Lowercase matches both cases; uppercase matches exactly.
    assert!(matches("readme", "README.md"));
    assert!(matches("Read", "Readme.md"));
    assert!(!matches("READ", "Readme.md"));
}

#[test]
fn test_wildcard_start_anchor() {
    assert!(matches("^src", "src/main.rs"));
    assert!(!matches("^main", "src/main.rs"));
}

#[test]
fn test_wildcard_end_anchor() {
    assert!(matches("rs$", "src/main.rs"));
    assert!(!matches("main$", "src/main.rs"));
}

#[test]
fn test_wildcard_component_anchor() {
    // `%` anchors to the start of a path component.
    assert!(matches("%main", "src/main.rs"));
    assert!(matches("%src", "src/main.rs"));
    assert!(!matches("%ain", "src/main.rs"));
}

#[test]
fn test_wildcard_slash_in_piece() {
    assert!(matches("src/ma", "src/main.rs"));
    assert!(!matches("src/x", "src/main.rs"));
}

#[test]
fn test_wildcard_filter_end_to_end() {
    let engine_context = engine_with(
        &["src/contents/mod.rs", "src/main.rs", "benches/contents_bench.rs"],
        "^src mod",
    );
    let mut context = CompletionFilterContext::default();
    spaces_are_wildcards_completion_filter(&mut context, &engine_context, None);
    assert_eq!(context.results, vec!["src/contents/mod.rs"]);
}

// =============================================================================
// Cache state machine
// =============================================================================

fn nop_engine(
    _editor: &mut Editor,
    _context: &mut CompletionEngineContext,
    _initial: bool,
) -> bool {
    false
}

#[test]
fn test_cache_update_marks_loading() {
    let mut cache = CompletionCache::new(nop_engine, prefix_completion_filter);
    assert_eq!(cache.state, CompletionState::Initial);

    assert!(cache.update(3));
    assert_eq!(cache.state, CompletionState::Loading);
    assert!(!cache.update(3), "same revision does not reload");

    assert!(cache.update(4));
}

#[test]
fn test_cache_set_engine_resets() {
    let mut cache = CompletionCache::new(nop_engine, prefix_completion_filter);
    cache.engine_context.results.push("stale".to_string());
    cache.state = CompletionState::Loaded;

    // Same engine: state resets, results stay.
    cache.set_engine(nop_engine);
    assert_eq!(cache.state, CompletionState::Initial);
    assert!(!cache.engine_context.results.is_empty());

    // Different engine: context is cleared too.
    cache.set_engine(buffer_completion_engine);
    assert!(cache.engine_context.results.is_empty());
}

#[test]
fn test_selected_result_includes_prefix_and_suffix() {
    let mut cache = CompletionCache::new(nop_engine, prefix_completion_filter);
    cache.engine_context.result_prefix = "src/".to_string();
    cache.engine_context.result_suffix = ":42".to_string();
    cache.filter_context.results.push("main.rs".to_string());
    assert_eq!(cache.selected_result().unwrap(), "src/main.rs:42");
}

#[test]
fn test_parse_file_line_column_suffix() {
    let mut context = CompletionEngineContext::new();
    context.query = "src/main.rs:42:7".to_string();
    context.parse_file_line_column_suffix();
    assert_eq!(context.query, "src/main.rs");
    assert_eq!(context.result_suffix, ":42:7");

    let mut context = CompletionEngineContext::new();
    context.query = "no_suffix.rs".to_string();
    context.parse_file_line_column_suffix();
    assert_eq!(context.query, "no_suffix.rs");
    assert_eq!(context.result_suffix, "");
}

#[test]
fn test_buffer_word_completion_results() {
    let contents = crate::contents::Contents::from_str("alpha alpine beta alp alpha");
    let words = buffer_word_completion_results(&contents, "alp");
    assert_eq!(words, vec!["alpha", "alpine"]);
}

#[test]
fn test_file_completion_engine_lists_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("aaa.txt"), "x").unwrap();
    std::fs::write(dir.path().join("bbb.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let mut editor = Editor::new();
    let mut context = CompletionEngineContext::new();
    context.query = format!("{}/", dir.path().display());

    assert!(file_completion_engine(&mut editor, &mut context, true));
    assert_eq!(context.results, vec!["aaa.txt", "bbb.txt", "sub/"]);
    assert_eq!(context.result_prefix, format!("{}/", dir.path().display()));
    assert_eq!(context.query, "", "prefix is consumed from the query");

    // Unchanged directory: no reload.
    context.query = format!("{}/aa", dir.path().display());
    assert!(!file_completion_engine(&mut editor, &mut context, false));
}
