//! Completion engines, filters, and caches
//!
//! A completion cache couples an *engine* (produces candidate results for
//! the current query, possibly over several frames) with a *filter*
//! (narrows results to those matching the query) and a loading state.  The
//! engine contract: `engine(editor, context, is_initial_frame) -> bool`
//! returns true when results changed this frame; it is called once per
//! frame while the completion is open.

use std::any::Any;
use std::time::SystemTime;

use crate::editor::Editor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionState {
    Initial,
    Loading,
    Loaded,
}

/// Engine-side context: the query and the produced results.
pub struct CompletionEngineContext {
    pub query: String,
    pub results: Vec<String>,
    /// Prepended to the selected result when it is accepted (e.g. the
    /// directory part of a path query).
    pub result_prefix: String,
    /// Appended to the selected result when accepted (e.g. `:LINE`).
    pub result_suffix: String,
    /// Engine-private scratch state, dropped when the engine changes.
    pub data: Option<Box<dyn Any>>,
}

impl CompletionEngineContext {
    pub fn new() -> Self {
        CompletionEngineContext {
            query: String::new(),
            results: Vec::new(),
            result_prefix: String::new(),
            result_suffix: String::new(),
            data: None,
        }
    }

    pub fn reset(&mut self) {
        self.results.clear();
        self.result_prefix.clear();
        self.result_suffix.clear();
        self.data = None;
    }

    /// Split a trailing `:LINE[:COLUMN]` off the query into
    /// `result_suffix` so path completion ignores it.
    pub fn parse_file_line_column_suffix(&mut self) {
        let (file, _, _) = crate::fileio::parse_file_arg_no_disk(&self.query);
        let file_len = file.len();
        self.result_suffix = self.query[file_len..].to_string();
        self.query.truncate(file_len);
    }
}

impl Default for CompletionEngineContext {
    fn default() -> Self {
        CompletionEngineContext::new()
    }
}

/// Filter-side context: the filtered results and selection.
#[derive(Default)]
pub struct CompletionFilterContext {
    pub results: Vec<String>,
    pub selected: usize,
}

pub type CompletionEngine = fn(&mut Editor, &mut CompletionEngineContext, bool) -> bool;

pub type CompletionFilter =
    fn(&mut CompletionFilterContext, &CompletionEngineContext, Option<&str>);

/// State for one open completion session.
pub struct CompletionCache {
    pub engine: CompletionEngine,
    pub filter: CompletionFilter,
    pub engine_context: CompletionEngineContext,
    pub filter_context: CompletionFilterContext,
    pub state: CompletionState,
    /// Change-log length of the queried buffer when results were built.
    pub change_index: usize,
}

impl CompletionCache {
    pub fn new(engine: CompletionEngine, filter: CompletionFilter) -> Self {
        CompletionCache {
            engine,
            filter,
            engine_context: CompletionEngineContext::new(),
            filter_context: CompletionFilterContext::default(),
            state: CompletionState::Initial,
            change_index: 0,
        }
    }

    /// Note a new query revision; returns true when the engine must run.
    pub fn update(&mut self, changes_len: usize) -> bool {
        if self.change_index != changes_len {
            self.change_index = changes_len;
            self.state = CompletionState::Loading;
            return true;
        }
        false
    }

    /// Swap engines, keeping state when the engine is unchanged.
    pub fn set_engine(&mut self, engine: CompletionEngine) {
        if self.engine as usize == engine as usize {
            self.state = CompletionState::Initial;
            return;
        }
        self.engine = engine;
        self.state = CompletionState::Initial;
        self.engine_context.reset();
    }

    /// The string the selected result expands to.
    pub fn selected_result(&self) -> Option<String> {
        let result = self.filter_context.results.get(self.filter_context.selected)?;
        Some(format!(
            "{}{}{}",
            self.engine_context.result_prefix, result, self.engine_context.result_suffix
        ))
    }
}

// =============================================================================
// Filters
// =============================================================================

fn retain_selected(
    context: &mut CompletionFilterContext,
    result: &str,
    selected_result: Option<&str>,
) {
    if selected_result == Some(result) {
        context.selected = context.results.len();
    }
    context.results.push(result.to_string());
}

pub fn prefix_completion_filter(
    context: &mut CompletionFilterContext,
    engine_context: &CompletionEngineContext,
    selected_result: Option<&str>,
) {
    context.results.clear();
    context.selected = 0;
    for result in &engine_context.results {
        if result.starts_with(&engine_context.query) {
            retain_selected(context, result, selected_result);
        }
    }
}

pub fn infix_completion_filter(
    context: &mut CompletionFilterContext,
    engine_context: &CompletionEngineContext,
    selected_result: Option<&str>,
) {
    context.results.clear();
    context.selected = 0;
    for result in &engine_context.results {
        if result.contains(&engine_context.query) {
            retain_selected(context, result, selected_result);
        }
    }
}

/// Case semantics shared by the wildcard filter: lowercase query letters
/// match case-insensitively, uppercase letters match exactly.  Matching
/// is byte-wise so arbitrary offsets into multi-byte names are fine.
fn starts_with_uppercase_sticky(string: &[u8], query: &[u8]) -> bool {
    if query.len() > string.len() {
        return false;
    }
    string
        .iter()
        .zip(query)
        .all(|(s, q)| if q.is_ascii_uppercase() { s == q } else { &s.to_ascii_lowercase() == q })
}

fn ends_with_uppercase_sticky(string: &[u8], query: &[u8]) -> bool {
    if query.len() > string.len() {
        return false;
    }
    starts_with_uppercase_sticky(&string[string.len() - query.len()..], query)
}

fn find_uppercase_sticky(string: &[u8], query: &[u8]) -> Option<usize> {
    if query.is_empty() {
        return Some(0);
    }
    (0..=string.len().saturating_sub(query.len()))
        .find(|&index| starts_with_uppercase_sticky(&string[index..], query))
}

/// Parsed `spaces-are-wildcards` pattern: space-separated pieces that must
/// appear in order.  `^` anchors the first piece to the start, `%` to a
/// path component start, `$` anchors the last piece to the end.
pub struct WildcardPattern {
    wild_start: bool,
    wild_start_component: bool,
    wild_end: bool,
    pieces: Vec<String>,
}

impl WildcardPattern {
    pub fn parse(query: &str) -> WildcardPattern {
        let mut pattern = WildcardPattern {
            wild_start: true,
            wild_start_component: true,
            wild_end: true,
            pieces: Vec::new(),
        };

        let mut rest = query;
        if let Some(tail) = rest.strip_prefix('^') {
            pattern.wild_start = false;
            rest = tail.trim_start_matches(' ');
        }
        if let Some(tail) = rest.strip_prefix('%') {
            pattern.wild_start_component = false;
            rest = tail.trim_start_matches(' ');
        }
        if let Some(head) = rest.strip_suffix('$') {
            pattern.wild_end = false;
            rest = head.trim_end_matches(' ');
        }

        // Pieces split on spaces; a `/` ends a piece but stays inside it,
        // except that `/%` glues the next component onto the same piece.
        let mut piece = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ' ' => {
                    if !piece.is_empty() {
                        pattern.pieces.push(std::mem::take(&mut piece));
                    }
                }
                '/' => {
                    piece.push('/');
                    if chars.peek() == Some(&'%') {
                        chars.next();
                    } else {
                        pattern.pieces.push(std::mem::take(&mut piece));
                    }
                }
                _ => piece.push(c),
            }
        }
        if !piece.is_empty() {
            pattern.pieces.push(piece);
        }

        // A `%` anchor matches either the string start or just after a
        // `/`; folding the slash into the piece makes both cases one
        // comparison in `matches`.
        if !pattern.wild_start_component {
            if let Some(first) = pattern.pieces.first_mut() {
                first.insert(0, '/');
            }
        }

        pattern
    }

    pub fn matches(&self, string: &str) -> bool {
        let string = string.as_bytes();
        let mut index = 0;
        for (piece_index, piece) in self.pieces.iter().enumerate() {
            let piece = piece.as_bytes();
            if piece_index == 0 && (!self.wild_start || !self.wild_start_component) {
                let bare = if !self.wild_start_component {
                    &piece[1..]
                } else {
                    piece
                };
                if starts_with_uppercase_sticky(string, bare) {
                    index = bare.len();
                    continue;
                }
                if !self.wild_start {
                    return false;
                }
            }

            // Only the end matters for an anchored last piece, even when
            // it occurs several times.
            if piece_index + 1 == self.pieces.len() && !self.wild_end {
                return string.len() >= index + piece.len()
                    && ends_with_uppercase_sticky(string, piece);
            }

            match find_uppercase_sticky(&string[index..], piece) {
                Some(found) => index += found + piece.len(),
                None => return false,
            }
        }
        if !self.wild_end && index < string.len() {
            return false;
        }
        true
    }
}

pub fn spaces_are_wildcards_completion_filter(
    context: &mut CompletionFilterContext,
    engine_context: &CompletionEngineContext,
    selected_result: Option<&str>,
) {
    let pattern = WildcardPattern::parse(&engine_context.query);
    context.results.clear();
    context.selected = 0;
    for result in &engine_context.results {
        if pattern.matches(result) {
            retain_selected(context, result, selected_result);
        }
    }
}

// =============================================================================
// Engines
// =============================================================================

pub fn no_completion_engine(
    _editor: &mut Editor,
    _context: &mut CompletionEngineContext,
    _is_initial_frame: bool,
) -> bool {
    false
}

/// Candidates are the render names of every live buffer.
pub fn buffer_completion_engine(
    editor: &mut Editor,
    context: &mut CompletionEngineContext,
    is_initial_frame: bool,
) -> bool {
    if !is_initial_frame && !context.results.is_empty() {
        return false;
    }

    context.results.clear();
    for handle in editor.buffers() {
        let buffer = handle.lock_reading();
        context.results.push(buffer.render_name());
    }
    true
}

struct FileEngineData {
    directory: String,
    file_time: Option<SystemTime>,
}

/// Directory listing completion for the path under the query.  Reloads
/// only when the directory or its mtime changes.
pub fn file_completion_engine(
    _editor: &mut Editor,
    context: &mut CompletionEngineContext,
    _is_initial_frame: bool,
) -> bool {
    context.parse_file_line_column_suffix();

    let (directory, prefix) = split_directory_prefix(&context.query);

    let file_time = std::fs::metadata(&directory)
        .and_then(|meta| meta.modified())
        .ok();

    let unchanged = context
        .data
        .as_ref()
        .and_then(|data| data.downcast_ref::<FileEngineData>())
        .map(|data| data.directory == directory && data.file_time == file_time)
        .unwrap_or(false);
    if unchanged {
        context.query.drain(..prefix.len());
        return false;
    }

    context.result_prefix = prefix.clone();
    context.query.drain(..prefix.len());
    context.results.clear();

    if let Ok(entries) = std::fs::read_dir(&directory) {
        for entry in entries.flatten() {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            context.results.push(name);
        }
    }
    context.results.sort();

    context.data = Some(Box::new(FileEngineData {
        directory,
        file_time,
    }));
    true
}

/// Split the query into the directory to list and the typed prefix to
/// keep on accepted results.  `~/` resolves through `$HOME`.
fn split_directory_prefix(query: &str) -> (String, String) {
    match query.rfind('/') {
        Some(slash) => {
            let prefix = query[..=slash].to_string();
            let directory = if let Some(rest) = prefix.strip_prefix("~/") {
                match crate::fileio::home_directory() {
                    Some(home) => home.join(rest).to_string_lossy().into_owned(),
                    None => prefix.clone(),
                }
            } else {
                prefix.clone()
            };
            (directory, prefix)
        }
        None => ("./".to_string(), String::new()),
    }
}

/// Candidates from the identifiers of a buffer; used for inline
/// completion inside a window.
pub fn buffer_word_completion_results(
    contents: &crate::contents::Contents,
    query: &str,
) -> Vec<String> {
    let text = contents.stringify();
    let mut seen = std::collections::BTreeSet::new();
    let mut start = None;
    for (index, c) in text.char_indices().chain([(text.len(), ' ')]) {
        if c.is_alphanumeric() || c == '_' {
            start.get_or_insert(index);
        } else if let Some(from) = start.take() {
            let word = &text[from..index];
            if word.len() > 1 && word != query && word.starts_with(query) {
                seen.insert(word.to_string());
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
