use super::*;

use crate::contents::Contents;

fn scan_all(contents: &Contents, tokenizer: Tokenizer) -> Vec<Token> {
    let mut iterator = contents.start();
    let mut state = ScanState::default();
    let mut token = Token::default();
    let mut out = Vec::new();
    while tokenizer(&mut iterator, &mut token, &mut state) {
        out.push(token);
    }
    out
}

#[test]
fn test_default_tokenizer_basics() {
    let contents = Contents::from_str("foo bar_9 42 (x)");
    let tokens = scan_all(&contents, default_tokenizer);
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Number,
            TokenKind::OpenPair,
            TokenKind::Identifier,
            TokenKind::ClosePair,
        ]
    );
    assert_eq!(tokens[0].start, 0);
    assert_eq!(tokens[0].end, 3);
    assert_eq!(tokens[1].start, 4);
    assert_eq!(tokens[1].end, 9);
}

#[test]
fn test_code_tokenizer_line_comment() {
    let contents = Contents::from_str("x // rest of line\ny");
    let tokens = scan_all(&contents, code_tokenizer);
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[1].kind, TokenKind::Comment);
    assert_eq!(tokens[1].start, 2);
    assert_eq!(tokens[1].end, 17);
    assert_eq!(tokens[2].kind, TokenKind::Identifier);
}

#[test]
fn test_code_tokenizer_block_comment_state() {
    let contents = Contents::from_str("a /* span\nmore */ b");
    let mut iterator = contents.start();
    let mut state = ScanState::default();
    let mut token = Token::default();

    assert!(code_tokenizer(&mut iterator, &mut token, &mut state));
    assert_eq!(token.kind, TokenKind::Identifier);
    assert!(code_tokenizer(&mut iterator, &mut token, &mut state));
    assert_eq!(token.kind, TokenKind::Comment);
    assert_eq!(state.0, 0, "closed comment clears the state");

    // An unterminated block comment leaves the state set.
    let contents = Contents::from_str("/* open");
    let mut iterator = contents.start();
    let mut state = ScanState::default();
    assert!(code_tokenizer(&mut iterator, &mut token, &mut state));
    assert_eq!(token.kind, TokenKind::Comment);
    assert_ne!(state.0, 0);
}

#[test]
fn test_code_tokenizer_strings_and_keywords() {
    let contents = Contents::from_str(r#"if x "a \" b" 'c'"#);
    let tokens = scan_all(&contents, code_tokenizer);
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Keyword,
            TokenKind::Identifier,
            TokenKind::String,
            TokenKind::String,
        ]
    );
}

#[test]
fn test_checkpoint_state_reproduces_full_scan() {
    // Running the tokenizer from any check-point with its stored state
    // must produce the same tokens as running from zero.
    let mut text = String::new();
    for index in 0..400 {
        text.push_str(&format!("word{} /* c{} */ \"s{}\"\n", index, index, index));
    }
    let contents = Contents::from_str(&text);

    let mut cache = TokenCache::new();
    cache.generate_check_points_until(&contents, code_tokenizer, contents.len());
    cache.check_invariants();
    assert!(cache.is_covered(contents.len()));
    assert!(cache.check_points.len() > 2);

    let full = scan_all(&contents, code_tokenizer);
    for check_point in &cache.check_points {
        let mut iterator = contents.iterator_at(check_point.position);
        let mut state = check_point.state;
        let mut token = Token::default();
        let mut from_check_point = Vec::new();
        while code_tokenizer(&mut iterator, &mut token, &mut state) {
            from_check_point.push(token);
        }
        let expected: Vec<Token> = full
            .iter()
            .copied()
            .filter(|t| t.start >= check_point.position)
            .collect();
        assert_eq!(from_check_point, expected);
    }
}

#[test]
fn test_find_check_point() {
    let mut cache = TokenCache::new();
    assert_eq!(
        cache.find_check_point(500),
        CheckPoint {
            position: 0,
            state: ScanState::default()
        }
    );

    cache.check_points.push(CheckPoint {
        position: 1000,
        state: ScanState(1),
    });
    cache.check_points.push(CheckPoint {
        position: 2100,
        state: ScanState(2),
    });
    assert_eq!(cache.find_check_point(999).position, 0);
    assert_eq!(cache.find_check_point(1000).state, ScanState(1));
    assert_eq!(cache.find_check_point(2099).state, ScanState(1));
    assert_eq!(cache.find_check_point(9999).state, ScanState(2));
}

#[test]
fn test_update_survives_trivial_edit_in_comment() {
    // Build a ~10KB code-like buffer, cache it fully, then edit inside a
    // comment.  The cache must recover by state match: check-points after
    // the edit only shift, and the tail survives.
    let mut text = String::new();
    for index in 0..300 {
        text.push_str(&format!("fn name{} () /* note {} */\n", index, index));
    }
    let mut contents = Contents::from_str(&text);
    assert!(contents.len() > 8192);

    let mut cache = TokenCache::new();
    cache.generate_check_points_until(&contents, code_tokenizer, contents.len());
    let before = cache.check_points.clone();
    let covered_before = cache.covered_until();

    // Insert one character inside the first comment.
    let edit_pos = text.find("note").unwrap() as u64;
    let changes = {
        let mut log = crate::change::ChangeLog::new();
        let edit = crate::change::Edit::insert(edit_pos, "x");
        crate::change::apply_edit(&mut contents, &edit).unwrap();
        log.push_commit(vec![edit]);
        log
    };

    let valid = cache.update(&contents, &changes.changes, code_tokenizer);
    assert!(valid, "state-match recovery must salvage the cache");
    cache.check_invariants();
    assert_eq!(cache.change_index, changes.len());
    assert_eq!(cache.covered_until(), covered_before + 1);

    // Check-points before the edit are untouched; later ones shifted by 1.
    for check_point in &cache.check_points {
        if check_point.position <= edit_pos {
            assert!(before.contains(check_point));
        } else {
            let original = CheckPoint {
                position: check_point.position - 1,
                state: check_point.state,
            };
            assert!(
                before.contains(&original),
                "shifted check-point must match a pre-edit one"
            );
        }
    }
}

/// Word tokenizer whose state counts every `a` seen, so an inserted `a`
/// permanently diverges all downstream states.
fn counting_tokenizer(
    iterator: &mut crate::contents::ContentsIterator<'_>,
    token: &mut Token,
    state: &mut ScanState,
) -> bool {
    while !iterator.at_eob() && iterator.get().is_ascii_whitespace() {
        iterator.advance();
    }
    if iterator.at_eob() {
        return false;
    }
    token.start = iterator.position();
    while !iterator.at_eob() && !iterator.get().is_ascii_whitespace() {
        if iterator.get() == b'a' {
            state.0 += 1;
        }
        iterator.advance();
    }
    token.end = iterator.position();
    token.kind = TokenKind::Identifier;
    true
}

#[test]
fn test_update_discards_tail_when_states_diverge() {
    // With a cumulative state, no downstream check-point can ever be
    // salvaged; update must cut the tail instead of lexing to the end of
    // the file on the frame path.
    let text = "am stram gram ".repeat(3000);
    let mut contents = Contents::from_str(&text);

    let mut cache = TokenCache::new();
    cache.generate_check_points_until(&contents, counting_tokenizer, contents.len());
    assert!(cache.is_covered(contents.len()));
    let count_before = cache.check_points.len();
    assert!(count_before > 10);

    let mut log = crate::change::ChangeLog::new();
    let edit = crate::change::Edit::insert(3, "a");
    crate::change::apply_edit(&mut contents, &edit).unwrap();
    log.push_commit(vec![edit]);

    let valid = cache.update(&contents, &log.changes, counting_tokenizer);
    assert!(!valid);
    cache.check_invariants();
    assert_eq!(cache.change_index, log.len());
    assert!(!cache.is_covered(contents.len()));
    assert!(cache.check_points.len() < count_before);

    // Asynchronous re-extension rebuilds coverage from the cut.
    cache.generate_check_points_until(&contents, counting_tokenizer, contents.len());
    assert!(cache.is_covered(contents.len()));
    cache.check_invariants();
}

#[test]
fn test_update_handles_undo_entries() {
    let mut text = String::new();
    for index in 0..200 {
        text.push_str(&format!("alpha{} beta{}\n", index, index));
    }
    let mut contents = Contents::from_str(&text);

    let mut cache = TokenCache::new();
    cache.generate_check_points_until(&contents, code_tokenizer, contents.len());
    let before = cache.check_points.clone();

    let mut log = crate::change::ChangeLog::new();
    let edit = crate::change::Edit::insert(6, "zzz");
    crate::change::apply_edit(&mut contents, &edit).unwrap();
    log.push_commit(vec![edit.clone()]);

    assert!(cache.update(&contents, &log.changes, code_tokenizer));

    let edits = log.undo().unwrap();
    for edit in edits.iter().rev() {
        crate::change::unapply_edit(&mut contents, edit).unwrap();
    }
    assert!(cache.update(&contents, &log.changes, code_tokenizer));
    cache.check_invariants();
    assert_eq!(cache.check_points, before);
}

#[test]
fn test_is_covered_and_incremental_extension() {
    let text = "word ".repeat(2000);
    let contents = Contents::from_str(&text);
    let mut cache = TokenCache::new();

    cache.generate_check_points_until(&contents, code_tokenizer, 3000);
    assert!(cache.is_covered(3000));
    assert!(!cache.is_covered(contents.len()));

    cache.generate_check_points_until(&contents, code_tokenizer, contents.len());
    assert!(cache.is_covered(contents.len()));
    cache.check_invariants();
}

#[test]
fn test_tokens_in_range() {
    let contents = Contents::from_str("one two three four");
    let mut cache = TokenCache::new();
    cache.generate_check_points_until(&contents, code_tokenizer, contents.len());
    let tokens = cache.tokens_in(&contents, code_tokenizer, 4, 13);
    let texts: Vec<String> = tokens
        .iter()
        .map(|t| contents.slice_string(t.start, t.end))
        .collect();
    assert_eq!(texts, vec!["two", "three"]);
}
