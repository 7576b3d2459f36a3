//! Tokens and tokenizer contract
//!
//! A tokenizer is a pure function over a contents iterator: called at a
//! token boundary with the rolling state, it either consumes exactly one
//! token (returning `true` with the iterator advanced past it) or reports
//! end of input.  Language-specific tokenizers are external; this module
//! ships a structure-only default and a generic code tokenizer that
//! understands comments, strings, and paired punctuation.

pub mod cache;

pub use cache::{CheckPoint, TokenCache, CHECK_POINT_INTERVAL};

use crate::contents::ContentsIterator;

/// What a token colors as.  `Custom` carries a tokenizer-private face
/// index for anything outside the shared vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Default,
    OpenPair,
    ClosePair,
    String,
    Comment,
    Identifier,
    Keyword,
    Number,
    Punctuation,
    Preprocessor,
    Custom(u16),
}

impl Default for TokenKind {
    fn default() -> Self {
        TokenKind::Default
    }
}

/// A colorizable run of bytes: `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Token {
    pub start: u64,
    pub end: u64,
    pub kind: TokenKind,
}

/// Opaque rolling tokenizer state threaded between tokens.  The cache
/// only stores and compares it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanState(pub u64);

/// Advance past exactly one token, filling `token` and updating `state`.
/// Returns false at end of input.
pub type Tokenizer = fn(&mut ContentsIterator<'_>, &mut Token, &mut ScanState) -> bool;

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_continuation(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn skip_whitespace(iterator: &mut ContentsIterator<'_>) {
    while !iterator.at_eob() && iterator.get().is_ascii_whitespace() {
        iterator.advance();
    }
}

/// Structure-only tokenizer: identifiers, numbers, pairs, punctuation.
/// Stateless; suitable for buffers with no registered language.
pub fn default_tokenizer(
    iterator: &mut ContentsIterator<'_>,
    token: &mut Token,
    _state: &mut ScanState,
) -> bool {
    skip_whitespace(iterator);
    if iterator.at_eob() {
        return false;
    }

    token.start = iterator.position();
    let first = iterator.get();
    iterator.advance();

    if is_identifier_start(first) {
        while !iterator.at_eob() && is_identifier_continuation(iterator.get()) {
            iterator.advance();
        }
        token.kind = TokenKind::Identifier;
    } else if first.is_ascii_digit() {
        while !iterator.at_eob() && is_identifier_continuation(iterator.get()) {
            iterator.advance();
        }
        token.kind = TokenKind::Number;
    } else {
        token.kind = match first {
            b'(' | b'[' | b'{' => TokenKind::OpenPair,
            b')' | b']' | b'}' => TokenKind::ClosePair,
            _ => TokenKind::Punctuation,
        };
    }

    token.end = iterator.position();
    true
}

const IN_BLOCK_COMMENT: u64 = 1;

const COMMON_KEYWORDS: &[&str] = &[
    "break", "continue", "else", "false", "for", "if", "return", "true", "while",
];

fn lex_identifier(iterator: &mut ContentsIterator<'_>, token: &mut Token) {
    let mut word = Vec::new();
    word.push(iterator.get());
    iterator.advance();
    while !iterator.at_eob() && is_identifier_continuation(iterator.get()) {
        word.push(iterator.get());
        iterator.advance();
    }
    let word = String::from_utf8_lossy(&word).into_owned();
    token.kind = if COMMON_KEYWORDS.contains(&word.as_str()) {
        TokenKind::Keyword
    } else {
        TokenKind::Identifier
    };
}

fn lex_string(iterator: &mut ContentsIterator<'_>, quote: u8) {
    while !iterator.at_eob() {
        let byte = iterator.get();
        if byte == b'\\' {
            iterator.advance();
            if !iterator.at_eob() {
                iterator.advance();
            }
            continue;
        }
        iterator.advance();
        if byte == quote || byte == b'\n' {
            break;
        }
    }
}

/// Scan to a closing `*/`, returning true if one was found before EOF.
fn lex_block_comment_tail(iterator: &mut ContentsIterator<'_>) -> bool {
    let mut saw_star = false;
    while !iterator.at_eob() {
        let byte = iterator.get();
        iterator.advance();
        if saw_star && byte == b'/' {
            return true;
        }
        saw_star = byte == b'*';
    }
    false
}

/// Generic code tokenizer: `//` and `/* */` comments (block comments carry
/// across lines in the state), quoted strings with escapes, identifiers
/// with a small keyword set, numbers, pairs, punctuation.
pub fn code_tokenizer(
    iterator: &mut ContentsIterator<'_>,
    token: &mut Token,
    state: &mut ScanState,
) -> bool {
    if state.0 & IN_BLOCK_COMMENT != 0 {
        if iterator.at_eob() {
            return false;
        }
        token.start = iterator.position();
        if lex_block_comment_tail(iterator) {
            state.0 &= !IN_BLOCK_COMMENT;
        }
        token.end = iterator.position();
        token.kind = TokenKind::Comment;
        return true;
    }

    skip_whitespace(iterator);
    if iterator.at_eob() {
        return false;
    }

    token.start = iterator.position();
    let first = iterator.get();

    if is_identifier_start(first) {
        lex_identifier(iterator, token);
        token.end = iterator.position();
        return true;
    }

    iterator.advance();

    if first.is_ascii_digit() {
        while !iterator.at_eob() && is_identifier_continuation(iterator.get()) {
            iterator.advance();
        }
        token.kind = TokenKind::Number;
    } else if first == b'/' && !iterator.at_eob() && iterator.get() == b'/' {
        let mut line_end = *iterator;
        line_end.end_of_line();
        iterator.go_to(line_end.position());
        token.kind = TokenKind::Comment;
    } else if first == b'/' && !iterator.at_eob() && iterator.get() == b'*' {
        iterator.advance();
        if !lex_block_comment_tail(iterator) {
            state.0 |= IN_BLOCK_COMMENT;
        }
        token.kind = TokenKind::Comment;
    } else if first == b'"' || first == b'\'' {
        lex_string(iterator, first);
        token.kind = TokenKind::String;
    } else if first == b'#'
        && (token.start == 0 || iterator.contents().get(token.start - 1) == Some(b'\n'))
    {
        let mut line_end = *iterator;
        line_end.end_of_line();
        iterator.go_to(line_end.position());
        token.kind = TokenKind::Preprocessor;
    } else {
        token.kind = match first {
            b'(' | b'[' | b'{' => TokenKind::OpenPair,
            b')' | b']' | b'}' => TokenKind::ClosePair,
            _ => TokenKind::Punctuation,
        };
    }

    token.end = iterator.position();
    true
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
