//! Keys, key maps, and remaps
//!
//! A `Key` is a modifier set plus a code (printable character or named
//! key).  A `KeyMap` is a trie: every node holds a sorted array of
//! `(Key, Bind)` where a bind is either a command leaf or a nested map.
//! `KeyRemap` rewrites single keys to alternates tried during dispatch.

use bitflags::bitflags;

use crate::command::Command;
use crate::error::{ErrorKind, SkeinError};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Modifiers: u8 {
        const CTRL = 1;
        const ALT = 2;
        const SHIFT = 4;
        const GUI = 8;
    }
}

/// Non-printable key codes, plus `Char` for printable codepoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyCode {
    Char(char),
    F(u8),
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Tab,
    Enter,
    Escape,
    Mouse(u8),
    ScrollUp,
    ScrollDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub modifiers: Modifiers,
    pub code: KeyCode,
}

impl Key {
    pub fn char(c: char) -> Key {
        Key {
            modifiers: Modifiers::empty(),
            code: KeyCode::Char(c),
        }
    }

    pub fn code(code: KeyCode) -> Key {
        Key {
            modifiers: Modifiers::empty(),
            code,
        }
    }

    pub fn ctrl(c: char) -> Key {
        Key {
            modifiers: Modifiers::CTRL,
            code: KeyCode::Char(c),
        }
    }

    pub fn alt(c: char) -> Key {
        Key {
            modifiers: Modifiers::ALT,
            code: KeyCode::Char(c),
        }
    }

    /// True when pressing this key should insert text rather than run a
    /// binding lookup miss.
    pub fn is_insertable(&self) -> bool {
        if !self.modifiers.is_empty() {
            return false;
        }
        match self.code {
            KeyCode::Char(c) => !c.is_control(),
            KeyCode::Tab | KeyCode::Enter => true,
            _ => false,
        }
    }

    /// The text this key inserts (only valid when `is_insertable`).
    pub fn insert_text(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c) if self.is_insertable() => Some(c),
            KeyCode::Tab => Some('\t'),
            KeyCode::Enter => Some('\n'),
            _ => None,
        }
    }
}

const NAMED_CODES: &[(&str, KeyCode)] = &[
    ("SPACE", KeyCode::Char(' ')),
    ("UP", KeyCode::Up),
    ("DOWN", KeyCode::Down),
    ("LEFT", KeyCode::Left),
    ("RIGHT", KeyCode::Right),
    ("HOME", KeyCode::Home),
    ("END", KeyCode::End),
    ("PAGE_UP", KeyCode::PageUp),
    ("PAGE_DOWN", KeyCode::PageDown),
    ("INSERT", KeyCode::Insert),
    ("DELETE", KeyCode::Delete),
    ("BACKSPACE", KeyCode::Backspace),
    ("TAB", KeyCode::Tab),
    ("ENTER", KeyCode::Enter),
    ("ESCAPE", KeyCode::Escape),
    ("MOUSE1", KeyCode::Mouse(1)),
    ("MOUSE2", KeyCode::Mouse(2)),
    ("MOUSE3", KeyCode::Mouse(3)),
    ("MOUSE4", KeyCode::Mouse(4)),
    ("MOUSE5", KeyCode::Mouse(5)),
    ("SCROLL_UP", KeyCode::ScrollUp),
    ("SCROLL_DOWN", KeyCode::ScrollDown),
];

/// Parse one key description like `c-x`, `a-DELETE`, or `(`.
pub fn parse_key(token: &str) -> Result<Key, SkeinError> {
    let mut modifiers = Modifiers::empty();
    let mut rest = token;
    loop {
        let Some((prefix, tail)) = rest.split_once('-') else {
            break;
        };
        let flag = match prefix {
            "c" | "C" => Modifiers::CTRL,
            "a" | "A" => Modifiers::ALT,
            "s" | "S" => Modifiers::SHIFT,
            "g" | "G" => Modifiers::GUI,
            _ => break,
        };
        // A bare `-` key has no tail; leave it for the code parser.
        if tail.is_empty() {
            break;
        }
        modifiers |= flag;
        rest = tail;
    }

    let mut chars = rest.chars();
    let code = match (chars.next(), chars.next()) {
        (Some(c), None) => KeyCode::Char(c),
        _ => {
            if let Some((_, code)) = NAMED_CODES.iter().find(|(name, _)| *name == rest) {
                *code
            } else if let Some(number) = rest.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=12).contains(&number) {
                    KeyCode::F(number)
                } else {
                    return Err(bad_key(token));
                }
            } else {
                return Err(bad_key(token));
            }
        }
    };

    Ok(Key { modifiers, code })
}

/// Parse a whitespace-separated key chain description.
pub fn parse_keys(description: &str) -> Result<Vec<Key>, SkeinError> {
    description.split_whitespace().map(parse_key).collect()
}

fn bad_key(token: &str) -> SkeinError {
    SkeinError::new(
        ErrorKind::Parse,
        "BAD_KEY",
        format!("cannot parse key '{}'", token),
    )
}

/// Append the canonical description of `key` to `out`.
pub fn stringify_key(out: &mut String, key: Key) {
    if key.modifiers.contains(Modifiers::CTRL) {
        out.push_str("C-");
    }
    if key.modifiers.contains(Modifiers::ALT) {
        out.push_str("A-");
    }
    if key.modifiers.contains(Modifiers::SHIFT) {
        out.push_str("S-");
    }
    if key.modifiers.contains(Modifiers::GUI) {
        out.push_str("G-");
    }
    match key.code {
        KeyCode::Char(' ') => out.push_str("SPACE"),
        KeyCode::Char(c) => out.push(c),
        KeyCode::F(n) => out.push_str(&format!("F{}", n)),
        KeyCode::Mouse(n) => out.push_str(&format!("MOUSE{}", n)),
        other => {
            let name = NAMED_CODES
                .iter()
                .find(|(_, code)| *code == other)
                .map(|(name, _)| *name)
                .unwrap_or("UNKNOWN");
            out.push_str(name);
        }
    }
}

/// Description of a whole key chain.
pub fn stringify_keys(keys: &[Key]) -> String {
    let mut out = String::new();
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        stringify_key(&mut out, *key);
    }
    out
}

/// A leaf command or a nested map.
pub enum Bind {
    Command(Command),
    Map(Box<KeyMap>),
}

/// Trie of key chains to commands.  Bindings are kept sorted for binary
/// search lookup.
#[derive(Default)]
pub struct KeyMap {
    bindings: Vec<(Key, Bind)>,
}

impl KeyMap {
    pub fn new() -> KeyMap {
        KeyMap {
            bindings: Vec::new(),
        }
    }

    pub fn lookup(&self, key: Key) -> Option<&Bind> {
        self.bindings
            .binary_search_by(|(bound, _)| bound.cmp(&key))
            .ok()
            .map(|index| &self.bindings[index].1)
    }

    /// Bind `description` (e.g. `"c-x c-s"`) to `command`, creating inner
    /// maps as needed.  Rebinding a chain replaces the old bind.
    pub fn bind(&mut self, description: &str, command: Command) {
        let keys = match parse_keys(description) {
            Ok(keys) if !keys.is_empty() => keys,
            _ => {
                debug_assert!(false, "invalid binding description {:?}", description);
                return;
            }
        };
        self.bind_keys(&keys, command);
    }

    fn bind_keys(&mut self, keys: &[Key], command: Command) {
        let (first, rest) = keys.split_first().unwrap();
        let index = match self
            .bindings
            .binary_search_by(|(bound, _)| bound.cmp(first))
        {
            Ok(index) => index,
            Err(index) => {
                let bind = if rest.is_empty() {
                    Bind::Command(command)
                } else {
                    Bind::Map(Box::new(KeyMap::new()))
                };
                self.bindings.insert(index, (*first, bind));
                index
            }
        };

        if rest.is_empty() {
            self.bindings[index].1 = Bind::Command(command);
        } else {
            if !matches!(self.bindings[index].1, Bind::Map(_)) {
                self.bindings[index].1 = Bind::Map(Box::new(KeyMap::new()));
            }
            match &mut self.bindings[index].1 {
                Bind::Map(map) => map.bind_keys(rest, command),
                Bind::Command(_) => unreachable!(),
            }
        }
    }

    /// Longest chain this map can consume.
    pub fn max_depth(&self) -> usize {
        let mut depth = 1;
        for (_, bind) in &self.bindings {
            if let Bind::Map(map) = bind {
                depth = depth.max(1 + map.max_depth());
            }
        }
        depth
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Single-key rewrites tried as alternates during dispatch.
#[derive(Default)]
pub struct KeyRemap {
    pairs: Vec<(Key, Key)>,
}

impl KeyRemap {
    pub fn new() -> KeyRemap {
        KeyRemap { pairs: Vec::new() }
    }

    pub fn bind(&mut self, from: &str, to: &str) {
        if let (Ok(from), Ok(to)) = (parse_key(from), parse_key(to)) {
            match self.pairs.binary_search_by(|(key, _)| key.cmp(&from)) {
                Ok(index) => self.pairs[index].1 = to,
                Err(index) => self.pairs.insert(index, (from, to)),
            }
        }
    }

    pub fn bound(&self, key: Key) -> bool {
        self.pairs
            .binary_search_by(|(bound, _)| bound.cmp(&key))
            .is_ok()
    }

    pub fn get(&self, key: Key) -> Option<Key> {
        self.pairs
            .binary_search_by(|(bound, _)| bound.cmp(&key))
            .ok()
            .map(|index| self.pairs[index].1)
    }
}
