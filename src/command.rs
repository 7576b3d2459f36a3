//! Commands: the unit of input dispatch
//!
//! A command pairs a function pointer with a stable static name.  The name
//! is what macros print, what "run command by name" resolves, and what the
//! dispatch log records, so it must not change between versions.

use crate::client::Client;
use crate::editor::Editor;
use crate::error::SkeinError;
use crate::keymap::Key;

pub type CommandFunction = fn(&mut Editor, &mut CommandContext<'_>) -> Result<(), SkeinError>;

#[derive(Clone, Copy)]
pub struct Command {
    pub function: CommandFunction,
    pub name: &'static str,
}

impl Command {
    pub const fn new(function: CommandFunction, name: &'static str) -> Command {
        Command { function, name }
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.function as usize == other.function as usize && self.name == other.name
    }
}

impl Eq for Command {}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("name", &self.name).finish()
    }
}

/// What a command sees about its invocation.
pub struct CommandContext<'a> {
    pub client: &'a mut Client,
    /// The key chain that matched this command (empty when run by name).
    pub keys: &'a [Key],
    pub previous_command: Option<&'static str>,
}
