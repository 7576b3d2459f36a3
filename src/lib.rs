//! Skein - a multi-client, multi-cursor terminal text editor

pub mod buffer;
pub mod change;
pub mod client;
pub mod command;
pub mod commands;
pub mod completion;
pub mod contents;
pub mod cursor;
pub mod dirbuf;
pub mod editor;
pub mod error;
pub mod fileio;
pub mod jobs;
pub mod keymap;
pub mod remote;
pub mod render;
pub mod screen;
pub mod server;
pub mod term;
pub mod theme;
pub mod token;
pub mod transaction;
pub mod window;
