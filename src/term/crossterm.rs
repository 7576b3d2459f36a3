//! Crossterm-based terminal backend
//! Cross-platform raw-mode terminal: translates crossterm events into
//! editor keys and blits cell batches with minimal cursor movement.

use std::io::{stdout, BufWriter, Stdout, Write};
use std::time::Duration;

use anyhow::Context;
use crossterm::event::{
    Event, KeyCode as CtKeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::style::{Attribute, SetAttribute, SetBackgroundColor, SetForegroundColor};
use crossterm::{cursor, event, execute, queue, terminal};

use crate::keymap::{Key, KeyCode, Modifiers};
use crate::screen::CellBatch;
use crate::theme::Style;

use super::{BackendEvent, TerminalBackend};

pub struct CrosstermBackend {
    writer: BufWriter<Stdout>,
    raw_mode: bool,
    alternate_screen: bool,
    last_style: Option<Style>,
}

impl CrosstermBackend {
    pub fn new() -> CrosstermBackend {
        CrosstermBackend {
            writer: BufWriter::with_capacity(1 << 16, stdout()),
            raw_mode: false,
            alternate_screen: false,
            last_style: None,
        }
    }

    fn apply_style(&mut self, style: Style) -> anyhow::Result<()> {
        if self.last_style == Some(style) {
            return Ok(());
        }
        queue!(self.writer, SetAttribute(Attribute::Reset))?;
        if style.bold {
            queue!(self.writer, SetAttribute(Attribute::Bold))?;
        }
        if style.reverse {
            queue!(self.writer, SetAttribute(Attribute::Reverse))?;
        }
        queue!(
            self.writer,
            SetForegroundColor(style.fg),
            SetBackgroundColor(style.bg)
        )?;
        self.last_style = Some(style);
        Ok(())
    }
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        CrosstermBackend::new()
    }
}

impl TerminalBackend for CrosstermBackend {
    fn init(&mut self) -> anyhow::Result<()> {
        execute!(self.writer, terminal::EnterAlternateScreen)
            .context("enter alternate screen")?;
        self.alternate_screen = true;
        terminal::enable_raw_mode().context("enable raw mode")?;
        self.raw_mode = true;
        execute!(
            self.writer,
            cursor::Hide,
            event::EnableMouseCapture,
            terminal::Clear(terminal::ClearType::All)
        )?;
        self.writer.flush()?;
        Ok(())
    }

    fn deinit(&mut self) {
        let _ = execute!(self.writer, event::DisableMouseCapture, cursor::Show);
        if self.raw_mode {
            let _ = terminal::disable_raw_mode();
            self.raw_mode = false;
        }
        if self.alternate_screen {
            let _ = execute!(self.writer, terminal::LeaveAlternateScreen);
            self.alternate_screen = false;
        }
        let _ = self.writer.flush();
    }

    fn poll_event(&mut self, timeout: Duration) -> anyhow::Result<Option<BackendEvent>> {
        if !event::poll(timeout).context("poll terminal event")? {
            return Ok(None);
        }
        match event::read().context("read terminal event")? {
            Event::Key(key_event) => Ok(translate_key_event(key_event)),
            Event::Mouse(mouse_event) => Ok(translate_mouse_event(mouse_event)),
            Event::Resize(cols, rows) => Ok(Some(BackendEvent::Resize(rows, cols))),
            _ => Ok(None),
        }
    }

    fn size(&self) -> anyhow::Result<(u16, u16)> {
        let (cols, rows) = terminal::size().context("query terminal size")?;
        Ok((rows, cols))
    }

    fn draw(&mut self, batches: &[CellBatch]) -> anyhow::Result<()> {
        for batch in batches {
            queue!(self.writer, cursor::MoveTo(batch.start_col, batch.row))?;
            for cell in &batch.cells {
                self.apply_style(cell.style)?;
                queue!(self.writer, crossterm::style::Print(cell.ch))?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    fn place_cursor(&mut self, row: u16, col: u16) -> anyhow::Result<()> {
        execute!(self.writer, cursor::MoveTo(col, row))?;
        Ok(())
    }
}

fn translate_modifiers(modifiers: KeyModifiers) -> Modifiers {
    let mut out = Modifiers::empty();
    if modifiers.contains(KeyModifiers::CONTROL) {
        out |= Modifiers::CTRL;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        out |= Modifiers::ALT;
    }
    if modifiers.contains(KeyModifiers::SHIFT) {
        out |= Modifiers::SHIFT;
    }
    if modifiers.contains(KeyModifiers::SUPER) {
        out |= Modifiers::GUI;
    }
    out
}

pub(crate) fn translate_key_event(key_event: KeyEvent) -> Option<BackendEvent> {
    if key_event.kind == KeyEventKind::Release {
        return None;
    }
    let mut modifiers = translate_modifiers(key_event.modifiers);
    let code = match key_event.code {
        CtKeyCode::Char(c) => {
            // The terminal already shifted printable characters.
            modifiers.remove(Modifiers::SHIFT);
            KeyCode::Char(c)
        }
        CtKeyCode::F(n) => KeyCode::F(n),
        CtKeyCode::Up => KeyCode::Up,
        CtKeyCode::Down => KeyCode::Down,
        CtKeyCode::Left => KeyCode::Left,
        CtKeyCode::Right => KeyCode::Right,
        CtKeyCode::Home => KeyCode::Home,
        CtKeyCode::End => KeyCode::End,
        CtKeyCode::PageUp => KeyCode::PageUp,
        CtKeyCode::PageDown => KeyCode::PageDown,
        CtKeyCode::Insert => KeyCode::Insert,
        CtKeyCode::Delete => KeyCode::Delete,
        CtKeyCode::Backspace => KeyCode::Backspace,
        CtKeyCode::Tab => KeyCode::Tab,
        CtKeyCode::BackTab => {
            modifiers |= Modifiers::SHIFT;
            KeyCode::Tab
        }
        CtKeyCode::Enter => KeyCode::Enter,
        CtKeyCode::Esc => KeyCode::Escape,
        _ => return None,
    };
    Some(BackendEvent::Key(Key { modifiers, code }))
}

fn mouse_code(button: MouseButton) -> KeyCode {
    match button {
        MouseButton::Left => KeyCode::Mouse(1),
        MouseButton::Middle => KeyCode::Mouse(2),
        MouseButton::Right => KeyCode::Mouse(3),
    }
}

fn translate_mouse_event(mouse_event: MouseEvent) -> Option<BackendEvent> {
    let modifiers = translate_modifiers(mouse_event.modifiers);
    match mouse_event.kind {
        MouseEventKind::Down(button) => Some(BackendEvent::Key(Key {
            modifiers,
            code: mouse_code(button),
        })),
        MouseEventKind::Up(button) => Some(BackendEvent::Release(Key {
            modifiers,
            code: mouse_code(button),
        })),
        MouseEventKind::ScrollUp => Some(BackendEvent::Key(Key {
            modifiers,
            code: KeyCode::ScrollUp,
        })),
        MouseEventKind::ScrollDown => Some(BackendEvent::Key(Key {
            modifiers,
            code: KeyCode::ScrollDown,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: CtKeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_translate_plain_char() {
        let event = translate_key_event(press(CtKeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(event, Some(BackendEvent::Key(Key::char('a'))));
    }

    #[test]
    fn test_translate_shifted_char_drops_shift() {
        let event = translate_key_event(press(CtKeyCode::Char('A'), KeyModifiers::SHIFT));
        assert_eq!(event, Some(BackendEvent::Key(Key::char('A'))));
    }

    #[test]
    fn test_translate_ctrl_char() {
        let event = translate_key_event(press(CtKeyCode::Char('x'), KeyModifiers::CONTROL));
        assert_eq!(event, Some(BackendEvent::Key(Key::ctrl('x'))));
    }

    #[test]
    fn test_translate_named_keys() {
        let event = translate_key_event(press(CtKeyCode::PageDown, KeyModifiers::NONE));
        assert_eq!(
            event,
            Some(BackendEvent::Key(Key::code(KeyCode::PageDown)))
        );
        let event = translate_key_event(press(CtKeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(event, Some(BackendEvent::Key(Key::code(KeyCode::Escape))));
    }
}
