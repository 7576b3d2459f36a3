//! Colors and render tunables.

use crossterm::style::Color;

use crate::token::TokenKind;

/// One cell's face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub reverse: bool,
}

impl Style {
    pub const fn new(fg: Color, bg: Color) -> Style {
        Style {
            fg,
            bg,
            bold: false,
            reverse: false,
        }
    }

    pub const fn bold(mut self) -> Style {
        self.bold = true;
        self
    }

    pub const fn reverse(mut self) -> Style {
        self.reverse = true;
        self
    }
}

impl Default for Style {
    fn default() -> Style {
        Style::new(Color::Reset, Color::Reset)
    }
}

/// The palette plus the scrolling/completion tunables the render pipeline
/// reads every frame.
pub struct Theme {
    pub default_style: Style,
    pub mode_line_style: Style,
    pub mode_line_modified_style: Style,
    pub message_style: Style,
    pub selection_style: Style,
    pub cursor_style: Style,
    pub separator_style: Style,
    pub completion_style: Style,
    pub completion_selected_style: Style,

    /// Rows of margin kept between the cursor and the window edge.
    pub scroll_outside_visual_rows: u16,
    /// Columns of grace for horizontal scrolling.
    pub scroll_outside_visual_columns: u16,
    /// Snap to half-page boundaries when the cursor leaves the window.
    pub scroll_jump_half_page_when_outside_visible_region: bool,
    pub allow_animated_scrolling: bool,
    /// Rows the mini-buffer completion popup may use.
    pub mini_buffer_max_height: u16,
    /// How many printable keys in one poll window trigger batch paste.
    pub batch_paste_threshold: usize,
}

impl Theme {
    pub fn token_style(&self, kind: TokenKind) -> Style {
        let bg = self.default_style.bg;
        match kind {
            TokenKind::Default | TokenKind::Identifier => self.default_style,
            TokenKind::OpenPair | TokenKind::ClosePair => Style::new(Color::Cyan, bg),
            TokenKind::String => Style::new(Color::Green, bg),
            TokenKind::Comment => Style::new(Color::DarkGrey, bg),
            TokenKind::Keyword => Style::new(Color::Magenta, bg).bold(),
            TokenKind::Number => Style::new(Color::Yellow, bg),
            TokenKind::Punctuation => Style::new(Color::Grey, bg),
            TokenKind::Preprocessor => Style::new(Color::Blue, bg),
            TokenKind::Custom(_) => self.default_style,
        }
    }
}

impl Default for Theme {
    fn default() -> Theme {
        Theme {
            default_style: Style::new(Color::Reset, Color::Reset),
            mode_line_style: Style::new(Color::Black, Color::Grey),
            mode_line_modified_style: Style::new(Color::Black, Color::Yellow),
            message_style: Style::new(Color::Reset, Color::Reset).bold(),
            selection_style: Style::new(Color::Black, Color::DarkCyan),
            cursor_style: Style::new(Color::Black, Color::White),
            separator_style: Style::new(Color::DarkGrey, Color::Reset),
            completion_style: Style::new(Color::Black, Color::Grey),
            completion_selected_style: Style::new(Color::White, Color::DarkBlue).bold(),

            scroll_outside_visual_rows: 3,
            scroll_outside_visual_columns: 10,
            scroll_jump_half_page_when_outside_visible_region: false,
            allow_animated_scrolling: true,
            mini_buffer_max_height: 8,
            batch_paste_threshold: 8,
        }
    }
}
