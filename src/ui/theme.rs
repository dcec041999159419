//! Terminal colors for report output

use crate::compiler::Level;
use crossterm::style::{Attribute, Color, Stylize};

pub struct Theme;

impl Theme {
    pub const ERROR: Color = Color::Red;
    pub const WARNING: Color = Color::Yellow;
    pub const INFO: Color = Color::Cyan;

    pub const PASS: Color = Color::Green;
    pub const FAIL: Color = Color::Red;

    /// Secondary text: positions, slot lists, hints
    pub const MUTED: Color = Color::DarkGrey;

    pub fn level(level: Level) -> Color {
        match level {
            Level::Error => Self::ERROR,
            Level::Warning => Self::WARNING,
            Level::Info => Self::INFO,
        }
    }
}

/// Applies colors only when the output is a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn fg(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: &str) -> String {
        if self.enabled {
            text.attribute(Attribute::Bold).to_string()
        } else {
            text.to_string()
        }
    }

    /// Reverse-video badge, e.g. ` ERROR `.
    pub fn badge(&self, text: &str, color: Color) -> String {
        let padded = format!(" {} ", text);
        if self.enabled {
            padded.black().on(color).attribute(Attribute::Bold).to_string()
        } else {
            padded
        }
    }

    pub fn muted(&self, text: &str) -> String {
        self.fg(text, Theme::MUTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_painter_emits_no_escape_codes() {
        let p = Painter::plain();
        assert_eq!(p.fg("x", Theme::ERROR), "x");
        assert_eq!(p.badge("ERROR", Theme::ERROR), " ERROR ");
        assert_eq!(p.bold("b"), "b");
    }

    #[test]
    fn test_enabled_painter_wraps_text_in_ansi() {
        let p = Painter::new(true);
        let colored = p.fg("x", Theme::ERROR);
        assert!(colored.contains('\u{1b}'));
        assert!(colored.contains('x'));
    }
}
