//! Keyboard and mouse input types
//!
//! Platform-agnostic input events handed over by the host adapter. Key codes
//! also double as module keybinds, so they have a stable text form.

use std::fmt;

/// A keyboard event representing a key press, release, or repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    /// The key that was pressed
    pub key: KeyCode,
    /// Modifier keys that were held during the event
    pub modifiers: KeyModifiers,
    /// The kind of keyboard event (press, release, or repeat)
    pub kind: KeyEventKind,
}

/// Represents a key on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A character key (a-z, 0-9, symbols, etc.)
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    /// Function keys F1-F25
    F(u8),
}

/// Modifier keys that can be held during a keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// The kind of keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Press,
    Release,
    Repeat,
}

/// Mouse buttons the host reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u8),
}

/// A mouse button event at a screen position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub kind: KeyEventKind,
    pub x: f64,
    pub y: f64,
}

impl KeyboardEvent {
    pub fn new(key: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> Self {
        Self {
            key,
            modifiers,
            kind,
        }
    }

    /// Create a keyboard event for a character press with no modifiers
    pub fn char_press(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::default(), KeyEventKind::Press)
    }

    /// Create a keyboard event for a key press with no modifiers
    pub fn key_press(key: KeyCode) -> Self {
        Self::new(key, KeyModifiers::default(), KeyEventKind::Press)
    }
}

impl KeyModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Default::default()
        }
    }

    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Default::default()
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Default::default()
        }
    }

    /// Check if no modifiers are active
    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift
    }
}

impl MouseEvent {
    pub fn press(button: MouseButton, x: f64, y: f64) -> Self {
        Self {
            button,
            kind: KeyEventKind::Press,
            x,
            y,
        }
    }
}

impl KeyCode {
    /// Parse the text form produced by `Display` (`"F6"`, `"tab"`, `"r"`)
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(KeyCode::Char(c.to_ascii_lowercase()));
        }

        let lower = text.to_ascii_lowercase();
        let key = match lower.as_str() {
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "backspace" => KeyCode::Backspace,
            "escape" | "esc" => KeyCode::Escape,
            "delete" | "del" => KeyCode::Delete,
            "insert" | "ins" => KeyCode::Insert,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "pageup" => KeyCode::PageUp,
            "pagedown" => KeyCode::PageDown,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "space" => KeyCode::Char(' '),
            other => {
                let number = other.strip_prefix('f')?.parse::<u8>().ok()?;
                if !(1..=25).contains(&number) {
                    return None;
                }
                KeyCode::F(number)
            }
        };
        Some(key)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(' ') => write!(f, "space"),
            KeyCode::Char(c) => write!(f, "{}", c),
            KeyCode::Enter => write!(f, "enter"),
            KeyCode::Tab => write!(f, "tab"),
            KeyCode::Backspace => write!(f, "backspace"),
            KeyCode::Escape => write!(f, "escape"),
            KeyCode::Delete => write!(f, "delete"),
            KeyCode::Insert => write!(f, "insert"),
            KeyCode::Home => write!(f, "home"),
            KeyCode::End => write!(f, "end"),
            KeyCode::PageUp => write!(f, "pageup"),
            KeyCode::PageDown => write!(f, "pagedown"),
            KeyCode::Up => write!(f, "up"),
            KeyCode::Down => write!(f, "down"),
            KeyCode::Left => write!(f, "left"),
            KeyCode::Right => write!(f, "right"),
            KeyCode::F(n) => write!(f, "F{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_keys() {
        assert_eq!(KeyCode::parse("F6"), Some(KeyCode::F(6)));
        assert_eq!(KeyCode::parse("f12"), Some(KeyCode::F(12)));
        assert_eq!(KeyCode::parse("Tab"), Some(KeyCode::Tab));
        assert_eq!(KeyCode::parse("R"), Some(KeyCode::Char('r')));
        assert_eq!(KeyCode::parse("space"), Some(KeyCode::Char(' ')));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert_eq!(KeyCode::parse("F99"), None);
        assert_eq!(KeyCode::parse("hyper"), None);
        assert_eq!(KeyCode::parse(""), None);
    }

    #[test]
    fn test_display_round_trips() {
        for key in [KeyCode::F(6), KeyCode::Char('x'), KeyCode::PageDown, KeyCode::Char(' ')] {
            assert_eq!(KeyCode::parse(&key.to_string()), Some(key));
        }
    }

    #[test]
    fn test_modifiers() {
        assert!(KeyModifiers::new().is_empty());
        assert!(!KeyModifiers::ctrl().is_empty());
    }
}
