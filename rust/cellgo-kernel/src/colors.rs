//! ANSI styling for front-end messages.
//!
//! Styling is skipped when `NO_COLOR` is set or stderr is not a terminal.

use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red = 31,
    Green = 32,
    Yellow = 33,
    Cyan = 36,
    Gray = 90,
}

pub fn enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

fn wrap(codes: &str, s: &str, on: bool) -> String {
    if on {
        format!("\x1b[{codes}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

pub fn paint(color: Color, s: &str) -> String {
    wrap(&(color as u8).to_string(), s, enabled())
}

pub fn bold(s: &str) -> String {
    wrap("1", s, enabled())
}

/// Right-aligned bold label, e.g. `   Memorized`.
pub fn status_label(color: Color, label: &str) -> String {
    wrap(
        &format!("1;{}", color as u8),
        &format!("{label:>12}"),
        enabled(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_switch() {
        assert_eq!(wrap("31", "x", true), "\x1b[31mx\x1b[0m");
        assert_eq!(wrap("31", "x", false), "x");
    }

    #[test]
    fn label_is_padded() {
        assert!(status_label(Color::Green, "Done").contains("        Done"));
    }
}
