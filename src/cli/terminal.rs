//! Terminal capability detection and output styling.

use owo_colors::OwoColorize;

/// Whether colored output should be emitted on stdout.
pub fn color_enabled() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Detected terminal width, if any.
pub fn terminal_width() -> Option<u16> {
    terminal_size::terminal_size().map(|(w, _)| w.0)
}

/// Whether the terminal is too narrow for tabular layouts.
pub fn is_narrow() -> bool {
    terminal_width().is_some_and(|w| w < 60)
}

/// Extension trait for colorizing output.
pub trait Colorize {
    /// Color as success (green).
    fn success(&self) -> String;
    /// Color as warning (yellow).
    fn warning(&self) -> String;
    /// Dim the text.
    fn dim(&self) -> String;
}

impl Colorize for str {
    fn success(&self) -> String {
        if color_enabled() {
            self.green().to_string()
        } else {
            self.to_string()
        }
    }

    fn warning(&self) -> String {
        if color_enabled() {
            self.yellow().to_string()
        } else {
            self.to_string()
        }
    }

    fn dim(&self) -> String {
        if color_enabled() {
            self.dimmed().to_string()
        } else {
            self.to_string()
        }
    }
}

impl Colorize for String {
    fn success(&self) -> String {
        self.as_str().success()
    }

    fn warning(&self) -> String {
        self.as_str().warning()
    }

    fn dim(&self) -> String {
        self.as_str().dim()
    }
}
