//! Console output formatting with ANSI color support.
//!
//! Styled terminal output for the reader CLI, with automatic TTY detection
//! and respect for the NO_COLOR environment variable.

use crate::store::Credits;
use std::io::{self, IsTerminal};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Colors are off when `NO_COLOR` is set or stdout is not a terminal.
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self { colors_enabled }
    }

    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", self.label("INFO", Style::Blue), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.label("OK", Style::Green), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", self.label("WARN", Style::Yellow), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.label("ERROR", Style::Red), message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// A short titled notice, like a toast.
    pub fn notice(&self, title: &str, description: &str) {
        println!("{}", self.format_notice(title, description));
    }

    fn format_notice(&self, title: &str, description: &str) -> String {
        let title = self.style(title, &[Style::Cyan, Style::Bold]);
        if description.is_empty() {
            format!("» {}", title)
        } else {
            format!("» {} {}", title, self.muted(description))
        }
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Formats a star rating, e.g. `★★★★☆ 4.2 (95)`.
    pub fn stars(&self, average: f64, count: u32) -> String {
        let filled = average.round().clamp(0.0, 5.0) as usize;
        let bar = format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled));
        format!(
            "{} {:.1} {}",
            self.style(&bar, &[Style::Yellow]),
            average,
            self.muted(&format!("({})", count))
        )
    }

    pub fn credits(&self, amount: Credits) -> String {
        self.style(&amount.to_string(), &[Style::Green, Style::Bold])
    }

    /// Badge for premium series.
    pub fn premium_badge(&self) -> String {
        self.style("PREMIUM", &[Style::Yellow, Style::Bold])
    }
}
