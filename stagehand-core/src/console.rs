//! Stateless console formatting.
//!
//! Whether output is coloured is a capability handed to [`Console`] at
//! construction; nothing here reads or writes process-wide state.

use std::io::IsTerminal;

use colored::Colorize;

/// Severity of an operator-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A step the command is about to take.
    Step,
    Info,
    Success,
    Warn,
    Error,
}

impl Severity {
    fn marker(self) -> &'static str {
        match self {
            Severity::Step => "→",
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Warn => "!",
            Severity::Error => "✗",
        }
    }
}

/// Formats messages for one output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    color: bool,
}

impl Console {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour only when stdout is a terminal and `NO_COLOR` is unset.
    pub fn for_stdout() -> Self {
        Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    /// Colour only when stderr is a terminal and `NO_COLOR` is unset.
    pub fn for_stderr() -> Self {
        Self::new(std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Render `message` as a single line prefixed by its severity marker.
    pub fn render(&self, severity: Severity, message: &str) -> String {
        let marker = severity.marker();
        if !self.color {
            return format!("{marker} {message}");
        }
        let marker = match severity {
            Severity::Step => marker.cyan().bold(),
            Severity::Info => marker.bright_black(),
            Severity::Success => marker.green().bold(),
            Severity::Warn => marker.yellow().bold(),
            Severity::Error => marker.red().bold(),
        };
        let message = match severity {
            Severity::Error => message.red().to_string(),
            Severity::Warn => message.yellow().to_string(),
            _ => message.to_string(),
        };
        format!("{marker} {message}")
    }

    /// Render an indented detail line (file paths under a summary).
    pub fn detail(&self, glyph: &str, message: &str) -> String {
        if self.color {
            format!("  {}  {message}", glyph.bright_black())
        } else {
            format!("  {glyph}  {message}")
        }
    }

    /// Section heading.
    pub fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}
