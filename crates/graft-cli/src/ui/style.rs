//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |
//! | `[skip]` | Skipped | Dim |

use owo_colors::{AnsiColors, OwoColorize};

use super::color::ColorMode;

/// Message severity/type for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
    /// Records or batches intentionally left out
    Skip,
}

impl MessageType {
    /// Bracketed tag printed before the message.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
            Self::Skip => "[skip]",
        }
    }

    /// Tag color; `None` renders dimmed.
    fn color(&self) -> Option<AnsiColors> {
        match self {
            Self::Ok => Some(AnsiColors::Green),
            Self::Err => Some(AnsiColors::Red),
            Self::Warn => Some(AnsiColors::Yellow),
            Self::Info => Some(AnsiColors::Blue),
            Self::Hint => Some(AnsiColors::Cyan),
            Self::Skip => None,
        }
    }
}

/// Renders load summaries, errors and hints with consistent prefixes.
#[derive(Debug, Clone, Default)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    fn tag(&self, msg_type: MessageType) -> String {
        let prefix = msg_type.prefix();
        if !self.colors_enabled() {
            return prefix.to_string();
        }
        match msg_type.color() {
            Some(color) => prefix.color(color).to_string(),
            None => prefix.dimmed().to_string(),
        }
    }

    /// `[ok] Loaded 2 vertices ...`
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        format!("{} {}", self.tag(msg_type), text)
    }

    /// Indented `label: value` line under a message.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    /// Bold section title such as `ERRORS`.
    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// An `[err]` line followed by optional `Cause:` and `Hint:` lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        for (label, text) in [("Cause", cause), ("Hint", hint)] {
            if let Some(text) = text {
                output.push_str(&format!("\n      {}: {}", label, text));
            }
        }
        output
    }
}
