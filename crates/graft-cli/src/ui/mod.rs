//! # CLI UI Module
//!
//! Styling and formatting layer for graft CLI output.
//!
//! Output is meant to be scannable: a load either ends with `[ok]` or with
//! `[err]` and a table of what went wrong. Colors respect `NO_COLOR` and every
//! command accepts `--json` for scripting.
//!
//! ## Module Structure
//!
//! - `color`: Color mode detection and terminal capability checks
//! - `style`: Message types, prefixes, and styling functions
//! - `format`: Utility formatters (durations, counts, truncation)
//! - `table`: Table rendering with comfy-table
//! - `progress`: Progress bar fed by loader progress events

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

// Re-export main types for convenient access
pub use color::ColorMode;
pub use progress::{BarProgress, ProgressMode};
pub use style::{MessageType, Style};
