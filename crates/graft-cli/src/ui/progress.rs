//! Progress indicators for long-running CLI operations.
//!
//! [`BarProgress`] wraps an `indicatif` bar and implements
//! [`ProgressSink`], so the loader drives it directly. It is hidden when
//! stdout is not a TTY, with `--quiet`, and with `--json`.

use std::time::Duration;

use graft_core::{LoadPhase, LoadProgress, ProgressSink};
use indicatif::{ProgressBar, ProgressStyle};

use super::color::{terminal_width, ColorMode};
use super::format::truncate_str;

/// Progress feedback mode based on output context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Interactive TTY: show an animated progress bar
    Interactive,
    /// Non-TTY or quiet: suppress progress, show only final results
    Quiet,
    /// Machine-readable: no progress at all (for --json)
    Silent,
}

impl ProgressMode {
    /// Detect the appropriate mode from environment and flags.
    pub fn detect(quiet: bool, json: bool, color_mode: ColorMode) -> Self {
        if json {
            Self::Silent
        } else if quiet || !atty::is(atty::Stream::Stdout) {
            Self::Quiet
        } else if color_mode == ColorMode::Never && !atty::is(atty::Stream::Stderr) {
            Self::Quiet
        } else {
            Self::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Progress bar characters.
const BAR_CHARS: &str = "█░";

/// Columns reserved for the bar, counters and elapsed time.
const BAR_CHROME_WIDTH: usize = 48;

/// Progress bar fed by loader progress events.
#[derive(Clone)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(mode: ProgressMode) -> Self {
        let bar = if mode.is_interactive() {
            let pb = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template("[{bar:20.cyan/dim}] {percent:>3}% ({pos}/{len}) {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars(BAR_CHARS);
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Finish and clear the progress line.
    pub fn finish_clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Current position, for tests.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Line shown next to the bar for an event.
    pub fn describe(progress: &LoadProgress) -> String {
        let mut message = progress.phase.to_string();
        if let Some(type_name) = &progress.current_type {
            message.push(' ');
            message.push_str(type_name);
        }
        if progress.total_batches > 0 && progress.phase != LoadPhase::Cleanup {
            message.push_str(&format!(
                " batch {}/{}",
                progress.batch_number, progress.total_batches
            ));
        }
        if let Some(error) = &progress.error {
            message.push_str(&format!(" ({})", error));
        }
        message
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, progress: &LoadProgress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.processed as u64);
        let width = terminal_width().saturating_sub(BAR_CHROME_WIDTH).max(10);
        self.bar
            .set_message(truncate_str(&Self::describe(progress), width));
    }
}
