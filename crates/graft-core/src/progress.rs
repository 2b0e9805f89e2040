//! Progress reporting.
//!
//! The loader emits one [`LoadProgress`] per meaningful step (end of
//! validation, each batch, cleanup) to an optional [`ProgressSink`]. Sinks run
//! synchronously between batches; a panicking sink is logged and ignored.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Phase of a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Validation,
    Vertices,
    Edges,
    Cleanup,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Vertices => "vertices",
            Self::Edges => "edges",
            Self::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

/// A progress event.
///
/// `processed` and `total` count records across the load; `batch_number` is
/// 1-based within `current_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadProgress {
    pub phase: LoadPhase,
    pub current_type: Option<String>,
    pub processed: usize,
    pub total: usize,
    pub batch_number: usize,
    pub total_batches: usize,
    pub percentage: f64,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `processed / total * 100`, clamped to `[0, 100]`; 100 when `total` is 0.
pub fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// `elapsed * (total - processed) / processed`; `None` before anything is processed.
pub fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed) as f64;
    Some(elapsed.mul_f64(remaining / processed as f64))
}

impl LoadProgress {
    pub fn new(phase: LoadPhase, processed: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            phase,
            current_type: None,
            processed,
            total,
            batch_number: 0,
            total_batches: 0,
            percentage: percentage(processed, total),
            elapsed_ms: elapsed.as_millis() as u64,
            estimated_remaining_ms: estimate_remaining(elapsed, processed, total)
                .map(|d| d.as_millis() as u64),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.current_type = Some(type_name.into());
        self
    }

    pub fn with_batch(mut self, batch_number: usize, total_batches: usize) -> Self {
        self.batch_number = batch_number;
        self.total_batches = total_batches;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        self.estimated_remaining_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &LoadProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&LoadProgress) + Send + Sync,
{
    fn report(&self, progress: &LoadProgress) {
        self(progress)
    }
}

/// Collects every event; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    events: Arc<Mutex<Vec<LoadProgress>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<LoadProgress> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressSink for ProgressLog {
    fn report(&self, progress: &LoadProgress) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(progress.clone());
    }
}

/// Writes events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, progress: &LoadProgress) {
        let type_name = progress.current_type.as_deref().unwrap_or("-");
        match progress.phase {
            LoadPhase::Vertices | LoadPhase::Edges => debug!(
                phase = %progress.phase,
                type_name,
                batch = progress.batch_number,
                total_batches = progress.total_batches,
                processed = progress.processed,
                total = progress.total,
                "Load progress {:.1}%",
                progress.percentage
            ),
            _ => info!(
                phase = %progress.phase,
                processed = progress.processed,
                total = progress.total,
                "Load progress {:.1}%",
                progress.percentage
            ),
        }
    }
}

// ============================================================================
// ProgressReporter
// ============================================================================

/// Forwards events to an optional sink without letting it fail the load.
pub struct ProgressReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            started: Instant::now(),
        }
    }

    /// Time since the reporter was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Build an event stamped with the current elapsed time.
    pub fn event(&self, phase: LoadPhase, processed: usize, total: usize) -> LoadProgress {
        LoadProgress::new(phase, processed, total, self.elapsed())
    }

    pub fn report(&self, progress: &LoadProgress) {
        let Some(sink) = &self.sink else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.report(progress)));
        if outcome.is_err() {
            warn!(phase = %progress.phase, "Progress sink panicked; event dropped");
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(percentage(0, 0), 100.0);
        assert_eq!(percentage(0, 10), 0.0);
        assert_eq!(percentage(5, 10), 50.0);
        assert_eq!(percentage(15, 10), 100.0);
    }

    #[test]
    fn test_estimate_remaining() {
        assert_eq!(estimate_remaining(Duration::from_secs(10), 0, 100), None);
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 25, 100),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 100, 100),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_event_builders() {
        let progress = LoadProgress::new(LoadPhase::Vertices, 2, 8, Duration::from_millis(400))
            .with_type("Person")
            .with_batch(1, 4);
        assert_eq!(progress.percentage, 25.0);
        assert_eq!(progress.estimated_time_remaining(), Some(Duration::from_millis(1200)));
        assert_eq!(progress.current_type.as_deref(), Some("Person"));

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["phase"], "vertices");
        assert_eq!(json["batchNumber"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_closure_and_log_sinks() {
        let log = ProgressLog::new();
        let reporter = ProgressReporter::new(Some(Arc::new(log.clone())));
        reporter.report(&reporter.event(LoadPhase::Validation, 3, 3));
        reporter.report(&reporter.event(LoadPhase::Cleanup, 3, 3));
        let phases: Vec<LoadPhase> = log.events().iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![LoadPhase::Validation, LoadPhase::Cleanup]);

        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let reporter = ProgressReporter::new(Some(Arc::new(move |_: &LoadProgress| {
            *counter.lock().unwrap() += 1;
        })));
        reporter.report(&reporter.event(LoadPhase::Edges, 1, 2));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let reporter = ProgressReporter::new(Some(Arc::new(|_: &LoadProgress| {
            panic!("sink exploded");
        })));
        reporter.report(&reporter.event(LoadPhase::Vertices, 1, 2));
        reporter.report(&reporter.event(LoadPhase::Vertices, 2, 2));
    }

    #[test]
    fn test_no_sink_is_noop() {
        let reporter = ProgressReporter::new(None);
        reporter.report(&reporter.event(LoadPhase::Cleanup, 0, 0));
    }
}
