//! Load options.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ID_PROPERTY};
use crate::progress::ProgressSink;

/// Cooperative cancellation flag, checked between batches.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the statement in flight still completes.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one load.
#[derive(Clone)]
pub struct LoadOptions {
    pub target_graph: String,

    /// Records per batch; must be greater than 0.
    pub batch_size: usize,

    pub validate_before_load: bool,

    pub continue_on_error: bool,

    pub transaction_timeout: Option<Duration>,

    /// Vertex property edge endpoints are matched against.
    pub id_property: String,

    /// Delete this load's staging entries afterwards.
    pub cleanup_staging: bool,

    /// Create the staging layout inside the load transaction if missing.
    pub ensure_staging: bool,

    pub progress: Option<Arc<dyn ProgressSink>>,

    pub abort: Option<AbortSignal>,
}

impl LoadOptions {
    pub fn new(target_graph: impl Into<String>) -> Self {
        Self {
            target_graph: target_graph.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            validate_before_load: false,
            continue_on_error: false,
            transaction_timeout: None,
            id_property: DEFAULT_ID_PROPERTY.to_string(),
            cleanup_staging: true,
            ensure_staging: true,
            progress: None,
            abort: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate_before_load(mut self, validate: bool) -> Self {
        self.validate_before_load = validate;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = Some(timeout);
        self
    }

    pub fn id_property(mut self, id_property: impl Into<String>) -> Self {
        self.id_property = id_property.into();
        self
    }

    pub fn cleanup_staging(mut self, cleanup: bool) -> Self {
        self.cleanup_staging = cleanup;
        self
    }

    pub fn ensure_staging(mut self, ensure: bool) -> Self {
        self.ensure_staging = ensure;
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("target_graph", &self.target_graph)
            .field("batch_size", &self.batch_size)
            .field("validate_before_load", &self.validate_before_load)
            .field("continue_on_error", &self.continue_on_error)
            .field("transaction_timeout", &self.transaction_timeout)
            .field("id_property", &self.id_property)
            .field("cleanup_staging", &self.cleanup_staging)
            .field("ensure_staging", &self.ensure_staging)
            .field("progress", &self.progress.is_some())
            .field("abort", &self.abort)
            .finish()
    }
}
