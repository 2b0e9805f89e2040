//! Common constants used throughout graft-core.

// ============================================================================
// Loader Defaults
// ============================================================================

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default property used to resolve edge endpoints to vertices.
pub const DEFAULT_ID_PROPERTY: &str = "id";

/// Batch sizes above this trigger a configuration warning.
///
/// Each batch is staged as a single JSON document.
pub const LARGE_BATCH_SIZE: usize = 50_000;

// ============================================================================
// Staged Payload Keys
// ============================================================================

/// Key of the start endpoint in a staged edge row.
pub const EDGE_FROM_KEY: &str = "from";

/// Key of the end endpoint in a staged edge row.
pub const EDGE_TO_KEY: &str = "to";

/// Key of the property map in a staged edge row.
pub const EDGE_PROPS_KEY: &str = "props";

/// Result column of generated create statements.
pub const CREATED_COLUMN: &str = "created";

// ============================================================================
// Configuration
// ============================================================================

/// The name of the global graft configuration directory (`~/.graft`).
pub const GRAFT_HOME_DIR: &str = ".graft";

/// Configuration file name within [`GRAFT_HOME_DIR`].
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Savepoint name used around each batch in continue-on-error mode.
pub const BATCH_SAVEPOINT: &str = "graft_batch";
