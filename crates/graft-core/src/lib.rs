//! # graft-core
//!
//! **Graph data loader** – staged, transactional loading of vertices
//! and edges into a graph engine.
//!
//! Bulk records cannot travel to the graph engine as ordinary statement
//! parameters. Each batch is therefore written to a keyed staging table first,
//! and a generated `cypher()` statement reads it back and creates one entity
//! per row. All batches of a load share one transaction.
//!
//! ## Main Types
//!
//! - [`GraphLoader`] – the entry point for loads
//! - [`GraphData`] – vertices and edges grouped by type, in load order
//! - [`LoadOptions`] / [`LoadResult`] – what to do and what happened
//! - [`GraftError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`planner`] – splitting records into batches
//! - [`statements`] – staged payloads and generated statements
//! - [`transaction`] – transaction lifecycle, savepoints, deadlines
//! - [`progress`] – progress events and sinks
//! - [`schema`] – record validation and type metadata
//! - [`loader`] – the load orchestrator
//! - [`config`] – `~/.graft/config.yaml`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use graft_core::{GraphData, GraphLoader, LoadOptions, MemoryEngine};
//!
//! let engine = MemoryEngine::new();
//! let loader = GraphLoader::new(Arc::new(engine.pool()));
//!
//! let data = GraphData::from_json_str(r#"{"vertices": {"Person": [{"id": "p1"}]}}"#)?;
//! let result = loader.load_graph_data(&data, &LoadOptions::new("social"))?;
//! println!("created {} vertices", result.vertex_count);
//! ```

// Modules
pub mod config;
pub mod constants;
pub mod db_adapter;
pub mod errors;
pub mod graph;
pub mod loader;
pub mod planner;
pub mod progress;
pub mod schema;
pub mod statements;
pub mod transaction;
pub mod value;

// Re-exports for convenience
pub use config::{DatabaseConfig, GraftConfig, LoaderConfig, StagingConfig};
pub use errors::{GraftError, GraftResult};
pub use graph::{EdgeRecord, GraphData, PropertyRecord, TypeMap};
pub use loader::{
    AbortSignal, GraphLoader, LoadError, LoadErrorKind, LoadOptions, LoadResult,
};
pub use planner::{estimate_total_batches, plan, Batch};
pub use progress::{
    LoadPhase, LoadProgress, ProgressLog, ProgressReporter, ProgressSink, TracingProgress,
};
pub use schema::{DeclaredProperties, EdgeEndpoints, GraphSchema, SchemaValidator, Violation};
pub use statements::StatementGenerator;
pub use transaction::{Transaction, TransactionCoordinator, TxState};
pub use value::PropertyValue;

// Infrastructure types callers need to construct a loader
pub use graft_db::connection::{Connection, ConnectionPool, Fault, MemoryEngine, MemoryPool};
pub use graft_db::staging::{StagingStore, StagingTable, TableStagingStore};
#[cfg(feature = "postgres")]
pub use graft_db::connection::{PgConfig, PgPool};
