//! Batch loader.
//!
//! [`GraphLoader`] drives a whole load: optional validation, then for each
//! vertex type and then each edge type, batches are staged and executed inside
//! one transaction, with progress reported after every batch.
//!
//! ```ignore
//! let engine = MemoryEngine::new();
//! let loader = GraphLoader::new(Arc::new(engine.pool()));
//! let result = loader.load_graph_data(&data, &LoadOptions::new("social"))?;
//! assert!(result.success);
//! ```
//!
//! Only programmer mistakes (zero batch size, invalid graph name, misuse of a
//! caller-supplied transaction) come back as `Err`; everything that goes wrong
//! during the load itself is reported in the [`LoadResult`].

mod options;
mod prefilter;
mod result;
mod run;

use std::fmt;
use std::sync::Arc;

use graft_db::connection::ConnectionPool;
use graft_db::staging::{StagingStore, TableStagingStore};

use crate::errors::GraftError;
use crate::graph::{EdgeRecord, GraphData, PropertyRecord};
use crate::schema::SchemaValidator;
use crate::transaction::{Transaction, TransactionCoordinator};

pub use options::{AbortSignal, LoadOptions};
pub use result::{LoadError, LoadErrorKind, LoadResult};

use run::LoadRun;

/// Loads graph data through a staging store into a graph.
#[derive(Clone)]
pub struct GraphLoader {
    pool: Arc<dyn ConnectionPool>,
    staging: Arc<dyn StagingStore>,
    schema: Option<Arc<dyn SchemaValidator>>,
}

impl GraphLoader {
    /// A loader using the default staging table layout and no schema.
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            staging: Arc::new(TableStagingStore::default()),
            schema: None,
        }
    }

    pub fn with_staging(mut self, staging: Arc<dyn StagingStore>) -> Self {
        self.staging = staging;
        self
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub fn schema(&self) -> Option<&Arc<dyn SchemaValidator>> {
        self.schema.as_ref()
    }

    /// Coordinator applying the timeout of `options`.
    pub fn coordinator(&self, options: &LoadOptions) -> TransactionCoordinator {
        TransactionCoordinator::new(Arc::clone(&self.pool)).with_timeout(options.transaction_timeout)
    }

    fn prepare<'a>(&'a self, options: &'a LoadOptions) -> Result<LoadRun<'a>, GraftError> {
        LoadRun::new(options, self.staging.as_ref(), self.schema.as_deref())
    }

    /// Load `data` in a transaction of its own.
    ///
    /// # Errors
    ///
    /// [`GraftError::InvalidConfiguration`] for a zero batch size, an invalid
    /// graph name or id property. Failures during the load are reported in
    /// the returned [`LoadResult`].
    pub fn load_graph_data(
        &self,
        data: &GraphData,
        options: &LoadOptions,
    ) -> Result<LoadResult, GraftError> {
        let run = self.prepare(options)?;
        let coordinator = self.coordinator(options);
        Ok(run.run_standalone(|| coordinator.begin(), self.pool.as_ref(), data))
    }

    /// Load `data` inside a transaction the caller owns.
    ///
    /// The transaction is neither committed nor rolled back here; staging
    /// cleanup happens inside it. `options.transaction_timeout` is ignored in
    /// favor of the transaction's own deadline.
    ///
    /// # Errors
    ///
    /// [`GraftError::TransactionMisuse`] if `tx` is not active, and the
    /// configuration errors of [`GraphLoader::load_graph_data`].
    pub fn load_graph_data_in(
        &self,
        tx: &mut Transaction,
        data: &GraphData,
        options: &LoadOptions,
    ) -> Result<LoadResult, GraftError> {
        if !tx.is_active() {
            return Err(GraftError::misuse(format!(
                "load into a {} transaction",
                tx.state()
            )));
        }
        let run = self.prepare(options)?;
        Ok(run.run_in(tx, data))
    }

    /// Load the vertices of one type.
    pub fn load_vertices(
        &self,
        type_name: &str,
        records: &[PropertyRecord],
        options: &LoadOptions,
    ) -> Result<LoadResult, GraftError> {
        let data = GraphData::new().with_vertices(type_name, records.iter().cloned());
        self.load_graph_data(&data, options)
    }

    /// Load the edges of one type; their endpoints must already exist.
    pub fn load_edges(
        &self,
        type_name: &str,
        records: &[EdgeRecord],
        options: &LoadOptions,
    ) -> Result<LoadResult, GraftError> {
        let data = GraphData::new().with_edges(type_name, records.iter().cloned());
        self.load_graph_data(&data, options)
    }

    /// Run `f` in a new transaction, committing on `Ok` and rolling back on
    /// `Err`.
    ///
    /// Combine with [`GraphLoader::load_graph_data_in`] to make several loads
    /// atomic.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, GraftError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, GraftError>,
    {
        TransactionCoordinator::new(Arc::clone(&self.pool)).run_in_transaction(f)
    }
}

impl fmt::Debug for GraphLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphLoader")
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}
