//! One load, start to finish.
//!
//! ```text
//! Idle -> Validating -> LoadingVertices -> LoadingEdges -> Committing
//!      -> Succeeded | Failed -> Cleanup -> Done
//! ```
//!
//! Any failure that stops the load is recorded in the result before the run
//! unwinds; the caller never sees it as an `Err`.

use std::borrow::Cow;
use std::time::Instant;

use chrono::{DateTime, Utc};
use graft_db::connection::{ConnectionPool, Rows};
use graft_db::staging::{namespace_prefix, StagingKey, StagingStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::BATCH_SAVEPOINT;
use crate::db_adapter::{execution_error, staging_error};
use crate::errors::GraftError;
use crate::graph::{EdgeRecord, GraphData, PropertyRecord};
use crate::planner::{plan, Batch};
use crate::progress::{LoadPhase, ProgressReporter};
use crate::schema::SchemaValidator;
use crate::statements::{
    edge_payload, edge_property_names, vertex_payload, vertex_property_names,
    StatementGenerator, UnresolvedEdge,
};
use crate::transaction::Transaction;

use super::options::LoadOptions;
use super::prefilter::Prefilter;
use super::result::{LoadError, LoadErrorKind, LoadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadStage {
    Idle,
    Validating,
    LoadingVertices,
    LoadingEdges,
    Committing,
    Succeeded,
    Failed,
    Cleanup,
    Done,
}

/// The load stopped; the cause is already recorded.
struct Halted;

/// Outcome of one edge batch that executed.
struct EdgeBatchOutcome {
    created: u64,
    unresolved: Vec<LoadError>,
    warnings: Vec<String>,
}

/// Read-only collaborators of a run.
struct BatchContext<'a> {
    staging: &'a dyn StagingStore,
    schema: Option<&'a dyn SchemaValidator>,
    generator: StatementGenerator,
    prefix: String,
}

fn created_count(rows: &Rows) -> u64 {
    rows.scalar_u64().unwrap_or(0)
}

fn statement_error(err: GraftError, type_name: &str, batch: usize) -> GraftError {
    GraftError::Execution {
        type_name: type_name.to_string(),
        batch,
        message: err.to_string(),
    }
}

impl BatchContext<'_> {
    fn stage(
        &self,
        tx: &mut Transaction,
        type_name: &str,
        batch: usize,
        payload: &serde_json::Value,
    ) -> Result<StagingKey, GraftError> {
        let key = StagingKey::for_batch(&self.prefix, type_name, batch)
            .map_err(|e| staging_error(e, type_name))?;
        self.staging
            .put(tx.connection()?, &key, payload)
            .map_err(|e| staging_error(e, key.as_str()))?;
        Ok(key)
    }

    fn vertex_batch(
        &self,
        tx: &mut Transaction,
        type_name: &str,
        batch: &Batch<'_, PropertyRecord>,
    ) -> Result<u64, GraftError> {
        let key = self.stage(tx, type_name, batch.index, &vertex_payload(batch.records))?;

        let properties = vertex_property_names(self.schema, type_name, batch.records);
        let statement = self
            .generator
            .vertex_statement(type_name, &properties, &self.staging.retrieval_call(&key))
            .map_err(|e| statement_error(e, type_name, batch.index))?;

        let rows = tx
            .connection()?
            .execute(&statement)
            .map_err(|e| execution_error(e, type_name, batch.index))?;
        Ok(created_count(&rows))
    }

    fn edge_batch(
        &self,
        tx: &mut Transaction,
        type_name: &str,
        batch: &Batch<'_, EdgeRecord>,
    ) -> Result<EdgeBatchOutcome, GraftError> {
        let key = self.stage(tx, type_name, batch.index, &edge_payload(batch.records))?;
        let retrieval = self.staging.retrieval_call(&key);

        let endpoints = self
            .schema
            .map(|s| s.edge_endpoints(type_name))
            .unwrap_or_default();
        let properties = edge_property_names(self.schema, type_name, batch.records);
        let statement = self
            .generator
            .edge_statement(type_name, &endpoints, &properties, &retrieval)
            .map_err(|e| statement_error(e, type_name, batch.index))?;

        let rows = tx
            .connection()?
            .execute(&statement)
            .map_err(|e| execution_error(e, type_name, batch.index))?;
        let created = created_count(&rows);

        // Resolution is decided per row. The created count includes every
        // extra pair an ambiguous id matched.
        let probe = self
            .generator
            .edge_probe_statement(&endpoints, &retrieval)
            .map_err(|e| statement_error(e, type_name, batch.index))?;
        let rows = tx
            .connection()?
            .execute(&probe)
            .map_err(|e| execution_error(e, type_name, batch.index))?;

        let mut unresolved = attribute_unresolved(type_name, batch, &rows);
        let resolved = batch.len().saturating_sub(unresolved.len()) as u64;
        let mut warnings = Vec::new();

        if created > resolved {
            warnings.push(format!(
                "{} batch {}: {} row(s) with resolvable endpoints created {} edges; \
                 some endpoint ids match more than one vertex",
                type_name, batch.index, resolved, created
            ));
        } else if created < resolved {
            unresolved.push(
                LoadError::new(
                    LoadErrorKind::Execution,
                    format!(
                        "created {} of {} edges but no unresolved endpoint was found",
                        created, resolved
                    ),
                )
                .with_type(type_name)
                .with_batch(batch.index),
            );
        }

        Ok(EdgeBatchOutcome {
            created,
            unresolved,
            warnings,
        })
    }
}

/// One execution error per unresolved record.
///
/// Each probe row claims the first matching record not already claimed. An id
/// that matches several vertices can repeat a row; repeats with nothing left
/// to claim are dropped.
fn attribute_unresolved(type_name: &str, batch: &Batch<'_, EdgeRecord>, rows: &Rows) -> Vec<LoadError> {
    let mut claimed = vec![false; batch.len()];
    rows.rows
        .iter()
        .filter_map(|row| UnresolvedEdge::from_row(row))
        .filter_map(|edge| {
            let i = batch.records.iter().enumerate().position(|(i, record)| {
                !claimed[i] && record.from == edge.from && record.to == edge.to
            })?;
            claimed[i] = true;
            Some(
                LoadError::new(LoadErrorKind::Execution, edge.describe())
                    .with_type(type_name)
                    .with_batch(batch.index)
                    .with_record(batch.offset + i),
            )
        })
        .collect()
}

/// Run `f` under a batch savepoint when failed batches are recoverable.
fn guarded<T>(
    continue_on_error: bool,
    tx: &mut Transaction,
    f: impl FnOnce(&mut Transaction) -> Result<T, GraftError>,
) -> Result<T, GraftError> {
    if !continue_on_error {
        return f(tx);
    }

    tx.savepoint(BATCH_SAVEPOINT)?;
    match f(tx) {
        Ok(value) => {
            tx.release_savepoint(BATCH_SAVEPOINT)?;
            Ok(value)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            if let Err(rb) = tx.rollback_to_savepoint(BATCH_SAVEPOINT) {
                warn!("Could not recover from batch failure ({}): {}", e, rb);
                return Err(rb);
            }
            tx.release_savepoint(BATCH_SAVEPOINT)?;
            Err(e)
        }
    }
}

// ============================================================================
// LoadRun
// ============================================================================

pub(crate) struct LoadRun<'a> {
    load_id: String,
    options: &'a LoadOptions,
    ctx: BatchContext<'a>,
    reporter: ProgressReporter,
    stage: LoadStage,
    started: Instant,
    started_at: DateTime<Utc>,
    vertex_types: Vec<String>,
    edge_types: Vec<String>,
    vertex_count: u64,
    edge_count: u64,
    errors: Vec<LoadError>,
    warnings: Vec<String>,
    skipped: usize,
    processed: usize,
    total: usize,
}

impl<'a> LoadRun<'a> {
    /// # Errors
    ///
    /// [`GraftError::InvalidConfiguration`] for a zero batch size, an invalid
    /// graph name or an unusable id property.
    pub fn new(
        options: &'a LoadOptions,
        staging: &'a dyn StagingStore,
        schema: Option<&'a dyn SchemaValidator>,
    ) -> Result<Self, GraftError> {
        if options.batch_size == 0 {
            return Err(GraftError::invalid_configuration(
                "batch size cannot be 0",
                "Use a batch size of at least 1",
            ));
        }
        let generator = StatementGenerator::new(&options.target_graph, &options.id_property)?;
        let load_id = Uuid::new_v4().to_string();
        let prefix = namespace_prefix(&load_id);

        Ok(Self {
            load_id,
            options,
            ctx: BatchContext {
                staging,
                schema,
                generator,
                prefix,
            },
            reporter: ProgressReporter::new(options.progress.clone()),
            stage: LoadStage::Idle,
            started: Instant::now(),
            started_at: Utc::now(),
            vertex_types: Vec::new(),
            edge_types: Vec::new(),
            vertex_count: 0,
            edge_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            skipped: 0,
            processed: 0,
            total: 0,
        })
    }

    fn transition(&mut self, next: LoadStage) {
        debug!(load_id = %self.load_id, from = ?self.stage, to = ?next, "Load state");
        self.stage = next;
    }

    fn record(&mut self, err: &GraftError) {
        warn!(load_id = %self.load_id, "Load error: {}", err);
        self.errors.push(LoadError::from_error(err));
    }

    fn warn(&mut self, message: String) {
        warn!(load_id = %self.load_id, "{}", message);
        self.warnings.push(message);
    }

    fn check_abort(&mut self) -> Result<(), Halted> {
        if self.options.is_aborted() {
            info!(load_id = %self.load_id, "Load cancelled");
            self.record(&GraftError::Cancelled);
            return Err(Halted);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    fn validate<'d>(&mut self, data: &'d GraphData) -> Result<Cow<'d, GraphData>, Halted> {
        self.vertex_types = data.vertices.type_names();
        self.edge_types = data.edges.type_names();
        info!(
            load_id = %self.load_id,
            graph = %self.options.target_graph,
            vertices = data.vertex_record_count(),
            edges = data.edge_record_count(),
            "Starting load"
        );

        self.transition(LoadStage::Validating);
        if self.options.validate_before_load && self.ctx.schema.is_none() {
            self.warn("validation requested but no schema is configured".to_string());
        }

        let prefilter = Prefilter {
            schema: self.ctx.schema,
            id_property: &self.options.id_property,
            validate: self.options.validate_before_load,
            continue_on_error: self.options.continue_on_error,
        };

        match prefilter.run(data) {
            Ok(out) => {
                self.skipped = out.skipped;
                debug!(load_id = %self.load_id, checked = out.checked, skipped = out.skipped, "Records prefiltered");
                let total = out.data.vertex_record_count() + out.data.edge_record_count();
                let event = self
                    .reporter
                    .event(LoadPhase::Validation, 0, total)
                    .with_warnings(out.warnings.clone());
                for warning in out.warnings {
                    self.warn(warning);
                }
                self.reporter.report(&event);
                Ok(out.data)
            }
            Err(e) => {
                let checked = data.vertex_record_count() + data.edge_record_count();
                let event = self
                    .reporter
                    .event(LoadPhase::Validation, 0, checked)
                    .with_error(e.to_string());
                self.record(&e);
                self.reporter.report(&event);
                Err(Halted)
            }
        }
    }

    fn load(&mut self, tx: &mut Transaction, data: &GraphData) -> Result<(), Halted> {
        self.total = data.vertex_record_count() + data.edge_record_count();

        if self.options.ensure_staging {
            let ensured = match tx.connection() {
                Ok(conn) => self
                    .ctx
                    .staging
                    .ensure(conn)
                    .map_err(|e| staging_error(e, &self.ctx.prefix)),
                Err(e) => Err(e),
            };
            if let Err(e) = ensured {
                self.record(&e);
                return Err(Halted);
            }
        }

        self.transition(LoadStage::LoadingVertices);
        for set in &data.vertices {
            self.load_vertex_type(tx, &set.type_name, &set.records)?;
        }

        self.transition(LoadStage::LoadingEdges);
        for set in &data.edges {
            self.load_edge_type(tx, &set.type_name, &set.records)?;
        }
        Ok(())
    }

    fn batches<'r, R>(&mut self, records: &'r [R]) -> Result<Vec<Batch<'r, R>>, Halted> {
        plan(records, self.options.batch_size).map_err(|e| {
            self.record(&e);
            Halted
        })
    }

    fn load_vertex_type(
        &mut self,
        tx: &mut Transaction,
        type_name: &str,
        records: &[PropertyRecord],
    ) -> Result<(), Halted> {
        let batches = self.batches(records)?;
        let total_batches = batches.len();
        debug!(load_id = %self.load_id, type_name, records = records.len(), total_batches, "Loading vertex type");

        for batch in &batches {
            self.check_abort()?;
            let ctx = &self.ctx;
            let result = guarded(self.options.continue_on_error, tx, |tx| {
                ctx.vertex_batch(tx, type_name, batch)
            });
            self.processed += batch.len();

            let mut event = self
                .reporter
                .event(LoadPhase::Vertices, self.processed, self.total)
                .with_type(type_name)
                .with_batch(batch.index + 1, total_batches);

            match result {
                Ok(created) => {
                    debug!(load_id = %self.load_id, type_name, batch = batch.index, created, "Vertex batch done");
                    self.vertex_count += created;
                    self.reporter.report(&event);
                }
                Err(e) => {
                    event = event.with_error(e.to_string());
                    self.record(&e);
                    self.reporter.report(&event);
                    if e.is_fatal() || !self.options.continue_on_error {
                        return Err(Halted);
                    }
                }
            }
        }
        Ok(())
    }

    fn load_edge_type(
        &mut self,
        tx: &mut Transaction,
        type_name: &str,
        records: &[EdgeRecord],
    ) -> Result<(), Halted> {
        let batches = self.batches(records)?;
        let total_batches = batches.len();
        debug!(load_id = %self.load_id, type_name, records = records.len(), total_batches, "Loading edge type");

        for batch in &batches {
            self.check_abort()?;
            let ctx = &self.ctx;
            let result = guarded(self.options.continue_on_error, tx, |tx| {
                ctx.edge_batch(tx, type_name, batch)
            });
            self.processed += batch.len();

            let mut event = self
                .reporter
                .event(LoadPhase::Edges, self.processed, self.total)
                .with_type(type_name)
                .with_batch(batch.index + 1, total_batches);

            if let Ok(outcome) = &result {
                for warning in &outcome.warnings {
                    self.warn(warning.clone());
                }
            }

            match result {
                Ok(outcome) if outcome.unresolved.is_empty() => {
                    debug!(load_id = %self.load_id, type_name, batch = batch.index, created = outcome.created, "Edge batch done");
                    self.edge_count += outcome.created;
                    self.reporter.report(&event);
                }
                Ok(outcome) => {
                    warn!(
                        load_id = %self.load_id,
                        type_name,
                        batch = batch.index,
                        unresolved = outcome.unresolved.len(),
                        "Edge batch has unresolved endpoints"
                    );
                    event = event.with_error(format!(
                        "{} edge(s) with unresolved endpoints",
                        outcome.unresolved.len()
                    ));
                    self.errors.extend(outcome.unresolved);
                    self.reporter.report(&event);
                    if !self.options.continue_on_error {
                        return Err(Halted);
                    }
                    self.edge_count += outcome.created;
                }
                Err(e) => {
                    event = event.with_error(e.to_string());
                    self.record(&e);
                    self.reporter.report(&event);
                    if e.is_fatal() || !self.options.continue_on_error {
                        return Err(Halted);
                    }
                }
            }
        }
        Ok(())
    }

    fn report_cleanup(&self) {
        let event = self
            .reporter
            .event(LoadPhase::Cleanup, self.processed, self.total);
        self.reporter.report(&event);
    }

    /// Delete this load's staging entries on a fresh connection.
    fn cleanup_on(&mut self, pool: &dyn ConnectionPool) {
        self.transition(LoadStage::Cleanup);
        let outcome = pool
            .acquire()
            .map_err(|e| e.to_string())
            .and_then(|mut conn| {
                let deleted = self
                    .ctx
                    .staging
                    .delete_prefix(conn.as_mut(), &self.ctx.prefix)
                    .map_err(|e| e.to_string());
                pool.release(conn);
                deleted
            });
        match outcome {
            Ok(deleted) => debug!(load_id = %self.load_id, deleted, "Staging entries removed"),
            Err(e) => self.warn(format!("staging cleanup failed: {}", e)),
        }
        self.report_cleanup();
    }

    /// Delete this load's staging entries inside the caller's transaction.
    fn cleanup_in(&mut self, tx: &mut Transaction) {
        self.transition(LoadStage::Cleanup);
        let outcome = match tx.connection() {
            Ok(conn) => self
                .ctx
                .staging
                .delete_prefix(conn, &self.ctx.prefix)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(deleted) => debug!(load_id = %self.load_id, deleted, "Staging entries removed"),
            Err(e) => self.warn(format!("staging cleanup failed: {}", e)),
        }
        self.report_cleanup();
    }

    fn finish(mut self, completed: bool) -> LoadResult {
        self.transition(LoadStage::Done);
        let success =
            completed && (self.errors.is_empty() || self.options.continue_on_error);
        let duration = self.started.elapsed();

        info!(
            load_id = %self.load_id,
            success,
            vertices = self.vertex_count,
            edges = self.edge_count,
            errors = self.errors.len(),
            skipped = self.skipped,
            duration_ms = duration.as_millis() as u64,
            "Load finished"
        );

        LoadResult {
            load_id: self.load_id,
            success,
            started_at: self.started_at,
            vertex_count: self.vertex_count,
            edge_count: self.edge_count,
            vertex_types: self.vertex_types,
            edge_types: self.edge_types,
            duration,
            errors: self.errors,
            warnings: self.warnings,
            skipped_records: self.skipped,
        }
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Load in a transaction of our own: commit on success, roll back on
    /// failure, then clean up staging.
    pub fn run_standalone(
        mut self,
        begin: impl FnOnce() -> Result<Transaction, GraftError>,
        pool: &dyn ConnectionPool,
        data: &GraphData,
    ) -> LoadResult {
        let Ok(filtered) = self.validate(data) else {
            self.transition(LoadStage::Failed);
            return self.finish(false);
        };

        let mut tx = match begin() {
            Ok(tx) => tx,
            Err(e) => {
                self.record(&e);
                self.transition(LoadStage::Failed);
                return self.finish(false);
            }
        };
        debug!(load_id = %self.load_id, tx_id = %tx.id(), "Load transaction open");

        let committed = match self.load(&mut tx, &filtered) {
            Ok(()) => {
                self.transition(LoadStage::Committing);
                match tx.commit() {
                    Ok(()) => true,
                    Err(e) => {
                        self.record(&e);
                        false
                    }
                }
            }
            Err(Halted) => {
                if tx.is_active() {
                    if let Err(e) = tx.rollback() {
                        self.warn(format!("rollback failed: {}", e));
                    }
                }
                false
            }
        };
        drop(tx);

        if committed {
            self.transition(LoadStage::Succeeded);
            if self.options.cleanup_staging {
                self.cleanup_on(pool);
            }
        } else {
            self.transition(LoadStage::Failed);
        }
        self.finish(committed)
    }

    /// Load inside the caller's transaction, which is neither committed nor
    /// rolled back here.
    pub fn run_in(mut self, tx: &mut Transaction, data: &GraphData) -> LoadResult {
        let Ok(filtered) = self.validate(data) else {
            self.transition(LoadStage::Failed);
            return self.finish(false);
        };

        match self.load(tx, &filtered) {
            Ok(()) => {
                self.transition(LoadStage::Succeeded);
                if self.options.cleanup_staging {
                    self.cleanup_in(tx);
                }
                self.finish(true)
            }
            Err(Halted) => {
                self.transition(LoadStage::Failed);
                if tx.is_active() {
                    self.warn(
                        "load stopped inside the caller's transaction; it should be rolled back"
                            .to_string(),
                    );
                }
                self.finish(false)
            }
        }
    }
}
