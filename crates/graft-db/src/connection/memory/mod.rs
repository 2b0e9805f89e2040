//! In-process engine for tests, dry runs and the CLI `--memory` mode.
//!
//! [`MemoryEngine`] executes exactly the statements graft emits (staging DDL
//! and reads/writes, transaction control, and the generated `cypher()` calls)
//! with PostgreSQL transaction semantics:
//!
//! - outside a transaction every statement autocommits
//! - `BEGIN` takes a private working copy; `COMMIT` installs it
//! - a failed statement aborts the transaction; everything but `ROLLBACK` or
//!   `ROLLBACK TO SAVEPOINT` fails until then
//! - a broken connection discards its open transaction
//!
//! Concurrent transactions are isolated by snapshot; the last commit wins.
//!
//! Failures are injected with [`Fault`].

mod dialect;
mod faults;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{DbError, DbResult};

use super::{Connection, ConnectionPool, Rows, Statement};
use dialect::{Command, CypherAction, CypherQuery, EndpointMatch, PropertyBinding};

pub use faults::{Fault, FaultKind};

const ABORTED_MESSAGE: &str =
    "current transaction is aborted, commands ignored until end of transaction block";

// ============================================================================
// Stored Entities
// ============================================================================

/// A vertex held by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVertex {
    /// Engine-assigned identity.
    pub id: u64,
    pub label: String,
    pub properties: Map<String, Value>,
}

/// An edge held by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEdge {
    /// Engine-assigned identity.
    pub id: u64,
    pub label: String,
    /// Identity of the start vertex.
    pub from: u64,
    /// Identity of the end vertex.
    pub to: u64,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct StoredGraph {
    vertices: Vec<StoredVertex>,
    edges: Vec<StoredEdge>,
}

/// Everything a transaction can change.
#[derive(Debug, Clone, Default)]
struct Database {
    schemas: BTreeSet<String>,
    /// qualified table -> key -> value
    tables: BTreeMap<String, BTreeMap<String, Value>>,
    /// qualified function -> qualified table
    functions: BTreeMap<String, String>,
    graphs: BTreeMap<String, StoredGraph>,
}

#[derive(Debug, Default)]
struct EngineState {
    committed: Database,
    faults: Vec<Fault>,
    statements: Vec<String>,
    /// Identities are never reused, even after rollback.
    next_id: u64,
    acquired: usize,
    released: usize,
    open: usize,
}

// ============================================================================
// MemoryEngine
// ============================================================================

/// Shared handle to an in-process engine.
///
/// Cloning the handle shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Mutex<EngineState>>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool handing out connections to this engine.
    pub fn pool(&self) -> MemoryPool {
        MemoryPool {
            engine: self.clone(),
            max_connections: None,
        }
    }

    /// Register a fault. Faults are checked in registration order.
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push(fault);
    }

    /// Remove all registered faults.
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Committed vertices of `label` in `graph`, in creation order.
    pub fn vertices(&self, graph: &str, label: &str) -> Vec<StoredVertex> {
        self.state()
            .committed
            .graphs
            .get(graph)
            .map(|g| {
                g.vertices
                    .iter()
                    .filter(|v| v.label == label)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of committed vertices in `graph`.
    pub fn vertex_count(&self, graph: &str) -> usize {
        self.state()
            .committed
            .graphs
            .get(graph)
            .map_or(0, |g| g.vertices.len())
    }

    /// Committed edges of `label` in `graph`, in creation order.
    pub fn edges(&self, graph: &str, label: &str) -> Vec<StoredEdge> {
        self.state()
            .committed
            .graphs
            .get(graph)
            .map(|g| {
                g.edges
                    .iter()
                    .filter(|e| e.label == label)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of committed edges in `graph`.
    pub fn edge_count(&self, graph: &str) -> usize {
        self.state()
            .committed
            .graphs
            .get(graph)
            .map_or(0, |g| g.edges.len())
    }

    /// Committed staging keys across all staging tables, sorted.
    pub fn staged_keys(&self) -> Vec<String> {
        let state = self.state();
        let mut keys: Vec<String> = state
            .committed
            .tables
            .values()
            .flat_map(|entries| entries.keys().cloned())
            .collect();
        keys.sort();
        keys
    }

    /// Committed staging value under `key`, if any.
    pub fn staged_value(&self, key: &str) -> Option<Value> {
        self.state()
            .committed
            .tables
            .values()
            .find_map(|entries| entries.get(key).cloned())
    }

    /// Every statement text received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    /// Number of statements received whose text contains `needle`.
    pub fn statements_containing(&self, needle: &str) -> usize {
        self.state()
            .statements
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    /// Total connections handed out.
    pub fn connections_acquired(&self) -> usize {
        self.state().acquired
    }

    /// Total connections returned through [`ConnectionPool::release`].
    pub fn connections_released(&self) -> usize {
        self.state().released
    }

    /// Connections currently alive.
    pub fn open_connections(&self) -> usize {
        self.state().open
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// MemoryPool
// ============================================================================

/// Pool over a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryPool {
    engine: MemoryEngine,
    max_connections: Option<usize>,
}

impl MemoryPool {
    /// Refuse to hand out more than `max` live connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// The engine behind this pool.
    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Acquire a concretely typed connection.
    pub fn connect(&self) -> DbResult<MemoryConnection> {
        let mut state = self.engine.state();
        if let Some(max) = self.max_connections {
            if state.open >= max {
                return Err(DbError::pool(format!(
                    "all {max} connections are in use"
                )));
            }
        }
        state.acquired += 1;
        state.open += 1;
        drop(state);

        Ok(MemoryConnection {
            engine: self.engine.clone(),
            tx: None,
            broken: false,
        })
    }
}

impl ConnectionPool for MemoryPool {
    fn acquire(&self) -> DbResult<Box<dyn Connection>> {
        Ok(Box::new(self.connect()?))
    }

    fn release(&self, connection: Box<dyn Connection>) {
        self.engine.state().released += 1;
        drop(connection);
    }
}

// ============================================================================
// MemoryConnection
// ============================================================================

#[derive(Debug)]
struct TxBuffer {
    working: Database,
    savepoints: Vec<(String, Database)>,
    aborted: bool,
}

/// A connection to a [`MemoryEngine`].
///
/// Dropping the connection discards any open transaction.
#[derive(Debug)]
pub struct MemoryConnection {
    engine: MemoryEngine,
    tx: Option<TxBuffer>,
    broken: bool,
}

impl MemoryConnection {
    /// Whether a transaction block is open.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn run(&mut self, state: &mut EngineState, statement: &Statement) -> DbResult<Rows> {
        let command = match dialect::parse(&statement.text) {
            Ok(command) => command,
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };

        if let Some(fault) = fire_fault(state, &statement.text) {
            return Err(self.apply_fault(fault));
        }

        match command {
            Command::Begin => {
                if self.tx.is_none() {
                    self.tx = Some(TxBuffer {
                        working: state.committed.clone(),
                        savepoints: Vec::new(),
                        aborted: false,
                    });
                }
                Ok(Rows::empty())
            }
            Command::Commit => match self.tx.take() {
                None => Ok(Rows::empty()),
                Some(tx) if tx.aborted => Err(DbError::query(
                    "transaction was aborted and has been rolled back",
                )),
                Some(tx) => {
                    state.committed = tx.working;
                    Ok(Rows::empty())
                }
            },
            Command::Rollback => {
                self.tx = None;
                Ok(Rows::empty())
            }
            Command::Savepoint(name) => {
                let tx = self.open_tx("SAVEPOINT")?;
                if tx.aborted {
                    return Err(DbError::query(ABORTED_MESSAGE));
                }
                let snapshot = tx.working.clone();
                tx.savepoints.push((name, snapshot));
                Ok(Rows::empty())
            }
            Command::ReleaseSavepoint(name) => {
                let tx = self.open_tx("RELEASE SAVEPOINT")?;
                if tx.aborted {
                    return Err(DbError::query(ABORTED_MESSAGE));
                }
                match tx.savepoints.iter().rposition(|(n, _)| *n == name) {
                    Some(pos) => {
                        tx.savepoints.truncate(pos);
                        Ok(Rows::empty())
                    }
                    None => {
                        tx.aborted = true;
                        Err(DbError::query(format!("savepoint \"{name}\" does not exist")))
                    }
                }
            }
            Command::RollbackToSavepoint(name) => {
                let tx = self.open_tx("ROLLBACK TO SAVEPOINT")?;
                match tx.savepoints.iter().rposition(|(n, _)| *n == name) {
                    Some(pos) => {
                        tx.working = tx.savepoints[pos].1.clone();
                        tx.savepoints.truncate(pos + 1);
                        tx.aborted = false;
                        Ok(Rows::empty())
                    }
                    None => {
                        tx.aborted = true;
                        Err(DbError::query(format!("savepoint \"{name}\" does not exist")))
                    }
                }
            }
            command => self.run_data(state, &command, &statement.params),
        }
    }

    /// Run a data statement inside the open transaction, or autocommit it.
    fn run_data(
        &mut self,
        state: &mut EngineState,
        command: &Command,
        params: &[Value],
    ) -> DbResult<Rows> {
        match self.tx.as_mut() {
            Some(tx) if tx.aborted => Err(DbError::query(ABORTED_MESSAGE)),
            Some(tx) => {
                let result = apply(&mut tx.working, &mut state.next_id, command, params);
                if result.is_err() {
                    tx.aborted = true;
                }
                result
            }
            None => {
                let mut working = state.committed.clone();
                let rows = apply(&mut working, &mut state.next_id, command, params)?;
                state.committed = working;
                Ok(rows)
            }
        }
    }

    fn open_tx(&mut self, what: &str) -> DbResult<&mut TxBuffer> {
        self.tx.as_mut().ok_or_else(|| {
            DbError::query(format!("{what} can only be used in transaction blocks"))
        })
    }

    fn abort(&mut self) {
        if let Some(tx) = self.tx.as_mut() {
            tx.aborted = true;
        }
    }

    fn apply_fault(&mut self, (kind, message): (FaultKind, String)) -> DbError {
        match kind {
            FaultKind::Statement => {
                self.abort();
                DbError::query(message)
            }
            FaultKind::Commit => {
                self.tx = None;
                DbError::query(message)
            }
            FaultKind::Connection => {
                self.tx = None;
                self.broken = true;
                DbError::connection(message)
            }
        }
    }
}

fn fire_fault(state: &mut EngineState, text: &str) -> Option<(FaultKind, String)> {
    state.faults.iter_mut().find_map(|fault| {
        fault
            .trigger(text)
            .then(|| (fault.kind(), fault.message().to_string()))
    })
}

impl Connection for MemoryConnection {
    fn execute(&mut self, statement: &Statement) -> DbResult<Rows> {
        if self.broken {
            return Err(DbError::connection("connection is closed"));
        }

        let engine = self.engine.clone();
        let mut state = engine.state();
        state.statements.push(statement.text.clone());
        trace!(statement = %first_line(&statement.text), "memory execute");

        self.run(&mut state, statement)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.engine.state();
        state.open = state.open.saturating_sub(1);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

// ============================================================================
// Execution
// ============================================================================

fn apply(
    db: &mut Database,
    next_id: &mut u64,
    command: &Command,
    params: &[Value],
) -> DbResult<Rows> {
    match command {
        Command::SessionSetup => Ok(Rows::empty()),
        Command::CreateSchema(schema) => {
            db.schemas.insert(schema.clone());
            Ok(Rows::empty())
        }
        Command::CreateTable(table) => {
            require_schema(db, table)?;
            db.tables.entry(table.clone()).or_default();
            Ok(Rows::empty())
        }
        Command::CreateFunction { function, table } => {
            require_schema(db, function)?;
            db.functions.insert(function.clone(), table.clone());
            Ok(Rows::empty())
        }
        Command::StagePut { table } => {
            let key = key_param(params)?;
            let value = params
                .get(1)
                .cloned()
                .ok_or_else(|| DbError::query("missing value parameter $2"))?;
            table_mut(db, table)?.insert(key, value);
            Ok(Rows::empty())
        }
        Command::StageGet { table } => {
            let key = key_param(params)?;
            let entries = table_mut(db, table)?;
            let rows = entries.get(&key).map(|v| vec![v.clone()]).into_iter().collect();
            Ok(Rows::new(vec!["value".to_string()], rows))
        }
        Command::StageDelete { table } => {
            let key = key_param(params)?;
            let entries = table_mut(db, table)?;
            let rows = entries
                .remove(&key)
                .map(|_| vec![Value::String(key)])
                .into_iter()
                .collect();
            Ok(Rows::new(vec!["key".to_string()], rows))
        }
        Command::StageDeletePrefix { table } => {
            let prefix = key_param(params)?;
            let entries = table_mut(db, table)?;
            let doomed: Vec<String> = entries
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            let rows = doomed
                .into_iter()
                .map(|key| {
                    entries.remove(&key);
                    vec![Value::String(key)]
                })
                .collect();
            Ok(Rows::new(vec!["key".to_string()], rows))
        }
        Command::Cypher(query) => run_cypher(db, next_id, query),
        Command::Begin
        | Command::Commit
        | Command::Rollback
        | Command::Savepoint(_)
        | Command::ReleaseSavepoint(_)
        | Command::RollbackToSavepoint(_) => {
            Err(DbError::internal("transaction control reached data execution"))
        }
    }
}

fn require_schema(db: &Database, qualified: &str) -> DbResult<()> {
    let schema = qualified.split('.').next().unwrap_or_default();
    if db.schemas.contains(schema) {
        Ok(())
    } else {
        Err(DbError::query(format!("schema \"{schema}\" does not exist")))
    }
}

fn table_mut<'a>(db: &'a mut Database, table: &str) -> DbResult<&'a mut BTreeMap<String, Value>> {
    db.tables
        .get_mut(table)
        .ok_or_else(|| DbError::query(format!("relation \"{table}\" does not exist")))
}

fn key_param(params: &[Value]) -> DbResult<String> {
    match params.first() {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(other) => Err(DbError::query(format!("key parameter must be text, got {other}"))),
        None => Err(DbError::query("missing key parameter $1")),
    }
}

fn run_cypher(db: &mut Database, next_id: &mut u64, query: &CypherQuery) -> DbResult<Rows> {
    let table = db
        .functions
        .get(&query.function)
        .cloned()
        .ok_or_else(|| {
            DbError::query(format!("function {}(agtype) does not exist", query.function))
        })?;
    let staged = db
        .tables
        .get(&table)
        .and_then(|entries| entries.get(&query.key))
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let Value::Array(rows) = staged else {
        return Err(DbError::query("UNWIND: staged value is not a list"));
    };

    let graph = db.graphs.entry(query.graph.clone()).or_default();

    match &query.action {
        CypherAction::CreateVertices { label, properties } => {
            let mut created = 0u64;
            for row in &rows {
                let properties = bind_properties(row, properties)?;
                graph.vertices.push(StoredVertex {
                    id: take_id(next_id),
                    label: label.clone(),
                    properties,
                });
                created += 1;
            }
            Ok(Rows::scalar("created", Value::from(created)))
        }
        CypherAction::CreateEdges {
            from,
            to,
            label,
            properties,
        } => {
            let mut created = 0u64;
            for row in &rows {
                let starts = matching_vertices(graph, from, row.get("from"));
                let ends = matching_vertices(graph, to, row.get("to"));
                if starts.is_empty() || ends.is_empty() {
                    continue;
                }
                let properties = bind_properties(row, properties)?;
                for &a in &starts {
                    for &b in &ends {
                        graph.edges.push(StoredEdge {
                            id: take_id(next_id),
                            label: label.clone(),
                            from: a,
                            to: b,
                            properties: properties.clone(),
                        });
                        created += 1;
                    }
                }
            }
            Ok(Rows::scalar("created", Value::from(created)))
        }
        CypherAction::ProbeEndpoints { from, to } => {
            let mut unresolved = Vec::new();
            for row in &rows {
                let from_id = row.get("from").cloned().unwrap_or(Value::Null);
                let to_id = row.get("to").cloned().unwrap_or(Value::Null);
                let from_missing = matching_vertices(graph, from, Some(&from_id)).is_empty();
                let to_missing = matching_vertices(graph, to, Some(&to_id)).is_empty();
                if from_missing || to_missing {
                    unresolved.push(vec![
                        from_id,
                        to_id,
                        Value::Bool(from_missing),
                        Value::Bool(to_missing),
                    ]);
                }
            }
            Ok(Rows::new(
                ["from_id", "to_id", "from_missing", "to_missing"]
                    .map(String::from)
                    .to_vec(),
                unresolved,
            ))
        }
    }
}

fn take_id(next_id: &mut u64) -> u64 {
    *next_id += 1;
    *next_id
}

fn matching_vertices(graph: &StoredGraph, endpoint: &EndpointMatch, id: Option<&Value>) -> Vec<u64> {
    let Some(id) = id.filter(|v| !v.is_null()) else {
        return Vec::new();
    };
    graph
        .vertices
        .iter()
        .filter(|v| endpoint.label.as_ref().is_none_or(|l| *l == v.label))
        .filter(|v| v.properties.get(&endpoint.id_property) == Some(id))
        .map(|v| v.id)
        .collect()
}

/// Evaluate `{name: row.path}` against one staged row.
///
/// Null results are not stored, matching how the engine treats null properties.
fn bind_properties(row: &Value, bindings: &[PropertyBinding]) -> DbResult<Map<String, Value>> {
    if !row.is_object() {
        return Err(DbError::query(format!(
            "UNWIND row must be a map, got {row}"
        )));
    }
    let mut properties = Map::new();
    for binding in bindings {
        let value = binding
            .path
            .iter()
            .try_fold(row, |current, segment| current.get(segment));
        if let Some(value) = value.filter(|v| !v.is_null()) {
            properties.insert(binding.target.clone(), value.clone());
        }
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{StagingKey, StagingStore, StagingTable, TableStagingStore};
    use serde_json::json;

    fn vertex_statement(key: &str, label: &str) -> Statement {
        Statement::new(format!(
            "SELECT * FROM cypher('g', $$\n\
             UNWIND graft_staging.get_staged_data('{key}') AS row\n\
             CREATE (v:{label} {{id: row.id, name: row.name}})\n\
             RETURN count(v)\n\
             $$) AS (created agtype)"
        ))
    }

    fn edge_statement(key: &str) -> Statement {
        Statement::new(format!(
            "SELECT * FROM cypher('g', $$\n\
             UNWIND graft_staging.get_staged_data('{key}') AS row\n\
             MATCH (a:Person {{id: row.from}}), (b:Person {{id: row.to}})\n\
             CREATE (a)-[e:KNOWS {{since: row.props.since}}]->(b)\n\
             RETURN count(e)\n\
             $$) AS (created agtype)"
        ))
    }

    fn ready(engine: &MemoryEngine) -> Box<dyn Connection> {
        let mut conn = engine.pool().acquire().unwrap();
        TableStagingStore::default().ensure(conn.as_mut()).unwrap();
        conn
    }

    fn stage(conn: &mut dyn Connection, key: &str, value: Value) {
        let key = StagingKey::new(key).unwrap();
        conn.execute(&StagingTable::default().upsert(&key, &value)).unwrap();
    }

    #[test]
    fn test_create_vertices_and_edges() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        stage(
            conn.as_mut(),
            "v0",
            json!([{"id": "p1", "name": "Alice"}, {"id": "p2", "name": null}]),
        );
        stage(
            conn.as_mut(),
            "e0",
            json!([{"from": "p1", "to": "p2", "props": {"since": 2020}}]),
        );

        let rows = conn.execute(&vertex_statement("v0", "Person")).unwrap();
        assert_eq!(rows.scalar_u64(), Some(2));
        let rows = conn.execute(&edge_statement("e0")).unwrap();
        assert_eq!(rows.scalar_u64(), Some(1));

        let people = engine.vertices("g", "Person");
        assert_eq!(people.len(), 2);
        assert!(!people[1].properties.contains_key("name"));
        let edges = engine.edges("g", "KNOWS");
        assert_eq!(edges[0].from, people[0].id);
        assert_eq!(edges[0].properties["since"], json!(2020));
    }

    #[test]
    fn test_absent_staging_key_creates_nothing() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        let rows = conn.execute(&vertex_statement("missing", "Person")).unwrap();
        assert_eq!(rows.scalar_u64(), Some(0));
    }

    #[test]
    fn test_rollback_discards_work() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        conn.execute(&Statement::begin()).unwrap();
        stage(conn.as_mut(), "v0", json!([{"id": "p1"}]));
        conn.execute(&vertex_statement("v0", "Person")).unwrap();
        assert_eq!(engine.vertex_count("g"), 0);

        conn.execute(&Statement::rollback()).unwrap();
        assert_eq!(engine.vertex_count("g"), 0);
        assert!(engine.staged_keys().is_empty());
    }

    #[test]
    fn test_failed_statement_aborts_until_savepoint_rollback() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        conn.execute(&Statement::begin()).unwrap();
        stage(conn.as_mut(), "v0", json!([{"id": "p1"}]));
        conn.execute(&Statement::savepoint("b0")).unwrap();

        stage(conn.as_mut(), "bad", json!(["not a map"]));
        assert!(conn.execute(&vertex_statement("bad", "Person")).is_err());
        let err = conn.execute(&vertex_statement("v0", "Person")).unwrap_err();
        assert!(err.to_string().contains("current transaction is aborted"));

        conn.execute(&Statement::rollback_to_savepoint("b0")).unwrap();
        conn.execute(&vertex_statement("v0", "Person")).unwrap();
        conn.execute(&Statement::commit()).unwrap();

        assert_eq!(engine.vertex_count("g"), 1);
        assert_eq!(engine.staged_keys(), vec!["v0".to_string()]);
    }

    #[test]
    fn test_commit_of_aborted_transaction_fails() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        conn.execute(&Statement::begin()).unwrap();
        assert!(conn.execute(&Statement::new("DROP TABLE x")).is_err());
        assert!(conn.execute(&Statement::commit()).is_err());
    }

    #[test]
    fn test_connection_fault_breaks_connection() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        engine.inject(Fault::connection_lost_on("CREATE (v:Person"));
        stage(conn.as_mut(), "v0", json!([{"id": "p1"}]));

        let err = conn.execute(&vertex_statement("v0", "Person")).unwrap_err();
        assert!(err.is_connection_fault());
        let err = conn.execute(&Statement::rollback()).unwrap_err();
        assert!(err.is_connection_fault());
    }

    #[test]
    fn test_pool_limits_and_counters() {
        let engine = MemoryEngine::new();
        let pool = engine.pool().with_max_connections(1);
        let conn = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(DbError::Pool { .. })));
        pool.release(conn);

        assert_eq!(engine.connections_acquired(), 1);
        assert_eq!(engine.connections_released(), 1);
        assert_eq!(engine.open_connections(), 0);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_statements_are_recorded() {
        let engine = MemoryEngine::new();
        let mut conn = ready(&engine);
        conn.execute(&Statement::begin()).unwrap();
        conn.execute(&Statement::commit()).unwrap();
        assert_eq!(engine.statements_containing("COMMIT"), 1);
        assert_eq!(engine.statements().len(), 5);
    }
}
