//! Connection and pool abstractions.
//!
//! The loader never talks to a driver directly. Everything it needs from the
//! engine goes through two narrow traits:
//!
//! - [`Connection`] - executes one [`Statement`] and returns [`Rows`]
//! - [`ConnectionPool`] - hands out connections and takes them back
//!
//! ## Backends
//!
//! - **memory** (always available): [`MemoryEngine`], an in-process engine that
//!   understands the statement dialect graft emits. Used by tests, dry runs and
//!   the CLI `--memory` mode.
//! - **postgres** (feature-gated): PostgreSQL with the Apache AGE extension.
//!
//! ## Sync Design
//!
//! Both traits are synchronous. Async drivers wrap their futures with an owned
//! `tokio::runtime::Runtime` and `block_on()`.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DbResult;

pub use memory::{Fault, MemoryConnection, MemoryEngine, MemoryPool, StoredEdge, StoredVertex};

#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PgConnection, PgPool};

// ============================================================================
// Statement
// ============================================================================

/// A statement ready for execution: query text plus positional parameters.
///
/// This is the opaque `(text, params)` pair exchanged with the engine.
/// Parameters bind to `$1`, `$2`, ... in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement text.
    pub text: String,

    /// Positional parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// `BEGIN`
    pub fn begin() -> Self {
        Self::new("BEGIN")
    }

    /// `COMMIT`
    pub fn commit() -> Self {
        Self::new("COMMIT")
    }

    /// `ROLLBACK`
    pub fn rollback() -> Self {
        Self::new("ROLLBACK")
    }

    /// `SAVEPOINT <name>`
    pub fn savepoint(name: &str) -> Self {
        Self::new(format!("SAVEPOINT {name}"))
    }

    /// `RELEASE SAVEPOINT <name>`
    pub fn release_savepoint(name: &str) -> Self {
        Self::new(format!("RELEASE SAVEPOINT {name}"))
    }

    /// `ROLLBACK TO SAVEPOINT <name>`
    pub fn rollback_to_savepoint(name: &str) -> Self {
        Self::new(format!("ROLLBACK TO SAVEPOINT {name}"))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

// ============================================================================
// Rows
// ============================================================================

/// A single result row.
pub type Row = Vec<Value>;

/// Result set returned by [`Connection::execute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rows {
    /// Column names, in order.
    pub columns: Vec<String>,

    /// Row values, each with one entry per column.
    pub rows: Vec<Row>,
}

impl Rows {
    /// An empty result (no columns, no rows).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a result set.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// A single-column, single-row result.
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![value]],
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Read the first value as an integer count.
    ///
    /// Accepts JSON numbers and numeric strings, since agtype results come back
    /// as text from some drivers.
    pub fn scalar_u64(&self) -> Option<u64> {
        match self.first_value()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().trim_matches('"').parse().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A handle capable of executing statements against the engine.
///
/// A connection is used by one logical operation at a time; exclusive access is
/// expressed through `&mut self`.
pub trait Connection: Send {
    /// Execute a statement and return its rows.
    fn execute(&mut self, statement: &Statement) -> DbResult<Rows>;

    /// Whether a failed `COMMIT` leaves the transaction rolled back.
    ///
    /// When false, callers must issue an explicit `ROLLBACK` afterwards.
    fn rolls_back_on_failed_commit(&self) -> bool {
        true
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Source of connections.
pub trait ConnectionPool: Send + Sync {
    /// Acquire a connection for exclusive use.
    fn acquire(&self) -> DbResult<Box<dyn Connection>>;

    /// Return a connection to the pool.
    fn release(&self, connection: Box<dyn Connection>);
}
