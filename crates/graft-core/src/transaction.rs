//! Transaction coordination.
//!
//! A [`Transaction`] exclusively owns one pooled connection from `BEGIN` until
//! it reaches a terminal state, and hands the connection back to the pool
//! exactly once on every path:
//!
//! ```text
//! Created --begin--> Active --commit--> Committed
//!                       \----rollback--> RolledBack
//! ```
//!
//! A failed commit, an expired deadline and dropping an active transaction
//! all end in `RolledBack`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use graft_db::connection::{Connection, ConnectionPool, Rows, Statement};
use graft_db::DbError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db_adapter::{from_db_error, IntoGraftResult};
use crate::errors::GraftError;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Created,
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{}", name)
    }
}

fn transaction_fault(context: &str, err: DbError) -> GraftError {
    match from_db_error(err) {
        GraftError::Transaction(message) => GraftError::Transaction(message),
        other => GraftError::Transaction(format!("{}: {}", context, other)),
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// One unit of work on one connection.
pub struct Transaction {
    id: String,
    pool: Arc<dyn ConnectionPool>,
    conn: Option<Box<dyn Connection>>,
    state: TxState,
    timeout: Option<Duration>,
    started: Option<Instant>,
}

impl Transaction {
    /// A transaction in the `Created` state; no connection is held yet.
    pub fn new(pool: Arc<dyn ConnectionPool>, timeout: Option<Duration>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pool,
            conn: None,
            state: TxState::Created,
            timeout,
            started: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// Time since `BEGIN`.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Acquire a connection and issue `BEGIN`.
    ///
    /// # Errors
    ///
    /// [`GraftError::TransactionMisuse`] unless the transaction is `Created`;
    /// [`GraftError::Transaction`] if no connection can be acquired or `BEGIN`
    /// fails.
    pub fn begin(&mut self) -> Result<(), GraftError> {
        match self.state {
            TxState::Created => {}
            TxState::Active => {
                return Err(GraftError::misuse("begin on an active transaction"));
            }
            state => {
                return Err(GraftError::misuse(format!(
                    "begin on a {} transaction",
                    state
                )));
            }
        }

        let mut conn = self.pool.acquire().map_err(from_db_error)?;
        if let Err(e) = conn.execute(&Statement::begin()) {
            self.pool.release(conn);
            self.state = TxState::RolledBack;
            return Err(transaction_fault("BEGIN failed", e));
        }

        debug!(tx_id = %self.id, backend = conn.backend_name(), "Transaction started");
        self.conn = Some(conn);
        self.state = TxState::Active;
        self.started = Some(Instant::now());
        Ok(())
    }

    fn require_active(&self, operation: &str) -> Result<(), GraftError> {
        if self.state == TxState::Active {
            Ok(())
        } else {
            Err(GraftError::misuse(format!(
                "{} on a {} transaction",
                operation, self.state
            )))
        }
    }

    /// Force a rollback when the deadline has passed.
    fn check_deadline(&mut self) -> Result<(), GraftError> {
        let Some(limit) = self.timeout else {
            return Ok(());
        };
        let elapsed = self.elapsed();
        if elapsed < limit {
            return Ok(());
        }

        warn!(tx_id = %self.id, elapsed_ms = elapsed.as_millis() as u64, "Transaction deadline exceeded, rolling back");
        self.abandon();
        Err(GraftError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
            limit_ms: limit.as_millis() as u64,
        })
    }

    /// The connection, for running statements inside this transaction.
    ///
    /// # Errors
    ///
    /// [`GraftError::TransactionMisuse`] unless active;
    /// [`GraftError::Timeout`] when the deadline has passed (the transaction is
    /// rolled back first).
    pub fn connection(&mut self) -> Result<&mut dyn Connection, GraftError> {
        self.require_active("execute")?;
        self.check_deadline()?;
        match self.conn.as_mut() {
            Some(conn) => Ok(conn.as_mut()),
            None => Err(GraftError::Transaction(
                "active transaction has no connection".to_string(),
            )),
        }
    }

    /// Execute a statement inside this transaction.
    pub fn execute(&mut self, statement: &Statement) -> Result<Rows, GraftError> {
        self.connection()?.execute(statement).into_graft_result()
    }

    /// Commit.
    ///
    /// On failure the transaction ends `RolledBack`. When the driver leaves
    /// the transaction open after a failed commit, an explicit `ROLLBACK` is
    /// attempted first.
    pub fn commit(&mut self) -> Result<(), GraftError> {
        self.require_active("commit")?;
        self.check_deadline()?;

        let Some(mut conn) = self.conn.take() else {
            self.state = TxState::RolledBack;
            return Err(GraftError::Transaction(
                "active transaction has no connection".to_string(),
            ));
        };

        let result = conn.execute(&Statement::commit());
        let outcome = match result {
            Ok(_) => {
                self.state = TxState::Committed;
                debug!(tx_id = %self.id, elapsed_ms = self.elapsed().as_millis() as u64, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                if !conn.rolls_back_on_failed_commit() {
                    if let Err(rb) = conn.execute(&Statement::rollback()) {
                        warn!(tx_id = %self.id, "Rollback after failed commit also failed: {}", rb);
                    }
                }
                self.state = TxState::RolledBack;
                warn!(tx_id = %self.id, "Commit failed: {}", e);
                Err(transaction_fault("COMMIT failed", e))
            }
        };

        self.pool.release(conn);
        outcome
    }

    /// Roll back.
    ///
    /// The transaction ends `RolledBack` even when `ROLLBACK` itself fails.
    pub fn rollback(&mut self) -> Result<(), GraftError> {
        self.require_active("rollback")?;

        let result = match self.conn.as_mut() {
            Some(conn) => conn.execute(&Statement::rollback()),
            None => Ok(Rows::empty()),
        };
        self.state = TxState::RolledBack;
        self.release_connection();
        debug!(tx_id = %self.id, "Transaction rolled back");

        result
            .map(|_| ())
            .map_err(|e| transaction_fault("ROLLBACK failed", e))
    }

    /// `SAVEPOINT <name>`
    pub fn savepoint(&mut self, name: &str) -> Result<(), GraftError> {
        self.savepoint_op(&Statement::savepoint(name), "SAVEPOINT")
    }

    /// `RELEASE SAVEPOINT <name>`
    pub fn release_savepoint(&mut self, name: &str) -> Result<(), GraftError> {
        self.savepoint_op(&Statement::release_savepoint(name), "RELEASE SAVEPOINT")
    }

    /// `ROLLBACK TO SAVEPOINT <name>`; the transaction stays active.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), GraftError> {
        self.savepoint_op(&Statement::rollback_to_savepoint(name), "ROLLBACK TO SAVEPOINT")
    }

    fn savepoint_op(&mut self, statement: &Statement, what: &str) -> Result<(), GraftError> {
        self.connection()?
            .execute(statement)
            .map(|_| ())
            .map_err(|e| transaction_fault(&format!("{} failed", what), e))
    }

    /// Best-effort rollback without state checks.
    fn abandon(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            if let Err(e) = conn.execute(&Statement::rollback()) {
                warn!(tx_id = %self.id, "Best-effort rollback failed: {}", e);
            }
        }
        self.state = TxState::RolledBack;
        self.release_connection();
    }

    fn release_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            warn!(tx_id = %self.id, "Active transaction dropped, rolling back");
            self.abandon();
        }
    }
}

// ============================================================================
// TransactionCoordinator
// ============================================================================

/// Starts transactions on a pool.
#[derive(Clone)]
pub struct TransactionCoordinator {
    pool: Arc<dyn ConnectionPool>,
    timeout: Option<Duration>,
}

impl TransactionCoordinator {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            timeout: None,
        }
    }

    /// Deadline applied to every transaction this coordinator begins.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> Result<Transaction, GraftError> {
        let mut tx = Transaction::new(Arc::clone(&self.pool), self.timeout);
        tx.begin()?;
        Ok(tx)
    }

    /// Run `f` in a new transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err`.
    ///
    /// If `f` ends the transaction itself, nothing further is done.
    pub fn run_in_transaction<T, F>(&self, f: F) -> Result<T, GraftError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, GraftError>,
    {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                if tx.is_active() {
                    tx.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if tx.is_active() {
                    if let Err(rb) = tx.rollback() {
                        warn!(tx_id = %tx.id(), "Rollback failed: {}", rb);
                    }
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("timeout", &self.timeout)
            .finish()
    }
}
