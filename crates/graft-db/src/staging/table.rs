//! SQL implementation of [`StagingStore`].

use serde_json::Value;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{DbError, DbResult};

use super::{StagingKey, StagingStore, StagingTable};

/// Staging store backed by a two-column SQL table.
#[derive(Debug, Clone, Default)]
pub struct TableStagingStore {
    layout: StagingTable,
}

impl TableStagingStore {
    /// Create a store over the given layout.
    pub fn new(layout: StagingTable) -> DbResult<Self> {
        layout.validate()?;
        Ok(Self { layout })
    }

    /// The persisted layout this store writes to.
    pub fn layout(&self) -> &StagingTable {
        &self.layout
    }
}

/// Attach the key to statement failures; connection faults pass through.
fn staging_failure(key: &str, err: DbError) -> DbError {
    match err {
        DbError::Query { message } => DbError::staging(key, message),
        DbError::Unsupported { statement } => {
            DbError::staging(key, format!("unsupported statement: {statement}"))
        }
        other => other,
    }
}

impl StagingStore for TableStagingStore {
    fn ensure(&self, conn: &mut dyn Connection) -> DbResult<()> {
        debug!(table = %self.layout.qualified_table(), "Ensuring staging layout");
        for statement in self.layout.ddl() {
            conn.execute(&statement)?;
        }
        Ok(())
    }

    fn put(&self, conn: &mut dyn Connection, key: &StagingKey, value: &Value) -> DbResult<()> {
        trace!(key = %key, "Staging value");
        conn.execute(&self.layout.upsert(key, value))
            .map(|_| ())
            .map_err(|e| staging_failure(key.as_str(), e))
    }

    fn get(&self, conn: &mut dyn Connection, key: &StagingKey) -> DbResult<Value> {
        let rows = conn
            .execute(&self.layout.select(key))
            .map_err(|e| staging_failure(key.as_str(), e))?;

        match rows.first_value() {
            None | Some(Value::Null) => Ok(Value::Array(Vec::new())),
            // Some drivers hand jsonb back as text.
            Some(Value::String(text)) => serde_json::from_str(text).map_err(|e| {
                DbError::staging(key.as_str(), format!("stored value is not JSON: {e}"))
            }),
            Some(value) => Ok(value.clone()),
        }
    }

    fn delete(&self, conn: &mut dyn Connection, key: &StagingKey) -> DbResult<bool> {
        let rows = conn
            .execute(&self.layout.delete(key))
            .map_err(|e| staging_failure(key.as_str(), e))?;
        Ok(!rows.is_empty())
    }

    fn delete_prefix(&self, conn: &mut dyn Connection, prefix: &str) -> DbResult<usize> {
        let rows = conn
            .execute(&self.layout.delete_prefix(prefix))
            .map_err(|e| staging_failure(prefix, e))?;
        debug!(prefix, deleted = rows.len(), "Deleted staging entries");
        Ok(rows.len())
    }

    fn retrieval_call(&self, key: &StagingKey) -> String {
        self.layout.retrieval_call(key)
    }
}
