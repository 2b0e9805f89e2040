//! Adapter layer for graft-db infrastructure.
//!
//! This module bridges graft-db errors with graft-core's error taxonomy:
//!
//! - [`from_db_error`] - context-free conversion
//! - [`staging_error`] / [`execution_error`] - conversions that attach the
//!   key or batch the failure belongs to
//!
//! Connection-level faults always become [`GraftError::Transaction`], whatever
//! operation they interrupted, so they are fatal to the load.

use graft_db::DbError;

use crate::errors::GraftError;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a graft-db error to a graft-core error.
pub fn from_db_error(err: DbError) -> GraftError {
    match err {
        DbError::Connection { message } => GraftError::Transaction(message),
        DbError::Pool { message } => {
            GraftError::Transaction(format!("could not acquire connection: {}", message))
        }
        DbError::Staging { key, message } => GraftError::Staging { key, message },
        DbError::Config { message } => GraftError::InvalidConfig(message),
        DbError::Json(e) => GraftError::Json(e),
        other => GraftError::Database(other.to_string()),
    }
}

/// Convert a failure of a staging operation on `key`.
pub fn staging_error(err: DbError, key: &str) -> GraftError {
    match err {
        err if err.is_connection_fault() => from_db_error(err),
        DbError::Staging { key, message } => GraftError::Staging { key, message },
        other => GraftError::Staging {
            key: key.to_string(),
            message: other.to_string(),
        },
    }
}

/// Convert a failure of a generated statement for one batch.
pub fn execution_error(err: DbError, type_name: &str, batch: usize) -> GraftError {
    match err {
        err if err.is_connection_fault() => from_db_error(err),
        DbError::Query { message } => GraftError::Execution {
            type_name: type_name.to_string(),
            batch,
            message,
        },
        other => GraftError::Execution {
            type_name: type_name.to_string(),
            batch,
            message: other.to_string(),
        },
    }
}

/// Extension trait for converting DbResult to a graft-core result.
pub trait IntoGraftResult<T> {
    /// Convert a DbResult to a GraftError result.
    fn into_graft_result(self) -> Result<T, GraftError>;
}

impl<T> IntoGraftResult<T> for graft_db::DbResult<T> {
    fn into_graft_result(self) -> Result<T, GraftError> {
        self.map_err(from_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fault_is_fatal_everywhere() {
        assert!(from_db_error(DbError::connection("reset")).is_fatal());
        assert!(staging_error(DbError::connection("reset"), "k").is_fatal());
        assert!(execution_error(DbError::pool("exhausted"), "Person", 0).is_fatal());
    }

    #[test]
    fn test_execution_error_keeps_context() {
        let err = execution_error(DbError::query("syntax error"), "KNOWS", 3);
        match err {
            GraftError::Execution {
                type_name,
                batch,
                message,
            } => {
                assert_eq!(type_name, "KNOWS");
                assert_eq!(batch, 3);
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_staging_error_keeps_key() {
        let err = staging_error(DbError::query("relation missing"), "graft_x_A_0");
        assert!(matches!(err, GraftError::Staging { ref key, .. } if key == "graft_x_A_0"));
        assert!(!err.is_fatal());
    }
}
