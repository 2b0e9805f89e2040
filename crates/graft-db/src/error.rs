//! Error types for graft-db.

use thiserror::Error;

/// Result type alias for graft-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in graft-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Connection errors
    // ========================================================================
    /// The connection to the engine is broken or was reset.
    ///
    /// Connection-level faults are never recoverable within a transaction.
    #[error("Connection fault: {message}")]
    Connection { message: String },

    /// Failed to acquire a connection from the pool.
    #[error("Failed to acquire connection: {message}")]
    Pool { message: String },

    // ========================================================================
    // Statement errors
    // ========================================================================
    /// The engine rejected or failed to execute a statement.
    #[error("Statement failed: {message}")]
    Query { message: String },

    /// The statement is not part of the dialect understood by the backend.
    #[error("Unsupported statement: {statement}")]
    Unsupported { statement: String },

    // ========================================================================
    // Staging errors
    // ========================================================================
    /// A staging side table read or write failed.
    #[error("Staging entry `{key}`: {message}")]
    Staging { key: String, message: String },

    /// PostgreSQL driver error.
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {message}")]
    Postgres { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection fault error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a pool acquisition error.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Create a statement failure error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create an unsupported statement error.
    pub fn unsupported(statement: impl Into<String>) -> Self {
        Self::Unsupported {
            statement: statement.into(),
        }
    }

    /// Create a staging error for the given key.
    pub fn staging(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Staging {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means the underlying connection can no longer be used.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Pool { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::Connection {
                message: err.to_string(),
            },
            sqlx::Error::Database(db) => Self::Query {
                message: db.message().to_string(),
            },
            other => Self::Postgres {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_faults_are_classified() {
        assert!(DbError::connection("reset by peer").is_connection_fault());
        assert!(DbError::pool("exhausted").is_connection_fault());
        assert!(!DbError::query("syntax error").is_connection_fault());
        assert!(!DbError::staging("k", "too large").is_connection_fault());
    }

    #[test]
    fn test_error_messages() {
        let err = DbError::staging("graft_abc_Person_0", "value too large");
        assert_eq!(
            err.to_string(),
            "Staging entry `graft_abc_Person_0`: value too large"
        );
    }
}
