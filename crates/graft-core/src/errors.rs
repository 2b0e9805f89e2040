//! Error types for graft-core.

use thiserror::Error;

/// Domain-specific errors for graft operations.
#[derive(Error, Debug)]
pub enum GraftError {
    /// A configuration value is invalid.
    ///
    /// Used for validation errors detected at runtime (e.g., batch_size=0).
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// A record violates the declared schema.
    #[error("Validation failed for `{type_name}` record {index}: {message}")]
    Validation {
        /// Vertex or edge type of the record.
        type_name: String,
        /// Position of the record within its type.
        index: usize,
        /// All violations, joined.
        message: String,
    },

    /// Writing to or reading from the staging side table failed.
    #[error("Staging failed for `{key}`: {message}")]
    Staging {
        /// The staging key involved.
        key: String,
        /// Underlying failure.
        message: String,
    },

    /// The engine failed to execute a generated statement.
    #[error("Execution failed for `{type_name}` batch {batch}: {message}")]
    Execution {
        /// Vertex or edge type of the batch.
        type_name: String,
        /// Batch index within the type.
        batch: usize,
        /// Underlying driver error.
        message: String,
    },

    /// A begin/commit/rollback failed at the driver level, or the connection
    /// broke.
    #[error("Transaction fault: {0}")]
    Transaction(String),

    /// The transaction API was used out of order (double commit, nested begin).
    #[error("Transaction misuse: {0}")]
    TransactionMisuse(String),

    /// The transaction exceeded its allotted time and was rolled back.
    #[error("Transaction timed out after {elapsed_ms} ms (limit {limit_ms} ms)")]
    Timeout {
        /// Time spent when the deadline was detected.
        elapsed_ms: u64,
        /// Configured limit.
        limit_ms: u64,
    },

    /// The caller's abort signal was raised.
    #[error("Load cancelled")]
    Cancelled,

    /// Graph data could not be parsed or is structurally invalid.
    #[error("Invalid graph data: {0}")]
    InvalidGraphData(String),

    /// Configuration file is invalid.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// Database infrastructure error that has no closer domain mapping.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraftError {
    /// Whether this error must abort a load regardless of `continue_on_error`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transaction(_) | Self::TransactionMisuse(_) | Self::Timeout { .. } | Self::Cancelled
        )
    }

    /// Shorthand for an [`GraftError::InvalidConfiguration`].
    pub fn invalid_configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Shorthand for a [`GraftError::TransactionMisuse`].
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::TransactionMisuse(message.into())
    }
}

/// Result alias for graft-core operations.
pub type GraftResult<T> = Result<T, GraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GraftError::Transaction("reset".into()).is_fatal());
        assert!(GraftError::misuse("double commit").is_fatal());
        assert!(GraftError::Cancelled.is_fatal());
        assert!(GraftError::Timeout {
            elapsed_ms: 10,
            limit_ms: 5
        }
        .is_fatal());

        let exec = GraftError::Execution {
            type_name: "Person".into(),
            batch: 0,
            message: "boom".into(),
        };
        assert!(!exec.is_fatal());
        assert!(!GraftError::invalid_configuration("batch_size is 0", "use 1").is_fatal());
    }

    #[test]
    fn test_invalid_configuration_message() {
        let err = GraftError::invalid_configuration("batchSize cannot be 0", "Set batchSize to at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: batchSize cannot be 0. Set batchSize to at least 1"
        );
    }
}
