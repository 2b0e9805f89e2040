//! Load outcome types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GraftError;

/// Category of a recorded load error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadErrorKind {
    Validation,
    Staging,
    Execution,
    Transaction,
    Timeout,
    Cancelled,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Staging => "staging",
            Self::Execution => "execution",
            Self::Transaction => "transaction",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// One error recorded during a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadError {
    pub kind: LoadErrorKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Batch index within the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,

    /// Record position within the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,

    pub message: String,
}

impl LoadError {
    pub fn new(kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: None,
            batch: None,
            record: None,
            message: message.into(),
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_record(mut self, record: usize) -> Self {
        self.record = Some(record);
        self
    }

    /// Record a [`GraftError`], keeping whatever location it carries.
    pub fn from_error(err: &GraftError) -> Self {
        match err {
            GraftError::Validation {
                type_name,
                index,
                message,
            } => Self::new(LoadErrorKind::Validation, message.clone())
                .with_type(type_name.clone())
                .with_record(*index),
            GraftError::Staging { key, message } => {
                Self::new(LoadErrorKind::Staging, format!("{}: {}", key, message))
            }
            GraftError::Execution {
                type_name,
                batch,
                message,
            } => Self::new(LoadErrorKind::Execution, message.clone())
                .with_type(type_name.clone())
                .with_batch(*batch),
            GraftError::Transaction(_) | GraftError::TransactionMisuse(_) => {
                Self::new(LoadErrorKind::Transaction, err.to_string())
            }
            GraftError::Timeout { .. } => Self::new(LoadErrorKind::Timeout, err.to_string()),
            GraftError::Cancelled => Self::new(LoadErrorKind::Cancelled, err.to_string()),
            other => Self::new(LoadErrorKind::Execution, other.to_string()),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(type_name) = &self.type_name {
            write!(f, " {}", type_name)?;
        }
        if let Some(batch) = self.batch {
            write!(f, " batch {}", batch)?;
        }
        if let Some(record) = self.record {
            write!(f, " record {}", record)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of one load call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub load_id: String,
    pub success: bool,

    pub started_at: DateTime<Utc>,

    /// Vertices created by batches that completed.
    pub vertex_count: u64,

    /// Edges created by batches that completed.
    pub edge_count: u64,

    pub vertex_types: Vec<String>,
    pub edge_types: Vec<String>,

    #[serde(rename = "durationMs", with = "millis")]
    pub duration: Duration,

    pub errors: Vec<LoadError>,
    pub warnings: Vec<String>,

    /// Records dropped by validation.
    pub skipped_records: usize,
}

impl LoadResult {
    /// Succeeded, but with recorded errors or skipped records.
    pub fn is_partial(&self) -> bool {
        self.success && (!self.errors.is_empty() || self.skipped_records > 0)
    }

    /// The first error whose kind is `kind`.
    pub fn first_error(&self, kind: LoadErrorKind) -> Option<&LoadError> {
        self.errors.iter().find(|e| e.kind == kind)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
