//! Keyed staging side table.
//!
//! The target query language cannot receive structured parameters, so bulk
//! data crosses into the engine in two steps: the loader writes a batch under
//! a key into a plain SQL table, and the generated graph statement reads it
//! back through a server-side function call.
//!
//! - [`StagingKey`] - validated key, namespaced per load, type and batch
//! - [`StagingTable`] - persisted layout and the SQL rendered against it
//! - [`StagingStore`] - injectable store trait
//! - [`TableStagingStore`] - the SQL implementation
//!
//! ## Persisted Layout
//!
//! ```text
//! <schema>.<table> (key text PRIMARY KEY, value jsonb NOT NULL)
//! <schema>.<function>(agtype) -> agtype   -- '[]' when the key is absent
//! ```
//!
//! The schema holds nothing but staging data and is safe to truncate between
//! loads.

mod table;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{Connection, Statement};
use crate::error::{DbError, DbResult};

pub use table::TableStagingStore;

// ============================================================================
// Constants
// ============================================================================

/// Default schema holding the staging table.
pub const DEFAULT_STAGING_SCHEMA: &str = "graft_staging";

/// Default staging table name.
pub const DEFAULT_STAGING_TABLE: &str = "staged_data";

/// Default retrieval function name.
pub const DEFAULT_STAGING_FUNCTION: &str = "get_staged_data";

/// Prefix shared by every key graft writes.
pub const KEY_PREFIX: &str = "graft";

// ============================================================================
// StagingKey
// ============================================================================

/// Key of a staging entry.
///
/// Keys are embedded verbatim in generated statements, so they are restricted
/// to ASCII alphanumerics, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingKey(String);

impl StagingKey {
    /// Create a key, rejecting characters that are unsafe inside statement text.
    pub fn new(key: impl Into<String>) -> DbResult<Self> {
        let key = key.into();
        if !is_safe_key(&key) {
            return Err(DbError::staging(
                key,
                "staging keys may only contain ASCII letters, digits, '_' and '-'",
            ));
        }
        Ok(Self(key))
    }

    /// Build the key for one batch of one type within a load namespace.
    ///
    /// Format: `{prefix}_{type_name}_{batch_index}`.
    pub fn for_batch(prefix: &str, type_name: &str, batch_index: usize) -> DbResult<Self> {
        Self::new(format!("{prefix}_{type_name}_{batch_index}"))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Build the key prefix for a load: `graft_<load id without dashes>`.
pub fn namespace_prefix(load_id: &str) -> String {
    let compact: String = load_id.chars().filter(|c| *c != '-').collect();
    format!("{KEY_PREFIX}_{compact}")
}

// ============================================================================
// StagingTable
// ============================================================================

/// Names making up the persisted staging layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingTable {
    /// Schema (namespace) holding the table and function.
    pub schema: String,

    /// Table name.
    pub table: String,

    /// Retrieval function name.
    pub function: String,
}

impl Default for StagingTable {
    fn default() -> Self {
        Self {
            schema: DEFAULT_STAGING_SCHEMA.to_string(),
            table: DEFAULT_STAGING_TABLE.to_string(),
            function: DEFAULT_STAGING_FUNCTION.to_string(),
        }
    }
}

impl StagingTable {
    /// Create a layout, validating every name as a SQL identifier.
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        function: impl Into<String>,
    ) -> DbResult<Self> {
        let layout = Self {
            schema: schema.into(),
            table: table.into(),
            function: function.into(),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Check that all names are plain identifiers.
    pub fn validate(&self) -> DbResult<()> {
        for (what, name) in [
            ("schema", &self.schema),
            ("table", &self.table),
            ("function", &self.function),
        ] {
            if !is_sql_identifier(name) {
                return Err(DbError::Config {
                    message: format!("staging {what} name `{name}` is not a valid identifier"),
                });
            }
        }
        Ok(())
    }

    /// `schema.table`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// `schema.function`
    pub fn qualified_function(&self) -> String {
        format!("{}.{}", self.schema, self.function)
    }

    /// Statements creating the schema, table and retrieval function.
    ///
    /// All of them are idempotent.
    pub fn ddl(&self) -> Vec<Statement> {
        let table = self.qualified_table();
        vec![
            Statement::new(format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema)),
            Statement::new(format!(
                "CREATE TABLE IF NOT EXISTS {table} (key text PRIMARY KEY, value jsonb NOT NULL)"
            )),
            Statement::new(format!(
                "CREATE OR REPLACE FUNCTION {}(staging_key agtype) RETURNS agtype AS $fn$ \
                 SELECT COALESCE((SELECT value::text FROM {table} \
                 WHERE key = trim(both '\"' from staging_key::text)), '[]')::agtype \
                 $fn$ LANGUAGE sql STABLE",
                self.qualified_function()
            )),
        ]
    }

    /// Idempotent write of one entry.
    pub fn upsert(&self, key: &StagingKey, value: &Value) -> Statement {
        Statement::new(format!(
            "INSERT INTO {} (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            self.qualified_table()
        ))
        .bind(key.as_str())
        .bind(value.clone())
    }

    /// Read one entry.
    pub fn select(&self, key: &StagingKey) -> Statement {
        Statement::new(format!(
            "SELECT value FROM {} WHERE key = $1",
            self.qualified_table()
        ))
        .bind(key.as_str())
    }

    /// Delete one entry, returning the deleted key.
    pub fn delete(&self, key: &StagingKey) -> Statement {
        Statement::new(format!(
            "DELETE FROM {} WHERE key = $1 RETURNING key",
            self.qualified_table()
        ))
        .bind(key.as_str())
    }

    /// Delete every entry whose key starts with `prefix`, returning deleted keys.
    pub fn delete_prefix(&self, prefix: &str) -> Statement {
        Statement::new(format!(
            "DELETE FROM {} WHERE starts_with(key, $1) RETURNING key",
            self.qualified_table()
        ))
        .bind(prefix)
    }

    /// Server-side call that yields the staged value for `key` inside a graph
    /// statement.
    pub fn retrieval_call(&self, key: &StagingKey) -> String {
        format!("{}('{}')", self.qualified_function(), key.as_str())
    }
}

/// Whether `name` is a plain `[A-Za-z_][A-Za-z0-9_]*` identifier.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// StagingStore Trait
// ============================================================================

/// Keyed side store the loader writes to and the engine reads from.
///
/// Every operation runs on the connection passed in, so staging writes take
/// part in whatever transaction that connection has open.
pub trait StagingStore: Send + Sync {
    /// Create the persisted layout if it does not exist yet.
    fn ensure(&self, conn: &mut dyn Connection) -> DbResult<()>;

    /// Write `value` under `key`, replacing any previous value.
    fn put(&self, conn: &mut dyn Connection, key: &StagingKey, value: &Value) -> DbResult<()>;

    /// Read the value under `key`.
    ///
    /// An absent key yields an empty JSON array, never an error.
    fn get(&self, conn: &mut dyn Connection, key: &StagingKey) -> DbResult<Value>;

    /// Delete one entry. Returns whether it existed.
    fn delete(&self, conn: &mut dyn Connection, key: &StagingKey) -> DbResult<bool>;

    /// Delete every entry under a key prefix. Returns the number deleted.
    fn delete_prefix(&self, conn: &mut dyn Connection, prefix: &str) -> DbResult<usize>;

    /// Call expression the engine evaluates to read `key` back.
    fn retrieval_call(&self, key: &StagingKey) -> String;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_staging_key_rejects_quotes() {
        assert!(StagingKey::new("graft_abc_Person_0").is_ok());
        assert!(StagingKey::new("a'); DROP TABLE x; --").is_err());
        assert!(StagingKey::new("").is_err());
    }

    #[test]
    fn test_key_for_batch_format() {
        let key = StagingKey::for_batch("graft_abc", "Person", 3).unwrap();
        assert_eq!(key.as_str(), "graft_abc_Person_3");
    }

    #[test]
    fn test_namespace_prefix_strips_dashes() {
        let prefix = namespace_prefix("1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert_eq!(prefix, "graft_1b4e28ba2fa111d2883f0016d3cca427");
    }

    #[test]
    fn test_staging_table_validation() {
        assert!(StagingTable::new("graft_staging", "staged_data", "get_staged_data").is_ok());
        assert!(StagingTable::new("bad schema", "t", "f").is_err());
        assert!(StagingTable::new("s", "t;", "f").is_err());
    }

    #[test]
    fn test_upsert_binds_key_and_value() {
        let layout = StagingTable::default();
        let key = StagingKey::new("k1").unwrap();
        let stmt = layout.upsert(&key, &json!([{"id": "p1"}]));

        assert!(stmt.text.starts_with("INSERT INTO graft_staging.staged_data"));
        assert!(stmt.text.contains("ON CONFLICT (key) DO UPDATE"));
        assert_eq!(stmt.params, vec![json!("k1"), json!([{"id": "p1"}])]);
    }

    #[test]
    fn test_retrieval_call() {
        let layout = StagingTable::default();
        let key = StagingKey::new("graft_x_Person_0").unwrap();
        assert_eq!(
            layout.retrieval_call(&key),
            "graft_staging.get_staged_data('graft_x_Person_0')"
        );
    }

    #[test]
    fn test_ddl_is_idempotent_text() {
        let ddl = StagingTable::default().ddl();
        assert_eq!(ddl.len(), 3);
        assert!(ddl[0].text.contains("IF NOT EXISTS"));
        assert!(ddl[1].text.contains("IF NOT EXISTS"));
        assert!(ddl[2].text.starts_with("CREATE OR REPLACE FUNCTION"));
    }
}
