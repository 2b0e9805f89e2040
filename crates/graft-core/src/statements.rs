//! Statement generation.
//!
//! Each batch crosses into the engine in two steps:
//!
//! 1. its records are serialized into a staged payload and written under a
//!    staging key
//! 2. a `cypher()` statement reads that key back through the staging
//!    retrieval call and creates one entity per row
//!
//! Record values only ever travel through the staged payload. Statement text
//! contains nothing but the graph name, labels, property names and the
//! retrieval call, one clause per line:
//!
//! ```text
//! SELECT * FROM cypher('social', $$
//! UNWIND graft_staging.get_staged_data('graft_1f.._Person_0') AS row
//! CREATE (v:Person {id: row.id, name: row.name})
//! RETURN count(v)
//! $$) AS (created agtype)
//! ```
//!
//! Staged payloads: a vertex batch is a JSON array of property objects; an
//! edge batch is a JSON array of `{"from", "to", "props"}` objects.

use std::collections::BTreeSet;

use graft_db::connection::Statement;
use graft_db::staging::is_sql_identifier;
use serde_json::{Map, Value};

use crate::constants::{CREATED_COLUMN, EDGE_FROM_KEY, EDGE_PROPS_KEY, EDGE_TO_KEY};
use crate::errors::GraftError;
use crate::graph::{EdgeRecord, PropertyRecord};
use crate::schema::{DeclaredProperties, EdgeEndpoints, SchemaValidator};
use crate::value::PropertyValue;

/// Columns returned by [`StatementGenerator::edge_probe_statement`].
pub const PROBE_COLUMNS: [&str; 4] = ["from_id", "to_id", "from_missing", "to_missing"];

/// Whether `name` can be used as a vertex or edge label.
pub fn is_label(name: &str) -> bool {
    is_sql_identifier(name)
}

/// Quote a property name for use inside a Cypher map or property access.
///
/// Plain identifiers pass through; anything else is back-tick quoted with
/// back-ticks doubled.
pub fn quote_identifier(name: &str) -> String {
    if is_sql_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn check_label(label: &str) -> Result<(), GraftError> {
    if is_label(label) {
        Ok(())
    } else {
        Err(GraftError::InvalidGraphData(format!(
            "`{}` is not a valid label; labels must match [A-Za-z_][A-Za-z0-9_]*",
            label
        )))
    }
}

fn check_property_name(name: &str) -> Result<(), GraftError> {
    if name.is_empty() || name.contains("$$") {
        return Err(GraftError::InvalidGraphData(format!(
            "property name `{}` cannot be used in a statement",
            name
        )));
    }
    Ok(())
}

// ============================================================================
// Payloads
// ============================================================================

fn record_to_json(record: &PropertyRecord) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Staged payload of a vertex batch.
pub fn vertex_payload(records: &[PropertyRecord]) -> Value {
    Value::Array(records.iter().map(record_to_json).collect())
}

/// Staged payload of an edge batch.
pub fn edge_payload(records: &[EdgeRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|edge| {
                let mut row = Map::new();
                row.insert(EDGE_FROM_KEY.to_string(), edge.from.to_json());
                row.insert(EDGE_TO_KEY.to_string(), edge.to.to_json());
                row.insert(EDGE_PROPS_KEY.to_string(), record_to_json(&edge.properties));
                Value::Object(row)
            })
            .collect(),
    )
}

// ============================================================================
// Property Lists
// ============================================================================

/// Properties a vertex statement sets.
///
/// A closed declared type sets exactly its declared names. An open or
/// undeclared type also sets every key present in the batch, sorted.
pub fn vertex_property_names(
    schema: Option<&dyn SchemaValidator>,
    type_name: &str,
    records: &[PropertyRecord],
) -> Vec<String> {
    let declared = schema.and_then(|s| s.vertex_properties(type_name));
    property_names(declared, records.iter())
}

/// Properties an edge statement sets, chosen like [`vertex_property_names`].
pub fn edge_property_names(
    schema: Option<&dyn SchemaValidator>,
    type_name: &str,
    records: &[EdgeRecord],
) -> Vec<String> {
    let declared = schema.and_then(|s| s.edge_properties(type_name));
    property_names(declared, records.iter().map(|e| &e.properties))
}

fn property_names<'a>(
    declared: Option<DeclaredProperties>,
    records: impl Iterator<Item = &'a PropertyRecord>,
) -> Vec<String> {
    let mut names = BTreeSet::new();
    match declared {
        Some(decl) if !decl.open => return decl.names,
        Some(decl) => names.extend(decl.names),
        None => {}
    }
    names.extend(records.flat_map(|r| r.keys().cloned()));
    names.into_iter().collect()
}

// ============================================================================
// StatementGenerator
// ============================================================================

/// Builds the execution statements for one target graph.
#[derive(Debug, Clone)]
pub struct StatementGenerator {
    graph: String,
    id_property: String,
}

impl StatementGenerator {
    /// # Errors
    ///
    /// Returns [`GraftError::InvalidConfiguration`] if the graph name is not an
    /// identifier or `id_property` is empty.
    pub fn new(graph: impl Into<String>, id_property: impl Into<String>) -> Result<Self, GraftError> {
        let graph = graph.into();
        let id_property = id_property.into();

        if !is_sql_identifier(&graph) {
            return Err(GraftError::invalid_configuration(
                format!("graph name `{}` is not a valid identifier", graph),
                "Use a graph name matching [A-Za-z_][A-Za-z0-9_]*",
            ));
        }
        if id_property.is_empty() || id_property.contains("$$") {
            return Err(GraftError::invalid_configuration(
                format!("id property `{}` is not usable", id_property),
                "Set the id property to the vertex property edges resolve against",
            ));
        }

        Ok(Self { graph, id_property })
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn id_property(&self) -> &str {
        &self.id_property
    }

    fn wrap(&self, retrieval_call: &str, clauses: &[String], columns: &[&str]) -> Statement {
        let mut text = format!(
            "SELECT * FROM cypher('{}', $$\nUNWIND {} AS row\n",
            self.graph, retrieval_call
        );
        for clause in clauses {
            text.push_str(clause);
            text.push('\n');
        }
        let columns: Vec<String> = columns.iter().map(|c| format!("{} agtype", c)).collect();
        text.push_str(&format!("$$) AS ({})", columns.join(", ")));
        Statement::new(text)
    }

    fn property_map(properties: &[String], prefix: &str) -> Result<String, GraftError> {
        if properties.is_empty() {
            return Ok(String::new());
        }
        let entries = properties
            .iter()
            .map(|name| -> Result<String, GraftError> {
                check_property_name(name)?;
                let quoted = quote_identifier(name);
                Ok(format!("{}: {}{}", quoted, prefix, quoted))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!(" {{{}}}", entries.join(", ")))
    }

    fn endpoint(&self, var: &str, label: Option<&str>, field: &str) -> Result<String, GraftError> {
        let label = match label {
            Some(label) => {
                check_label(label)?;
                format!(":{}", label)
            }
            None => String::new(),
        };
        Ok(format!(
            "({}{} {{{}: row.{}}})",
            var,
            label,
            quote_identifier(&self.id_property),
            field
        ))
    }

    /// Statement creating one vertex of `label` per staged row, returning the
    /// created count.
    pub fn vertex_statement(
        &self,
        label: &str,
        properties: &[String],
        retrieval_call: &str,
    ) -> Result<Statement, GraftError> {
        check_label(label)?;
        let map = Self::property_map(properties, "row.")?;
        Ok(self.wrap(
            retrieval_call,
            &[
                format!("CREATE (v:{}{})", label, map),
                "RETURN count(v)".to_string(),
            ],
            &[CREATED_COLUMN],
        ))
    }

    /// Statement creating one edge of `label` per staged row whose endpoints
    /// both resolve, returning the created count.
    pub fn edge_statement(
        &self,
        label: &str,
        endpoints: &EdgeEndpoints,
        properties: &[String],
        retrieval_call: &str,
    ) -> Result<Statement, GraftError> {
        check_label(label)?;
        let from = self.endpoint("a", endpoints.from.as_deref(), EDGE_FROM_KEY)?;
        let to = self.endpoint("b", endpoints.to.as_deref(), EDGE_TO_KEY)?;
        let map = Self::property_map(properties, &format!("row.{}.", EDGE_PROPS_KEY))?;
        Ok(self.wrap(
            retrieval_call,
            &[
                format!("MATCH {}, {}", from, to),
                format!("CREATE (a)-[e:{}{}]->(b)", label, map),
                "RETURN count(e)".to_string(),
            ],
            &[CREATED_COLUMN],
        ))
    }

    /// Statement returning the staged edge rows whose `from` or `to` does not
    /// resolve, with columns [`PROBE_COLUMNS`].
    pub fn edge_probe_statement(
        &self,
        endpoints: &EdgeEndpoints,
        retrieval_call: &str,
    ) -> Result<Statement, GraftError> {
        let from = self.endpoint("a", endpoints.from.as_deref(), EDGE_FROM_KEY)?;
        let to = self.endpoint("b", endpoints.to.as_deref(), EDGE_TO_KEY)?;
        Ok(self.wrap(
            retrieval_call,
            &[
                format!("OPTIONAL MATCH {}", from),
                format!("OPTIONAL MATCH {}", to),
                "WITH row, a, b".to_string(),
                "WHERE a IS NULL OR b IS NULL".to_string(),
                "RETURN row.from, row.to, a IS NULL, b IS NULL".to_string(),
            ],
            &PROBE_COLUMNS,
        ))
    }
}

/// An unresolved edge endpoint reported by the probe statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedEdge {
    pub from: PropertyValue,
    pub to: PropertyValue,
    pub from_missing: bool,
    pub to_missing: bool,
}

impl UnresolvedEdge {
    /// Decode one probe row.
    pub fn from_row(row: &[Value]) -> Option<Self> {
        let flag = |v: &Value| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        match row {
            [from, to, from_missing, to_missing] => Some(Self {
                from: PropertyValue::from(from.clone()),
                to: PropertyValue::from(to.clone()),
                from_missing: flag(from_missing)?,
                to_missing: flag(to_missing)?,
            }),
            _ => None,
        }
    }

    /// Human-readable description naming the unresolved endpoint(s).
    pub fn describe(&self) -> String {
        match (self.from_missing, self.to_missing) {
            (true, true) => format!(
                "endpoints `{}` and `{}` do not resolve to vertices",
                self.from, self.to
            ),
            (true, false) => format!("`from` endpoint `{}` does not resolve to a vertex", self.from),
            _ => format!("`to` endpoint `{}` does not resolve to a vertex", self.to),
        }
    }
}
