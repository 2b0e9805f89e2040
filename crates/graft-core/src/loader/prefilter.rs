//! Pre-load validation.
//!
//! Runs before any transaction is opened. Without `continue_on_error` the first
//! invalid record stops the load; with it, invalid records are dropped with a
//! warning, and so are edges whose endpoint belongs to a dropped vertex.

use std::borrow::Cow;
use std::collections::HashSet;

use tracing::debug;

use crate::errors::GraftError;
use crate::graph::{EdgeRecord, GraphData, PropertyRecord};
use crate::schema::{SchemaValidator, Violation};
use crate::statements::is_label;
use crate::value::PropertyValue;

/// Data that survived validation.
#[derive(Debug)]
pub(crate) struct Prefiltered<'a> {
    pub data: Cow<'a, GraphData>,
    pub warnings: Vec<String>,
    pub skipped: usize,
    pub checked: usize,
}

pub(crate) struct Prefilter<'a> {
    pub schema: Option<&'a dyn SchemaValidator>,
    pub id_property: &'a str,
    pub validate: bool,
    pub continue_on_error: bool,
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn label_violation(type_name: &str) -> Vec<Violation> {
    vec![Violation::new(
        "",
        format!("type name `{}` is not a valid label", type_name),
    )]
}

/// Identifier key of a skipped vertex; JSON text so that `1` and `"1"` differ.
fn id_key(value: &PropertyValue) -> String {
    value.to_json().to_string()
}

impl Prefilter<'_> {
    fn schema_checks(&self) -> Option<&dyn SchemaValidator> {
        if self.validate {
            self.schema
        } else {
            None
        }
    }

    fn vertex_violations(&self, type_name: &str, record: &PropertyRecord) -> Vec<Violation> {
        if !is_label(type_name) {
            return label_violation(type_name);
        }
        self.schema_checks()
            .map(|s| s.validate_vertex(type_name, record))
            .unwrap_or_default()
    }

    fn edge_violations(&self, type_name: &str, record: &EdgeRecord) -> Vec<Violation> {
        if !is_label(type_name) {
            return label_violation(type_name);
        }
        self.schema_checks()
            .map(|s| s.validate_edge(type_name, record))
            .unwrap_or_default()
    }

    /// Validate `data`.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraftError::Validation`] when `continue_on_error`
    /// is off.
    pub fn run<'d>(&self, data: &'d GraphData) -> Result<Prefiltered<'d>, GraftError> {
        let mut warnings = Vec::new();
        let mut checked = 0;
        let mut skipped_by_type: HashSet<(String, String)> = HashSet::new();
        let mut skipped_ids: HashSet<String> = HashSet::new();

        let mut vertices = Vec::with_capacity(data.vertices.len());
        for set in &data.vertices {
            let mut kept = Vec::with_capacity(set.records.len());
            for (index, record) in set.records.iter().enumerate() {
                checked += 1;
                let violations = self.vertex_violations(&set.type_name, record);
                if violations.is_empty() {
                    kept.push(index);
                    continue;
                }

                let message = join(&violations);
                if !self.continue_on_error {
                    return Err(GraftError::Validation {
                        type_name: set.type_name.clone(),
                        index,
                        message,
                    });
                }
                warnings.push(format!(
                    "skipped `{}` record {}: {}",
                    set.type_name, index, message
                ));
                if let Some(id) = record.get(self.id_property).filter(|v| !v.is_null()) {
                    skipped_by_type.insert((set.type_name.clone(), id_key(id)));
                    skipped_ids.insert(id_key(id));
                }
            }
            vertices.push(kept);
        }

        let is_skipped = |label: Option<&str>, id: &PropertyValue| -> bool {
            let key = id_key(id);
            match label {
                Some(label) => skipped_by_type.contains(&(label.to_string(), key)),
                None => skipped_ids.contains(&key),
            }
        };

        let mut edges = Vec::with_capacity(data.edges.len());
        for set in &data.edges {
            let endpoints = self
                .schema
                .map(|s| s.edge_endpoints(&set.type_name))
                .unwrap_or_default();
            let mut kept = Vec::with_capacity(set.records.len());
            for (index, record) in set.records.iter().enumerate() {
                checked += 1;
                let violations = self.edge_violations(&set.type_name, record);
                if !violations.is_empty() {
                    let message = join(&violations);
                    if !self.continue_on_error {
                        return Err(GraftError::Validation {
                            type_name: set.type_name.clone(),
                            index,
                            message,
                        });
                    }
                    warnings.push(format!(
                        "skipped `{}` record {}: {}",
                        set.type_name, index, message
                    ));
                    continue;
                }

                let dangling = [
                    (endpoints.from.as_deref(), &record.from),
                    (endpoints.to.as_deref(), &record.to),
                ]
                .into_iter()
                .find(|(label, id)| is_skipped(*label, id));
                match dangling {
                    Some((_, id)) => warnings.push(format!(
                        "skipped `{}` record {}: endpoint `{}` belongs to a skipped vertex",
                        set.type_name, index, id
                    )),
                    None => kept.push(index),
                }
            }
            edges.push(kept);
        }

        let skipped = checked
            - vertices.iter().map(Vec::len).sum::<usize>()
            - edges.iter().map(Vec::len).sum::<usize>();
        debug!(checked, skipped, "Validation finished");

        if skipped == 0 {
            return Ok(Prefiltered {
                data: Cow::Borrowed(data),
                warnings,
                skipped,
                checked,
            });
        }

        let mut filtered = GraphData::new();
        for (set, kept) in data.vertices.iter().zip(vertices) {
            filtered
                .vertices
                .extend(set.type_name.clone(), kept.into_iter().map(|i| set.records[i].clone()));
        }
        for (set, kept) in data.edges.iter().zip(edges) {
            filtered
                .edges
                .extend(set.type_name.clone(), kept.into_iter().map(|i| set.records[i].clone()));
        }

        Ok(Prefiltered {
            data: Cow::Owned(filtered),
            warnings,
            skipped,
            checked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::record_from_json;
    use crate::schema::GraphSchema;
    use serde_json::json;

    fn schema() -> GraphSchema {
        serde_json::from_value(json!({
            "vertices": {
                "Person": {"properties": {"id": {"type": "string", "required": true}}}
            },
            "edges": {
                "KNOWS": {"from": "Person", "to": "Person"}
            }
        }))
        .unwrap()
    }

    fn data() -> GraphData {
        GraphData::new()
            .with_vertices(
                "Person",
                vec![
                    record_from_json(json!({"id": "p1"})),
                    record_from_json(json!({"id": 2})),
                    record_from_json(json!({"id": "p3"})),
                ],
            )
            .with_edges(
                "KNOWS",
                vec![EdgeRecord::new("p1", "p3"), EdgeRecord::new("p1", 2i64)],
            )
    }

    fn prefilter(schema: &GraphSchema, continue_on_error: bool) -> Prefilter<'_> {
        Prefilter {
            schema: Some(schema),
            id_property: "id",
            validate: true,
            continue_on_error,
        }
    }

    #[test]
    fn test_first_invalid_record_stops() {
        let schema = schema();
        let err = prefilter(&schema, false).run(&data()).unwrap_err();
        match err {
            GraftError::Validation { type_name, index, message } => {
                assert_eq!(type_name, "Person");
                assert_eq!(index, 1);
                assert!(message.contains("expected string"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_continue_skips_record_and_dependent_edges() {
        let schema = schema();
        let data = data();
        let out = prefilter(&schema, true).run(&data).unwrap();

        assert_eq!(out.checked, 5);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings[1].contains("skipped vertex"));
        assert_eq!(out.data.vertices.get("Person").unwrap().len(), 2);
        assert_eq!(
            out.data.edges.get("KNOWS").unwrap(),
            &[EdgeRecord::new("p1", "p3")]
        );
    }

    #[test]
    fn test_clean_data_is_borrowed() {
        let schema = schema();
        let data = GraphData::new().with_vertices("Person", vec![record_from_json(json!({"id": "p1"}))]);
        let out = prefilter(&schema, false).run(&data).unwrap();
        assert!(matches!(out.data, Cow::Borrowed(_)));
        assert_eq!(out.skipped, 0);
    }

    #[test]
    fn test_bad_label_rejected_without_schema() {
        let data = GraphData::new().with_vertices("Bad Label", vec![PropertyRecord::new()]);
        let filter = Prefilter {
            schema: None,
            id_property: "id",
            validate: false,
            continue_on_error: false,
        };
        assert!(matches!(filter.run(&data), Err(GraftError::Validation { .. })));
    }
}
