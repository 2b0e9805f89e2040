//! Schema collaborator.
//!
//! The loader consults a [`SchemaValidator`] for two things: accepting or
//! rejecting records before a load, and metadata for statement generation
//! (declared property names, edge endpoint types).
//!
//! [`GraphSchema`] is the built-in implementation, declared in JSON or YAML:
//!
//! ```yaml
//! vertices:
//!   Person:
//!     properties:
//!       id:   { type: string, required: true }
//!       age:  { type: integer }
//!     additionalProperties: false
//! edges:
//!   KNOWS:
//!     from: Person
//!     to: Person
//!     properties:
//!       since: { type: integer }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::GraftError;
use crate::graph::{EdgeRecord, PropertyRecord};
use crate::value::PropertyValue;

/// One reason a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Property (or `from`/`to`) the violation concerns; empty for the record
    /// as a whole.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Declared endpoint vertex types of an edge type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeEndpoints {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Property names a vertex or edge type declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredProperties {
    pub names: Vec<String>,
    /// Whether records may carry properties beyond `names`.
    pub open: bool,
}

/// Accepts or rejects records and exposes declared metadata.
///
/// An empty violation list means the record is valid.
pub trait SchemaValidator: Send + Sync {
    fn validate_vertex(&self, type_name: &str, record: &PropertyRecord) -> Vec<Violation>;

    fn validate_edge(&self, type_name: &str, record: &EdgeRecord) -> Vec<Violation>;

    /// Declared properties of a vertex type, `None` when undeclared.
    fn vertex_properties(&self, type_name: &str) -> Option<DeclaredProperties>;

    /// Declared properties of an edge type, `None` when undeclared.
    fn edge_properties(&self, type_name: &str) -> Option<DeclaredProperties>;

    /// Declared endpoint types of an edge type.
    fn edge_endpoints(&self, type_name: &str) -> EdgeEndpoints;
}

// ============================================================================
// GraphSchema
// ============================================================================

/// Kind of value a property accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    /// Integers or floats.
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl PropertyType {
    fn accepts(self, value: &PropertyValue) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::String, PropertyValue::String(_)) => true,
            (Self::Integer, PropertyValue::Int(_)) => true,
            (Self::Number, PropertyValue::Int(_) | PropertyValue::Float(_)) => true,
            (Self::Boolean, PropertyValue::Bool(_)) => true,
            (Self::Array, PropertyValue::Array(_)) => true,
            (Self::Object, PropertyValue::Map(_)) => true,
            _ => false,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// Declaration of one property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDecl {
    #[serde(default, rename = "type")]
    pub kind: PropertyType,

    /// Must be present and non-null.
    #[serde(default)]
    pub required: bool,
}

/// Declaration of a vertex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexTypeDecl {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDecl>,

    /// Whether undeclared properties are accepted.
    #[serde(default = "default_true")]
    pub additional_properties: bool,
}

/// Declaration of an edge type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeTypeDecl {
    /// Vertex type of the start endpoint.
    #[serde(default)]
    pub from: Option<String>,

    /// Vertex type of the end endpoint.
    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDecl>,

    #[serde(default = "default_true")]
    pub additional_properties: bool,
}

fn default_true() -> bool {
    true
}

/// Declarative schema for vertex and edge types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSchema {
    #[serde(default)]
    pub vertices: BTreeMap<String, VertexTypeDecl>,

    #[serde(default)]
    pub edges: BTreeMap<String, EdgeTypeDecl>,
}

impl GraphSchema {
    /// Read a `.json`, `.yaml` or `.yml` schema file.
    pub fn from_path(path: &Path) -> Result<Self, GraftError> {
        let content = fs::read_to_string(path).map_err(|e| {
            GraftError::InvalidConfig(format!("Failed to read schema {}: {}", path.display(), e))
        })?;

        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| {
            GraftError::InvalidConfig(format!("Failed to parse schema {}: {}", path.display(), e))
        })
    }

    /// Check that every edge endpoint type names a declared vertex type.
    pub fn validate(&self) -> Result<(), GraftError> {
        for (edge_type, decl) in &self.edges {
            for endpoint in [&decl.from, &decl.to].into_iter().flatten() {
                if !self.vertices.contains_key(endpoint) {
                    return Err(GraftError::InvalidConfig(format!(
                        "edge type `{}` references undeclared vertex type `{}`",
                        edge_type, endpoint
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_properties(
    declared: &BTreeMap<String, PropertyDecl>,
    additional: bool,
    record: &PropertyRecord,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (name, decl) in declared {
        match record.get(name).filter(|v| !v.is_null()) {
            None if decl.required => {
                violations.push(Violation::new(name, "required property is missing"));
            }
            None => {}
            Some(value) if !decl.kind.accepts(value) => violations.push(Violation::new(
                name,
                format!("expected {}, found {}", decl.kind.name(), value.kind()),
            )),
            Some(_) => {}
        }
    }

    if !additional {
        for name in record.keys().filter(|k| !declared.contains_key(*k)) {
            violations.push(Violation::new(name, "property is not declared"));
        }
    }

    violations
}

impl SchemaValidator for GraphSchema {
    fn validate_vertex(&self, type_name: &str, record: &PropertyRecord) -> Vec<Violation> {
        match self.vertices.get(type_name) {
            Some(decl) => check_properties(&decl.properties, decl.additional_properties, record),
            None => vec![Violation::new(
                "",
                format!("vertex type `{}` is not declared", type_name),
            )],
        }
    }

    fn validate_edge(&self, type_name: &str, record: &EdgeRecord) -> Vec<Violation> {
        let Some(decl) = self.edges.get(type_name) else {
            return vec![Violation::new(
                "",
                format!("edge type `{}` is not declared", type_name),
            )];
        };

        let mut violations = Vec::new();
        if record.from.is_null() {
            violations.push(Violation::new("from", "endpoint identifier is missing"));
        }
        if record.to.is_null() {
            violations.push(Violation::new("to", "endpoint identifier is missing"));
        }
        violations.extend(check_properties(
            &decl.properties,
            decl.additional_properties,
            &record.properties,
        ));
        violations
    }

    fn vertex_properties(&self, type_name: &str) -> Option<DeclaredProperties> {
        self.vertices.get(type_name).map(|decl| DeclaredProperties {
            names: decl.properties.keys().cloned().collect(),
            open: decl.additional_properties,
        })
    }

    fn edge_properties(&self, type_name: &str) -> Option<DeclaredProperties> {
        self.edges.get(type_name).map(|decl| DeclaredProperties {
            names: decl.properties.keys().cloned().collect(),
            open: decl.additional_properties,
        })
    }

    fn edge_endpoints(&self, type_name: &str) -> EdgeEndpoints {
        self.edges
            .get(type_name)
            .map(|decl| EdgeEndpoints {
                from: decl.from.clone(),
                to: decl.to.clone(),
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::record_from_json;
    use serde_json::json;

    fn schema() -> GraphSchema {
        serde_yaml::from_str(
            r#"
vertices:
  Person:
    properties:
      id: { type: string, required: true }
      age: { type: integer }
      score: { type: number }
    additionalProperties: false
edges:
  KNOWS:
    from: Person
    to: Person
    properties:
      since: { type: integer }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_vertex() {
        let record = record_from_json(json!({"id": "p1", "age": 30, "score": 1}));
        assert!(schema().validate_vertex("Person", &record).is_empty());
    }

    #[test]
    fn test_vertex_violations() {
        let record = record_from_json(json!({"age": "thirty", "nickname": "Al"}));
        let violations = schema().validate_vertex("Person", &record);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["age", "id", "nickname"]);
        assert_eq!(violations[0].message, "expected integer, found string");
    }

    #[test]
    fn test_null_required_is_missing() {
        let record = record_from_json(json!({"id": null}));
        let violations = schema().validate_vertex("Person", &record);
        assert_eq!(violations, vec![Violation::new("id", "required property is missing")]);
    }

    #[test]
    fn test_undeclared_type() {
        let violations = schema().validate_vertex("Robot", &PropertyRecord::new());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("`Robot`"));
    }

    #[test]
    fn test_edge_validation_and_metadata() {
        let schema = schema();
        let edge = EdgeRecord::new("p1", PropertyValue::Null).with_property("since", "long ago");
        let violations = schema.validate_edge("KNOWS", &edge);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].path, "to");

        let endpoints = schema.edge_endpoints("KNOWS");
        assert_eq!(endpoints.from.as_deref(), Some("Person"));
        assert_eq!(schema.edge_endpoints("LIKES"), EdgeEndpoints::default());
        assert_eq!(
            schema.edge_properties("KNOWS"),
            Some(DeclaredProperties {
                names: vec!["since".to_string()],
                open: true,
            })
        );
        assert_eq!(schema.vertex_properties("Person").map(|d| d.open), Some(false));
        assert_eq!(schema.vertex_properties("Robot"), None);
    }

    #[test]
    fn test_schema_rejects_dangling_endpoint_type() {
        let mut schema = schema();
        schema.edges.get_mut("KNOWS").unwrap().to = Some("Company".to_string());
        assert!(schema.validate().is_err());
    }
}
