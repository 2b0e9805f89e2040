//! Graph data model.
//!
//! [`GraphData`] is the input of a load: vertex records and edge records,
//! grouped by type. Type order is load order, and deserialization preserves the
//! order in which types appear in the document:
//!
//! ```json
//! {
//!   "vertices": { "Person": [{"id": "p1", "name": "Alice"}] },
//!   "edges":    { "KNOWS":  [{"from": "p1", "to": "p2", "since": 2020}] }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::GraftError;
use crate::value::PropertyValue;

/// Properties of one record, keyed by property name.
pub type PropertyRecord = BTreeMap<String, PropertyValue>;

/// One edge: endpoint identifiers plus properties.
///
/// In JSON the properties sit next to `from` and `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Identifier of the start vertex.
    pub from: PropertyValue,

    /// Identifier of the end vertex.
    pub to: PropertyValue,

    #[serde(flatten)]
    pub properties: PropertyRecord,
}

impl EdgeRecord {
    pub fn new(from: impl Into<PropertyValue>, to: impl Into<PropertyValue>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            properties: PropertyRecord::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// TypeMap
// ============================================================================

/// Records of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecords<R> {
    pub type_name: String,
    pub records: Vec<R>,
}

/// Records grouped by type, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMap<R>(Vec<TypedRecords<R>>);

impl<R> Default for TypeMap<R> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<R> TypeMap<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to a type, adding the type at the end if it is new.
    pub fn extend(&mut self, type_name: impl Into<String>, records: impl IntoIterator<Item = R>) {
        let type_name = type_name.into();
        match self.0.iter_mut().find(|set| set.type_name == type_name) {
            Some(set) => set.records.extend(records),
            None => self.0.push(TypedRecords {
                type_name,
                records: records.into_iter().collect(),
            }),
        }
    }

    /// Records of `type_name`, if the type is present.
    pub fn get(&self, type_name: &str) -> Option<&[R]> {
        self.0
            .iter()
            .find(|set| set.type_name == type_name)
            .map(|set| set.records.as_slice())
    }

    /// Type names in load order.
    pub fn type_names(&self) -> Vec<String> {
        self.0.iter().map(|set| set.type_name.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypedRecords<R>> {
        self.0.iter()
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total records across all types.
    pub fn record_count(&self) -> usize {
        self.0.iter().map(|set| set.records.len()).sum()
    }
}

impl<'a, R> IntoIterator for &'a TypeMap<R> {
    type Item = &'a TypedRecords<R>;
    type IntoIter = std::slice::Iter<'a, TypedRecords<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<R: Serialize> Serialize for TypeMap<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for set in &self.0 {
            map.serialize_entry(&set.type_name, &set.records)?;
        }
        map.end()
    }
}

struct TypeMapVisitor<R>(PhantomData<R>);

impl<'de, R: Deserialize<'de>> Visitor<'de> for TypeMapVisitor<R> {
    type Value = TypeMap<R>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of type name to a list of records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut sets: Vec<TypedRecords<R>> = Vec::new();
        let mut seen = HashSet::new();
        while let Some((type_name, records)) = access.next_entry::<String, Vec<R>>()? {
            if !seen.insert(type_name.clone()) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate type `{}`",
                    type_name
                )));
            }
            sets.push(TypedRecords { type_name, records });
        }
        Ok(TypeMap(sets))
    }
}

impl<'de, R: Deserialize<'de>> Deserialize<'de> for TypeMap<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TypeMapVisitor(PhantomData))
    }
}

// ============================================================================
// GraphData
// ============================================================================

/// Input of a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphData {
    #[serde(default)]
    pub vertices: TypeMap<PropertyRecord>,

    #[serde(default)]
    pub edges: TypeMap<EdgeRecord>,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add vertex records of a type.
    pub fn with_vertices(
        mut self,
        type_name: impl Into<String>,
        records: impl IntoIterator<Item = PropertyRecord>,
    ) -> Self {
        self.vertices.extend(type_name, records);
        self
    }

    /// Add edge records of a type.
    pub fn with_edges(
        mut self,
        type_name: impl Into<String>,
        records: impl IntoIterator<Item = EdgeRecord>,
    ) -> Self {
        self.edges.extend(type_name, records);
        self
    }

    /// Parse from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, GraftError> {
        serde_json::from_value(value).map_err(|e| GraftError::InvalidGraphData(e.to_string()))
    }

    /// Parse from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, GraftError> {
        serde_json::from_str(content).map_err(|e| GraftError::InvalidGraphData(e.to_string()))
    }

    /// Read a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self, GraftError> {
        let content = fs::read_to_string(path).map_err(|e| {
            GraftError::InvalidGraphData(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| {
            GraftError::InvalidGraphData(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Total vertex records.
    pub fn vertex_record_count(&self) -> usize {
        self.vertices.record_count()
    }

    /// Total edge records.
    pub fn edge_record_count(&self) -> usize {
        self.edges.record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_record_count() == 0 && self.edge_record_count() == 0
    }
}

/// Build a [`PropertyRecord`] from a JSON object.
///
/// Non-object values yield an empty record.
pub fn record_from_json(value: Value) -> PropertyRecord {
    match PropertyValue::from(value) {
        PropertyValue::Map(map) => map,
        _ => PropertyRecord::new(),
    }
}
