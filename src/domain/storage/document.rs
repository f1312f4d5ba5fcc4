//! Documents, identities, queries and patches exchanged with the store

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stored representation of a record
pub type Document = Map<String, Value>;

/// Field holding the identity inside a stored document
pub const ID_FIELD: &str = "_id";

/// Identity of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identity for an insert
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns true when an expression looks like an identity rather than a key value
    pub fn is_identity_expression(expression: &str) -> bool {
        Uuid::parse_str(expression)
            .map(|uuid| uuid.hyphenated().to_string() == expression)
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the identity out of a stored document
    pub fn from_document(document: &Document) -> Option<Self> {
        match document.get(ID_FIELD) {
            Some(Value::String(id)) => Some(Self(id.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::String(id.0)
    }
}

impl From<&RecordId> for Value {
    fn from(id: &RecordId) -> Self {
        Value::String(id.0.clone())
    }
}

/// Conjunction of field equality predicates.
///
/// A predicate on a field the document does not carry matches `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    predicates: BTreeMap<String, Value>,
}

impl Query {
    /// Empty query matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Query selecting a single identity
    pub fn by_id(id: &RecordId) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// Adds an equality predicate
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.predicates.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.predicates.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.predicates.iter()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.predicates
            .iter()
            .all(|(field, expected)| document.get(field).unwrap_or(&Value::Null) == expected)
    }

    /// Predicates as a document, used for containment queries
    pub fn to_document(&self) -> Document {
        self.predicates
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Set of field assignments applied by bulk updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    assignments: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignments(&self) -> &Document {
        &self.assignments
    }

    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.assignments {
            document.insert(field.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_identity_expression_detection() {
        let id = RecordId::generate();
        assert!(RecordId::is_identity_expression(id.as_str()));
        assert!(!RecordId::is_identity_expression("Dylan"));
        assert!(!RecordId::is_identity_expression(""));
    }

    #[test]
    fn test_query_matches_equal_fields() {
        let query = Query::new().eq("name", "mi1").eq("master_id", "m1");
        assert!(query.matches(&doc(json!({"name": "mi1", "master_id": "m1", "x": 1}))));
        assert!(!query.matches(&doc(json!({"name": "mi1", "master_id": "m2"}))));
    }

    #[test]
    fn test_missing_field_matches_null() {
        let query = Query::new().eq("master_id", Value::Null);
        assert!(query.matches(&doc(json!({"name": "mi1"}))));
        assert!(!query.matches(&doc(json!({"master_id": "m1"}))));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(Query::new().matches(&doc(json!({"a": 1}))));
    }

    #[test]
    fn test_patch_apply() {
        let mut document = doc(json!({"name": "mi1", "master_id": "m1"}));
        Patch::new().set("master_id", Value::Null).apply(&mut document);
        assert_eq!(document.get("master_id"), Some(&Value::Null));
        assert_eq!(document.get("name"), Some(&json!("mi1")));
    }

    #[test]
    fn test_record_id_from_document() {
        let document = doc(json!({"_id": "abc"}));
        assert_eq!(RecordId::from_document(&document), Some(RecordId::new("abc")));
        assert_eq!(RecordId::from_document(&Document::new()), None);
    }
}
