//! Cache key derivation
//!
//! Keys are plain strings shared with every process that participates in the
//! invalidation scheme, so their layout must not change:
//!
//! - entity lookups: `{collection}.{value}`
//! - memoized methods: `{collection}.{id}.{method}`

use std::fmt;

use serde_json::Value;

/// Deterministic string identifying one cached logical value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a record looked up by one of its cache-key field values
    pub fn entity(collection: &str, value: &str) -> Self {
        Self(format!("{}.{}", collection, value))
    }

    /// Key for a memoized method result of one record
    pub fn method(collection: &str, id: &str, method: &str) -> Self {
        Self(format!("{}.{}.{}", collection, id, method))
    }

    /// Key for an entity lookup given a raw field value, `None` for null values
    pub fn for_field_value(collection: &str, value: &Value) -> Option<Self> {
        key_component(value).map(|component| Self::entity(collection, &component))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Renders a field value the way it appears inside a cache key.
///
/// Strings are used verbatim (no JSON quoting); null has no key.
pub fn key_component(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_key_layout() {
        let key = CacheKey::entity("user", "Dylan");
        assert_eq!(key.as_str(), "user.Dylan");
    }

    #[test]
    fn test_method_key_layout() {
        let key = CacheKey::method("user", "42", "full_name");
        assert_eq!(key.to_string(), "user.42.full_name");
    }

    #[test]
    fn test_string_values_are_not_quoted() {
        let key = CacheKey::for_field_value("user", &json!("Dylan")).unwrap();
        assert_eq!(key.as_str(), "user.Dylan");
    }

    #[test]
    fn test_numeric_values() {
        let key = CacheKey::for_field_value("counter", &json!(17)).unwrap();
        assert_eq!(key.as_str(), "counter.17");
    }

    #[test]
    fn test_null_has_no_key() {
        assert!(CacheKey::for_field_value("user", &Value::Null).is_none());
    }

    #[test]
    fn test_same_entity_same_key() {
        let a = CacheKey::for_field_value("user", &json!("Dylan")).unwrap();
        let b = CacheKey::entity("user", "Dylan");
        assert_eq!(a, b);
    }
}
