//! Per-type model schemas
//!
//! A `ModelSchema` is the explicit, immutable description of one model type:
//! its collection, fields, cache-key fields, memoized methods, indexes and
//! position in a type hierarchy. Everything downstream (validation, cache
//! key derivation, reference registration, index derivation) reads from it.

use std::collections::BTreeSet;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::domain::DomainError;
use crate::domain::storage::ID_FIELD;

use super::field::FieldDescriptor;
use super::index::{Index, IndexOptions, IndexSpec};
use super::reference::OnDestroy;

/// Name of the identity pseudo-field on records
pub const ID: &str = "id";

/// Stored discriminator field of submodel families
pub const SUBMODEL_FIELD: &str = "submodel";

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Converts a type name to its default collection name.
///
/// Every ASCII uppercase letter after the first character is prefixed with
/// an underscore; all uppercase letters are lowercased.
pub fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i != 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Current time in the format stored by datetime fields
pub fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    collection: String,
    explicit_collection: Option<String>,
    key_field: String,
    cache_key_fields: BTreeSet<String>,
    fields: Vec<FieldDescriptor>,
    cached_methods: BTreeSet<String>,
    compound_indexes: Vec<Index>,
    abstract_type: bool,
    submodel_family: Option<String>,
    submodel: Option<String>,
    timestamped: bool,
    ancestors: Vec<String>,
}

impl ModelSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Stored field queried when looking a record up by its key
    pub fn key_query_field(&self) -> &str {
        match self.key_field.as_str() {
            ID | ID_FIELD => ID_FIELD,
            other => other,
        }
    }

    /// Fields whose values address entity cache entries, `id` included
    pub fn cache_key_fields(&self) -> impl Iterator<Item = &str> {
        self.cache_key_fields.iter().map(String::as_str)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn cached_methods(&self) -> impl Iterator<Item = &str> {
        self.cached_methods.iter().map(String::as_str)
    }

    pub fn has_cached_method(&self, method: &str) -> bool {
        self.cached_methods.contains(method)
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_type
    }

    /// Name of the submodel family base this schema belongs to
    pub fn submodel_family(&self) -> Option<&str> {
        self.submodel_family.as_deref()
    }

    /// Discriminator stored by records of this concrete submodel
    pub fn submodel(&self) -> Option<&str> {
        self.submodel.as_deref()
    }

    pub fn is_timestamped(&self) -> bool {
        self.timestamped
    }

    /// Parent type names, nearest first
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Reference fields as `(field, referenced type, destroy policy)`
    pub fn reference_fields(&self) -> impl Iterator<Item = (&str, &str, OnDestroy)> {
        self.fields.iter().filter_map(|field| {
            let policy = field.destroy_policy()?;
            let target = field.reference_target(&self.name)?;
            Some((field.name(), target, policy))
        })
    }

    /// Indexes to create for this type: key field, per-field, then compound
    pub fn indexes(&self) -> Vec<Index> {
        let mut indexes = Vec::new();

        if self.key_field != ID && self.key_field != ID_FIELD {
            indexes.push(Index::single(
                self.key_field.clone(),
                IndexSpec::ascending(),
                IndexOptions::unique(),
            ));
        }

        for field in &self.fields {
            if let Some(spec) = field.index_spec() {
                indexes.push(Index::single(
                    field.name(),
                    *spec,
                    field.index_options().clone(),
                ));
            }
        }

        indexes.extend(self.compound_indexes.iter().cloned());
        indexes
    }
}

/// Builder assembling a `ModelSchema` once at type-registration time
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    key_field: Option<String>,
    cache_key_fields: Vec<String>,
    fields: Vec<FieldDescriptor>,
    cached_methods: Vec<String>,
    indexes: Vec<Index>,
    abstract_type: bool,
    submodel_family: bool,
    submodel: Option<String>,
    timestamped: bool,
    parent: Option<ModelSchema>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            key_field: None,
            cache_key_fields: Vec::new(),
            fields: Vec::new(),
            cached_methods: Vec::new(),
            indexes: Vec::new(),
            abstract_type: false,
            submodel_family: false,
            submodel: None,
            timestamped: false,
            parent: None,
        }
    }

    /// Overrides the collection name; inherited by subtypes
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Declares an additional field usable as a cache lookup key
    pub fn cache_key_field(mut self, field: impl Into<String>) -> Self {
        self.cache_key_fields.push(field.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a memoized zero-argument method
    pub fn cached_method(mut self, method: impl Into<String>) -> Self {
        self.cached_methods.push(method.into());
        self
    }

    /// Adds a compound index
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Abstract types register no references of their own
    pub fn abstract_type(mut self) -> Self {
        self.abstract_type = true;
        self
    }

    /// Marks this type as the base of a submodel family
    pub fn submodel_family(mut self) -> Self {
        self.submodel_family = true;
        self
    }

    /// Sets the discriminator of a concrete submodel
    pub fn submodel(mut self, discriminator: impl Into<String>) -> Self {
        self.submodel = Some(discriminator.into());
        self
    }

    /// Adds `created_at` / `updated_at` maintained on save
    pub fn timestamped(mut self) -> Self {
        self.timestamped = true;
        self
    }

    pub fn extends(mut self, parent: &ModelSchema) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn build(self) -> Result<ModelSchema, DomainError> {
        let parent = self.parent.as_ref();

        let mut fields: Vec<FieldDescriptor> =
            parent.map(|p| p.fields.clone()).unwrap_or_default();
        let mut declared = Vec::new();

        let submodel_family = if self.submodel_family {
            declared.push(FieldDescriptor::string(SUBMODEL_FIELD).required());
            Some(self.name.clone())
        } else {
            parent.and_then(|p| p.submodel_family.clone())
        };

        let timestamped = self.timestamped || parent.is_some_and(|p| p.timestamped);
        if self.timestamped {
            for name in [CREATED_AT, UPDATED_AT] {
                declared.push(
                    FieldDescriptor::datetime(name)
                        .required()
                        .rejected()
                        .default_with(now_timestamp),
                );
            }
        }

        declared.extend(self.fields);

        for field in declared {
            if field.name() == ID || field.name() == ID_FIELD {
                return Err(DomainError::configuration(format!(
                    "{} declares reserved field {}",
                    self.name,
                    field.name()
                )));
            }
            field.check_declaration()?;

            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(existing) => *existing = field,
                None => fields.push(field),
            }
        }

        let key_field = self
            .key_field
            .or_else(|| parent.map(|p| p.key_field.clone()))
            .unwrap_or_else(|| ID.to_string());

        if key_field != ID && key_field != ID_FIELD && !fields.iter().any(|f| f.name() == key_field)
        {
            return Err(DomainError::configuration(format!(
                "Key field {} is not declared on {}",
                key_field, self.name
            )));
        }

        let mut cache_key_fields: BTreeSet<String> = parent
            .map(|p| p.cache_key_fields.clone())
            .unwrap_or_default();
        cache_key_fields.insert(ID.to_string());
        // cache keys operate on record fields, not stored field names
        cache_key_fields.insert(if key_field == ID_FIELD {
            ID.to_string()
        } else {
            key_field.clone()
        });
        cache_key_fields.extend(self.cache_key_fields);

        let mut cached_methods: BTreeSet<String> = parent
            .map(|p| p.cached_methods.clone())
            .unwrap_or_default();
        cached_methods.extend(self.cached_methods);

        let mut compound_indexes: Vec<Index> = parent
            .map(|p| p.compound_indexes.clone())
            .unwrap_or_default();
        compound_indexes.extend(self.indexes);

        let submodel = self
            .submodel
            .or_else(|| parent.and_then(|p| p.submodel.clone()));
        if submodel.is_some() && submodel_family.is_none() {
            return Err(DomainError::configuration(format!(
                "{} declares a submodel but extends no submodel family",
                self.name
            )));
        }

        let explicit_collection = self
            .collection
            .or_else(|| parent.and_then(|p| p.explicit_collection.clone()));
        let collection = explicit_collection
            .clone()
            .unwrap_or_else(|| snake_case(&self.name));

        let ancestors = match parent {
            Some(p) => std::iter::once(p.name.clone())
                .chain(p.ancestors.iter().cloned())
                .collect(),
            None => Vec::new(),
        };

        Ok(ModelSchema {
            name: self.name,
            collection,
            explicit_collection,
            key_field,
            cache_key_fields,
            fields,
            cached_methods,
            compound_indexes,
            abstract_type: self.abstract_type,
            submodel_family,
            submodel,
            timestamped,
            ancestors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::index::{IndexDirection, IndexKey};

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("User"), "user");
        assert_eq!(snake_case("TestModel"), "test_model");
        assert_eq!(snake_case("HTTPLog"), "h_t_t_p_log");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_default_collection_and_key() {
        let schema = SchemaBuilder::new("TestModel").build().unwrap();
        assert_eq!(schema.collection(), "test_model");
        assert_eq!(schema.key_field(), "id");
        assert_eq!(schema.key_query_field(), "_id");
        assert_eq!(schema.cache_key_fields().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_cache_key_fields_along_hierarchy() {
        let base = SchemaBuilder::new("Account")
            .field(FieldDescriptor::string("email"))
            .field(FieldDescriptor::string("login"))
            .cache_key_field("email")
            .build()
            .unwrap();
        let child = SchemaBuilder::new("Admin")
            .extends(&base)
            .key_field("login")
            .build()
            .unwrap();

        assert_eq!(
            child.cache_key_fields().collect::<Vec<_>>(),
            vec!["email", "id", "login"]
        );
    }

    #[test]
    fn test_underscore_id_key_field_is_renamed() {
        let schema = SchemaBuilder::new("Token")
            .key_field("_id")
            .build()
            .unwrap();
        assert_eq!(schema.cache_key_fields().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_undeclared_key_field_is_rejected() {
        let result = SchemaBuilder::new("User").key_field("last_name").build();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_explicit_collection_is_inherited() {
        let base = SchemaBuilder::new("Shape")
            .collection("shapes")
            .submodel_family()
            .build()
            .unwrap();
        let circle = SchemaBuilder::new("Circle")
            .extends(&base)
            .submodel("circle")
            .build()
            .unwrap();

        assert_eq!(circle.collection(), "shapes");
        assert_eq!(circle.submodel_family(), Some("Shape"));
        assert_eq!(circle.submodel(), Some("circle"));
        assert_eq!(circle.ancestors(), &["Shape".to_string()]);
        assert!(circle.field(SUBMODEL_FIELD).unwrap().is_required());
    }

    #[test]
    fn test_submodel_without_family_is_rejected() {
        let result = SchemaBuilder::new("Circle").submodel("circle").build();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_child_fields_override_parent_fields() {
        let base = SchemaBuilder::new("Base")
            .field(FieldDescriptor::string("name"))
            .build()
            .unwrap();
        let child = SchemaBuilder::new("Child")
            .extends(&base)
            .field(FieldDescriptor::string("name").required())
            .field(FieldDescriptor::int("age"))
            .build()
            .unwrap();

        assert_eq!(child.fields().len(), 2);
        assert!(child.field("name").unwrap().is_required());
        assert_eq!(child.collection(), "child");
    }

    #[test]
    fn test_timestamped_fields() {
        let schema = SchemaBuilder::new("Post").timestamped().build().unwrap();
        let created = schema.field(CREATED_AT).unwrap();
        assert!(created.is_required());
        assert!(created.is_rejected());
        assert!(created.default_for_new().is_string());
        assert!(schema.field(UPDATED_AT).is_some());
    }

    #[test]
    fn test_required_detach_reference_fails_build() {
        let result = SchemaBuilder::new("Minion")
            .field(
                FieldDescriptor::reference("master_id", "Master")
                    .required()
                    .on_destroy(OnDestroy::Detach),
            )
            .build();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_index_derivation() {
        let schema = SchemaBuilder::new("Minion")
            .key_field("name")
            .field(FieldDescriptor::string("name"))
            .field(FieldDescriptor::string("code").unique())
            .field(FieldDescriptor::reference("master_id", "Master"))
            .field(FieldDescriptor::any("payload"))
            .index(Index::new(vec![
                IndexKey::new("master_id", IndexSpec::ascending()),
                IndexKey::new("code", IndexSpec::descending()),
            ]))
            .build()
            .unwrap();

        let indexes = schema.indexes();
        assert_eq!(indexes.len(), 4);

        assert_eq!(indexes[0].keys[0].key, "name");
        assert!(indexes[0].options.unique);

        assert_eq!(indexes[1].keys[0].key, "code");
        assert_eq!(
            indexes[1].keys[0].spec,
            IndexSpec::Direction(IndexDirection::Ascending)
        );
        assert!(indexes[1].options.unique);

        assert_eq!(indexes[2].keys[0].key, "master_id");
        assert!(!indexes[2].options.unique);

        assert_eq!(indexes[3].keys.len(), 2);
    }

    #[test]
    fn test_reference_fields() {
        let schema = SchemaBuilder::new("Node")
            .field(FieldDescriptor::self_reference("parent_id").on_destroy(OnDestroy::Cascade))
            .field(FieldDescriptor::reference("owner_id", "User"))
            .field(FieldDescriptor::string("label"))
            .build()
            .unwrap();

        let refs: Vec<_> = schema.reference_fields().collect();
        assert_eq!(
            refs,
            vec![
                ("parent_id", "Node", OnDestroy::Cascade),
                ("owner_id", "User", OnDestroy::Raise),
            ]
        );
    }
}
