//! Records: one instance of a model type with its field values
//!
//! A record keeps the snapshot of its values taken right after it was
//! loaded or saved. The snapshot drives dirty checking and, more
//! importantly, cache invalidation: old key values are what must be evicted
//! when a key field changes.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::DomainError;
use crate::domain::cache::CacheKey;
use crate::domain::storage::{Document, ID_FIELD, RecordId};

use super::schema::{ID, ModelSchema, SUBMODEL_FIELD, UPDATED_AT, now_timestamp};

#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    id: Option<RecordId>,
    values: Document,
    initial: Document,
}

impl Record {
    /// New, unsaved record; unspecified fields take their defaults
    pub fn create(schema: Arc<ModelSchema>, attrs: Document) -> Result<Self, DomainError> {
        Self::build(schema, attrs)
    }

    /// Record built from a stored document
    pub fn from_document(schema: Arc<ModelSchema>, document: Document) -> Result<Self, DomainError> {
        Self::build(schema, document)
    }

    fn build(schema: Arc<ModelSchema>, attrs: Document) -> Result<Self, DomainError> {
        let id = RecordId::from_document(&attrs);
        let mut values = Document::new();

        for field in schema.fields() {
            let value = match attrs.get(field.name()) {
                Some(value) => field.normalize(value.clone()),
                None => field.default_for_new(),
            };
            values.insert(field.name().to_string(), value);
        }

        let mut record = Self {
            schema,
            id,
            values,
            initial: Document::new(),
        };

        if record.schema.submodel_family().is_some() {
            if record.is_new() {
                let discriminator = record.schema.submodel().ok_or_else(|| {
                    DomainError::integrity(format!(
                        "Attempted to create an object of abstract model {}",
                        record.schema.name()
                    ))
                })?;
                if attrs.contains_key(SUBMODEL_FIELD) {
                    return Err(DomainError::integrity(
                        "Attempt to override submodel for a new object",
                    ));
                }
                let discriminator = Value::String(discriminator.to_string());
                record.values.insert(SUBMODEL_FIELD.to_string(), discriminator);
            } else {
                if !record.stored_submodel().is_some_and(|s| !s.is_empty()) {
                    return Err(DomainError::missing_submodel(format!(
                        "{} has no submodel in the DB. A bug?",
                        record.schema.name()
                    )));
                }
                record.check_submodel()?;
            }
        }

        record.take_snapshot();
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// A record without identity has never been persisted
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub(crate) fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    /// Field value; `None` when the type declares no such field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Field value by name, resolving the identity pseudo-field
    pub fn value(&self, field: &str) -> Value {
        if field == ID || field == ID_FIELD {
            return self.id.as_ref().map(Value::from).unwrap_or(Value::Null);
        }
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Assigns a declared field, applying the field's normalization
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), DomainError> {
        let descriptor = self.schema.field(field).ok_or_else(|| {
            DomainError::validation(format!(
                "{} has no field {}",
                self.schema.name(),
                field
            ))
        })?;
        let value = descriptor.normalize(value.into());
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    pub fn values(&self) -> &Document {
        &self.values
    }

    /// Values as of the last load or save, identity included under `id`
    pub fn snapshot(&self) -> &Document {
        &self.initial
    }

    pub(crate) fn take_snapshot(&mut self) {
        let mut initial = self.values.clone();
        initial.insert(ID.to_string(), self.value(ID));
        self.initial = initial;
    }

    pub fn is_modified(&self) -> bool {
        if self.initial.get(ID).unwrap_or(&Value::Null) != &self.value(ID) {
            return true;
        }
        self.values
            .iter()
            .any(|(field, value)| self.initial.get(field).unwrap_or(&Value::Null) != value)
    }

    /// Exported document.
    ///
    /// Restricted fields are skipped unless asked for; `convert_id` emits the
    /// identity under its stored name.
    pub fn to_document(&self, include_restricted: bool, convert_id: bool) -> Document {
        let mut document = Document::new();
        let id_name = if convert_id { ID_FIELD } else { ID };
        document.insert(id_name.to_string(), self.value(ID));

        for field in self.schema.fields() {
            if field.is_restricted() && !include_restricted {
                continue;
            }
            let value = self.values.get(field.name()).cloned().unwrap_or(Value::Null);
            document.insert(field.name().to_string(), value);
        }
        document
    }

    /// Document as persisted; the identity is left out while the record is new
    pub fn to_storage(&self) -> Document {
        let mut document = self.to_document(true, true);
        if self.is_new() {
            document.remove(ID_FIELD);
        }
        document
    }

    /// Assigns every declared, non-rejected field present in `data`.
    ///
    /// The identity can never be assigned this way.
    pub fn apply_update(&mut self, data: &Document) {
        let assignable: Vec<(String, Value)> = self
            .schema
            .fields()
            .iter()
            .filter(|field| !field.is_rejected())
            .filter_map(|field| {
                data.get(field.name())
                    .map(|value| (field.name().to_string(), field.normalize(value.clone())))
            })
            .collect();

        for (field, value) in assignable {
            self.values.insert(field, value);
        }
    }

    /// Replaces field values with those of a freshly loaded copy
    pub fn reload_from(&mut self, other: &Record) {
        for field in self.schema.fields() {
            let value = other.value(field.name());
            self.values.insert(field.name().to_string(), value);
        }
        self.id = other.id.clone();
    }

    /// Stamps `updated_at` on timestamped types
    pub fn touch(&mut self) {
        if self.schema.is_timestamped() {
            self.values.insert(UPDATED_AT.to_string(), now_timestamp());
        }
    }

    fn stored_submodel(&self) -> Option<&str> {
        self.values.get(SUBMODEL_FIELD).and_then(Value::as_str)
    }

    /// Fails when the stored discriminator does not belong to this schema
    pub fn check_submodel(&self) -> Result<(), DomainError> {
        if self.schema.submodel_family().is_none() {
            return Ok(());
        }
        let expected = self.schema.submodel();
        let stored = self.stored_submodel();
        if stored != expected {
            return Err(DomainError::wrong_submodel(format!(
                "Attempted to load {} as {}. Correct submodel would be {}. A bug?",
                stored.unwrap_or("<none>"),
                self.schema.name(),
                expected.unwrap_or("<none>")
            )));
        }
        Ok(())
    }

    /// Keys to evict before this record is written or deleted.
    ///
    /// Entity keys come from the snapshot so a renamed key field evicts its
    /// previous entry. Method keys only exist once the record has an id.
    pub fn invalidation_keys(&self) -> Vec<CacheKey> {
        let collection = self.schema.collection();
        let mut keys: Vec<CacheKey> = self
            .schema
            .cache_key_fields()
            .filter_map(|field| {
                let value = self.initial.get(field).unwrap_or(&Value::Null);
                CacheKey::for_field_value(collection, value)
            })
            .collect();

        if let Some(id) = &self.id {
            keys.extend(self.method_keys(id));
        }
        keys
    }

    /// Keys addressing this record's current values and every memoized method
    pub fn current_cache_keys(&self) -> Vec<CacheKey> {
        let collection = self.schema.collection();
        let mut keys: Vec<CacheKey> = self
            .schema
            .cache_key_fields()
            .filter_map(|field| CacheKey::for_field_value(collection, &self.value(field)))
            .collect();

        if let Some(id) = &self.id {
            keys.extend(self.method_keys(id));
        }
        keys
    }

    fn method_keys<'a>(&'a self, id: &'a RecordId) -> impl Iterator<Item = CacheKey> + 'a {
        self.schema
            .cached_methods()
            .map(move |method| CacheKey::method(self.schema.collection(), id.as_str(), method))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name()
            && self.id == other.id
            && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FieldDescriptor, SchemaBuilder};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn test_model() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("TestModel")
                .field(
                    FieldDescriptor::string("field1")
                        .rejected()
                        .indexed()
                        .default_value("default_value"),
                )
                .field(FieldDescriptor::any("field2").required())
                .field(FieldDescriptor::any("field3").required().default_value("required_default_value"))
                .field(FieldDescriptor::any("callable_default_field").default_with(|| json!(4)))
                .field(FieldDescriptor::string("secret").restricted())
                .build()
                .unwrap(),
        )
    }

    fn user() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("User")
                .key_field("last_name")
                .field(FieldDescriptor::string("first_name"))
                .field(FieldDescriptor::string("last_name"))
                .cached_method("full_name")
                .build()
                .unwrap(),
        )
    }

    fn shapes() -> (Arc<ModelSchema>, Arc<ModelSchema>) {
        let base = SchemaBuilder::new("Shape")
            .collection("shapes")
            .submodel_family()
            .build()
            .unwrap();
        let circle = SchemaBuilder::new("Circle")
            .extends(&base)
            .submodel("circle")
            .field(FieldDescriptor::float("radius"))
            .build()
            .unwrap();
        (Arc::new(base), Arc::new(circle))
    }

    #[test]
    fn test_defaults() {
        let record = Record::create(test_model(), Document::new()).unwrap();
        assert_eq!(record.get("field1"), Some(&json!("default_value")));
        assert_eq!(record.get("field3"), Some(&json!("required_default_value")));
        assert_eq!(record.get("callable_default_field"), Some(&json!(4)));
        assert_eq!(record.get("field2"), Some(&Value::Null));
        assert!(record.is_new());
        assert!(!record.is_modified());
    }

    #[test]
    fn test_set_trims_and_marks_modified() {
        let mut record = Record::create(user(), Document::new()).unwrap();
        record.set("first_name", "  Bob ").unwrap();
        assert_eq!(record.get("first_name"), Some(&json!("Bob")));
        assert!(record.is_modified());
        assert!(record.set("middle_name", "X").is_err());
    }

    #[test]
    fn test_apply_update_ignores_rejected_fields_and_id() {
        let mut record =
            Record::create(test_model(), doc(json!({"field1": "original_value"}))).unwrap();
        record.apply_update(&doc(json!({
            "field1": "new_value",
            "field2": "updated",
            "id": "x",
            "_id": "y"
        })));
        assert_eq!(record.get("field1"), Some(&json!("original_value")));
        assert_eq!(record.get("field2"), Some(&json!("updated")));
        assert!(record.is_new());
    }

    #[test]
    fn test_to_document_hides_restricted() {
        let record =
            Record::from_document(test_model(), doc(json!({"_id": "r1", "secret": "s"}))).unwrap();

        let public = record.to_document(false, false);
        assert_eq!(public.get("id"), Some(&json!("r1")));
        assert!(!public.contains_key("secret"));

        let full = record.to_document(true, true);
        assert_eq!(full.get("_id"), Some(&json!("r1")));
        assert_eq!(full.get("secret"), Some(&json!("s")));
    }

    #[test]
    fn test_to_storage_omits_id_for_new_records() {
        let record = Record::create(test_model(), Document::new()).unwrap();
        assert!(!record.to_storage().contains_key("_id"));
    }

    #[test]
    fn test_invalidation_keys_of_new_record() {
        let record = Record::create(user(), doc(json!({"last_name": "Dylan"}))).unwrap();
        let keys: Vec<String> = record
            .invalidation_keys()
            .into_iter()
            .map(CacheKey::into_string)
            .collect();
        assert_eq!(keys, vec!["user.Dylan"]);
    }

    #[test]
    fn test_invalidation_keys_use_snapshot_values() {
        let mut record = Record::from_document(
            user(),
            doc(json!({"_id": "u1", "last_name": "Dylan"})),
        )
        .unwrap();
        record.set("last_name", "Cohen").unwrap();

        let keys: Vec<String> = record
            .invalidation_keys()
            .into_iter()
            .map(CacheKey::into_string)
            .collect();
        assert_eq!(keys, vec!["user.u1", "user.Dylan", "user.u1.full_name"]);

        let current: Vec<String> = record
            .current_cache_keys()
            .into_iter()
            .map(CacheKey::into_string)
            .collect();
        assert_eq!(current, vec!["user.u1", "user.Cohen", "user.u1.full_name"]);
    }

    #[test]
    fn test_new_submodel_gets_discriminator() {
        let (base, circle) = shapes();
        let record = Record::create(circle, Document::new()).unwrap();
        assert_eq!(record.get("submodel"), Some(&json!("circle")));

        let err = Record::create(base, Document::new()).unwrap_err();
        assert!(err.to_string().contains("abstract model Shape"));
    }

    #[test]
    fn test_new_submodel_rejects_discriminator_override() {
        let (_, circle) = shapes();
        let err = Record::create(circle, doc(json!({"submodel": "square"}))).unwrap_err();
        assert!(matches!(err, DomainError::Integrity { .. }));
    }

    #[test]
    fn test_loaded_submodel_checks() {
        let (_, circle) = shapes();

        let err = Record::from_document(circle.clone(), doc(json!({"_id": "s1"}))).unwrap_err();
        assert!(matches!(err, DomainError::MissingSubmodel { .. }));

        let err = Record::from_document(
            circle.clone(),
            doc(json!({"_id": "s1", "submodel": "square"})),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::WrongSubmodel { .. }));

        let record =
            Record::from_document(circle, doc(json!({"_id": "s1", "submodel": "circle"}))).unwrap();
        assert!(record.check_submodel().is_ok());
    }

    #[test]
    fn test_tampered_discriminator_fails_check() {
        let (_, circle) = shapes();
        let mut record = Record::create(circle, Document::new()).unwrap();
        record.set("submodel", "square").unwrap();
        assert!(matches!(
            record.check_submodel(),
            Err(DomainError::WrongSubmodel { .. })
        ));
    }

    #[test]
    fn test_touch_updates_timestamp() {
        let schema = Arc::new(SchemaBuilder::new("Post").timestamped().build().unwrap());
        let mut record = Record::create(schema, Document::new()).unwrap();
        record.values.insert(UPDATED_AT.to_string(), json!("2000-01-01T00:00:00.000Z"));
        record.touch();
        assert_ne!(record.get(UPDATED_AT), Some(&json!("2000-01-01T00:00:00.000Z")));
    }
}
