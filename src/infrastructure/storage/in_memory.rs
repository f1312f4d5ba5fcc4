//! In-memory document store implementation

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::DomainError;
use crate::domain::storage::{Document, DocumentStore, ID_FIELD, Patch, Query, RecordId};

/// Thread-safe in-memory document store
///
/// Useful for testing and development. Data is lost when the process terminates.
/// Documents keep their insertion order within a collection.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Document>>>, DomainError> {
        self.collections
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Document>>>, DomainError> {
        self.collections
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }

    fn has_id(document: &Document, id: &RecordId) -> bool {
        RecordId::from_document(document).as_ref() == Some(id)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Option<Document>, DomainError> {
        let collections = self.read()?;

        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| query.matches(doc)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DomainError> {
        let collections = self.read()?;

        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| query.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<RecordId, DomainError> {
        let id = RecordId::from_document(&document).unwrap_or_else(RecordId::generate);
        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.iter().any(|doc| Self::has_id(doc, &id)) {
            return Err(DomainError::storage(format!(
                "Document with id '{}' already exists in {}",
                id, collection
            )));
        }

        document.insert(ID_FIELD.to_string(), id.clone().into());
        docs.push(document);
        Ok(id)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        mut document: Document,
    ) -> Result<(), DomainError> {
        document.insert(ID_FIELD.to_string(), id.into());
        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();

        match docs.iter_mut().find(|doc| Self::has_id(doc, id)) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: &RecordId) -> Result<bool, DomainError> {
        let mut collections = self.write()?;

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|doc| !Self::has_id(doc, id));
        Ok(docs.len() < before)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, DomainError> {
        let mut collections = self.write()?;

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !query.matches(doc));
        Ok((before - docs.len()) as u64)
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patch: &Patch,
    ) -> Result<u64, DomainError> {
        let mut collections = self.write()?;

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut updated = 0;
        for doc in docs.iter_mut().filter(|doc| query.matches(doc)) {
            patch.apply(doc);
            updated += 1;
        }
        Ok(updated)
    }

    async fn find_and_increment(
        &self,
        collection: &str,
        query: &Query,
        field: &str,
    ) -> Result<Document, DomainError> {
        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(doc) = docs.iter_mut().find(|doc| query.matches(doc)) {
            let current = match doc.get(field) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    DomainError::storage(format!(
                        "Cannot increment non-integer field {} in {}",
                        field, collection
                    ))
                })?,
            };
            doc.insert(field.to_string(), Value::from(current + 1));
            return Ok(doc.clone());
        }

        let mut document = query.to_document();
        document.insert(field.to_string(), Value::from(1));
        if RecordId::from_document(&document).is_none() {
            document.insert(ID_FIELD.to_string(), RecordId::generate().into());
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DomainError> {
        let collections = self.read()?;

        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| query.matches(doc)).count() as u64)
            .unwrap_or(0))
    }
}
