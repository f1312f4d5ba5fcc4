//! Document store trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::document::{Document, Patch, Query, RecordId};

/// Persistence collaborator consumed by the model layer.
///
/// Implementations are expected to handle connection management and
/// transport retries themselves; every call here is treated as final.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the first document matching the query
    async fn find_one(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Option<Document>, DomainError>;

    /// Returns every document matching the query
    async fn find_many(&self, collection: &str, query: &Query)
        -> Result<Vec<Document>, DomainError>;

    /// Inserts a new document and returns the identity assigned to it
    async fn insert(&self, collection: &str, document: Document) -> Result<RecordId, DomainError>;

    /// Replaces the document stored under the identity, inserting it if missing
    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        document: Document,
    ) -> Result<(), DomainError>;

    /// Deletes one document by identity, returns true if deleted
    async fn delete_one(&self, collection: &str, id: &RecordId) -> Result<bool, DomainError>;

    /// Deletes every document matching the query, returns the number deleted
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, DomainError>;

    /// Applies the patch to every matching document, returns the number updated
    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patch: &Patch,
    ) -> Result<u64, DomainError>;

    /// Atomically increments an integer field of the first matching document
    /// and returns the document as updated.
    ///
    /// When nothing matches, a document made of the query's predicates with
    /// the field set to 1 is inserted and returned.
    async fn find_and_increment(
        &self,
        collection: &str,
        query: &Query,
        field: &str,
    ) -> Result<Document, DomainError>;

    /// Counts matching documents
    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DomainError> {
        Ok(self.find_many(collection, query).await?.len() as u64)
    }
}
