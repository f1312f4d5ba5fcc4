//! Domain layer - contracts, schemas and pure model logic

pub mod cache;
pub mod error;
pub mod model;
pub mod storage;

pub use cache::{CacheBackend, CacheKey, CacheValue};
pub use error::DomainError;
pub use model::{
    FieldDescriptor, HookFlow, ModelHooks, ModelReference, ModelSchema, OnDestroy, Record,
    ReferenceRegistry, SchemaBuilder,
};
pub use storage::{Document, DocumentStore, Patch, Query, RecordId};
