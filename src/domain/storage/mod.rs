//! Storage domain - document store collaborator contract

mod document;
mod repository;

pub use document::{Document, Patch, Query, RecordId, ID_FIELD};
pub use repository::DocumentStore;
