//! Model domain - schemas, records, references and lifecycle hooks

mod field;
mod hooks;
mod index;
mod record;
mod reference;
mod schema;

pub use field::{DefaultValue, FieldDescriptor, FieldKind, LengthBounds, NumberBounds};
pub use hooks::{DefaultHooks, HookFlow, ModelHooks, ReferenceGuard};
pub use index::{Index, IndexDirection, IndexKey, IndexOptions, IndexSpec, IndexType};
pub use record::Record;
pub use reference::{ModelReference, OnDestroy, ReferenceRegistry};
pub use schema::{
    now_timestamp, snake_case, ModelSchema, SchemaBuilder, CREATED_AT, ID, SUBMODEL_FIELD,
    UPDATED_AT,
};
