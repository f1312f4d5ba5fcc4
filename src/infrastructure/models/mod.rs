//! Model infrastructure - registry, lifecycle coordination, integrity and counters

mod counter;
mod integrity;
mod registry;
mod store;

pub use counter::{counter_schema, CounterService, COUNTER_COLLECTION, COUNTER_MODEL};
pub use integrity::ReferenceIntegrity;
pub use registry::{ModelRegistry, SubmodelLoader};
pub use store::{ModelStore, SaveOptions};
