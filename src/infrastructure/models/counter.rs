//! Named sequences backed by an atomic upsert-and-increment

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::domain::DomainError;
use crate::domain::model::{FieldDescriptor, ModelSchema, Record, SchemaBuilder};
use crate::domain::storage::Query;

use super::store::{ModelStore, SaveOptions};

pub const COUNTER_MODEL: &str = "Counter";
pub const COUNTER_COLLECTION: &str = "counters";

const KEY_FIELD: &str = "key";
const COUNTER_FIELD: &str = "counter";

/// Counters live in `counters`, one document per key
pub fn counter_schema() -> Result<ModelSchema, DomainError> {
    SchemaBuilder::new(COUNTER_MODEL)
        .collection(COUNTER_COLLECTION)
        .key_field(KEY_FIELD)
        .field(FieldDescriptor::string(KEY_FIELD).unique())
        .field(FieldDescriptor::int(COUNTER_FIELD).default_value(1))
        .build()
}

/// Sequence numbers for stores without native sequences.
///
/// Every call to [`get`](Self::get) is a single atomic store operation, so
/// concurrent callers never observe the same value.
#[derive(Debug, Clone)]
pub struct CounterService {
    store: ModelStore,
    schema: Arc<ModelSchema>,
}

impl CounterService {
    /// Registers the counter type unless the registry already knows it
    pub fn new(store: ModelStore) -> Result<Self, DomainError> {
        let schema = match store.registry().schema(COUNTER_MODEL) {
            Ok(schema) => schema,
            Err(_) => store.registry().register(counter_schema()?)?,
        };
        Ok(Self { store, schema })
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Increments the counter under `key`, starting it at 1 when missing
    pub async fn get(&self, key: &str) -> Result<Record, DomainError> {
        let query = Query::new().eq(KEY_FIELD, key);
        let document = self
            .store
            .database()
            .meta()?
            .find_and_increment(self.schema.collection(), &query, COUNTER_FIELD)
            .await?;

        let record = self.store.registry().load(&self.schema, document)?;
        self.store.invalidate(&record).await;

        debug!(key = %key, counter = %record.value(COUNTER_FIELD), "Counter incremented");
        Ok(record)
    }

    /// Next value of the counter under `key`
    pub async fn get_counter(&self, key: &str) -> Result<i64, DomainError> {
        let record = self.get(key).await?;
        record.value(COUNTER_FIELD).as_i64().ok_or_else(|| {
            DomainError::integrity(format!("counter {} does not hold an integer", key))
        })
    }

    /// Advances the sequence a counter record belongs to
    pub async fn next(&self, counter: &Record) -> Result<Record, DomainError> {
        match counter.value(KEY_FIELD) {
            Value::String(key) if !key.is_empty() => self.get(&key).await,
            _ => Err(DomainError::integrity("counter key is not initialised")),
        }
    }

    /// Removes the counter; the next `get` on its key starts again at 1
    pub async fn drop(&self, counter: &mut Record) -> Result<(), DomainError> {
        self.store
            .destroy_with(counter, SaveOptions::default().skip_hooks())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheBackend;
    use crate::infrastructure::cache::{InMemoryCache, InMemoryCacheConfig, NoCache, TwoLevelCache};
    use crate::infrastructure::models::ModelRegistry;
    use crate::infrastructure::storage::{Database, InMemoryDocumentStore};
    use serde_json::json;

    fn counters() -> (CounterService, Arc<InMemoryCache>) {
        let l1 = Arc::new(InMemoryCache::isolated(&InMemoryCacheConfig::default()));
        let cache = TwoLevelCache::new(l1.clone(), Arc::new(NoCache::new()));
        let store = ModelStore::new(
            Database::with_store(Arc::new(InMemoryDocumentStore::new())),
            Arc::new(ModelRegistry::new()),
            cache,
        );
        (CounterService::new(store).unwrap(), l1)
    }

    #[tokio::test]
    async fn test_counter_starts_at_one_and_increments() {
        let (counters, _) = counters();

        assert_eq!(counters.get_counter("invoice").await.unwrap(), 1);
        assert_eq!(counters.get_counter("invoice").await.unwrap(), 2);
        assert_eq!(counters.get_counter("order").await.unwrap(), 1);
        assert_eq!(counters.get_counter("invoice").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_get_returns_persisted_record() {
        let (counters, _) = counters();

        let record = counters.get("invoice").await.unwrap();
        assert!(!record.is_new());
        assert_eq!(record.schema().name(), COUNTER_MODEL);
        assert_eq!(record.value("key"), json!("invoice"));
        assert_eq!(record.value("counter"), json!(1));
    }

    #[tokio::test]
    async fn test_next_advances_same_key() {
        let (counters, _) = counters();

        let first = counters.get("invoice").await.unwrap();
        let second = counters.next(&first).await.unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.value("counter"), json!(2));
    }

    #[tokio::test]
    async fn test_next_requires_key() {
        let (counters, _) = counters();
        let unkeyed = Record::create(counters.schema().clone(), Default::default()).unwrap();

        let result = counters.next(&unkeyed).await;
        match result {
            Err(DomainError::Integrity { message }) => {
                assert_eq!(message, "counter key is not initialised");
            }
            other => panic!("expected Integrity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_restarts_sequence() {
        let (counters, _) = counters();

        counters.get("invoice").await.unwrap();
        let mut counter = counters.get("invoice").await.unwrap();
        counters.drop(&mut counter).await.unwrap();

        assert!(counter.is_new());
        assert_eq!(counters.get_counter("invoice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_evicts_cached_counter() {
        let (counters, l1) = counters();
        let schema = counters.schema().clone();

        counters.get("invoice").await.unwrap();
        let cached = counters
            .store
            .cache_get(&schema, Some("invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.value("counter"), json!(1));
        assert!(l1.get("counters.invoice").await.is_some());

        counters.get("invoice").await.unwrap();
        assert!(l1.get("counters.invoice").await.is_none());

        let cached = counters
            .store
            .cache_get(&schema, Some("invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.value("counter"), json!(2));
    }

    #[tokio::test]
    async fn test_new_reuses_registered_schema() {
        let (counters, _) = counters();
        let again = CounterService::new(counters.store.clone()).unwrap();

        assert!(Arc::ptr_eq(counters.schema(), again.schema()));
    }
}
