//! Model store: record lifecycle, cached lookups and bulk operations

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::DomainError;
use crate::domain::cache::CacheKey;
use crate::domain::model::{HookFlow, ModelHooks, ModelSchema, Record, SUBMODEL_FIELD};
use crate::domain::storage::{Document, DocumentStore, Patch, Query, RecordId};
use crate::infrastructure::cache::TwoLevelCache;
use crate::infrastructure::storage::{Database, StorageFactory};

use super::integrity::ReferenceIntegrity;
use super::registry::ModelRegistry;

/// Switches for a single save or destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Skip every lifecycle hook, destroy-policy enforcement included
    pub skip_hooks: bool,
    /// Evict the record's cache entries before writing
    pub invalidate_cache: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            skip_hooks: false,
            invalidate_cache: true,
        }
    }
}

impl SaveOptions {
    pub fn skip_hooks(mut self) -> Self {
        self.skip_hooks = true;
        self
    }

    pub fn without_invalidation(mut self) -> Self {
        self.invalidate_cache = false;
        self
    }
}

/// Coordinates records with storage, the cache tiers and the reference registry.
///
/// Cache invalidation always happens before the storage write, and is not
/// repeated afterwards. Under concurrent writers a reader can still
/// repopulate an entry with the old value between the two; this is accepted.
#[derive(Debug, Clone)]
pub struct ModelStore {
    database: Database,
    registry: Arc<ModelRegistry>,
    cache: TwoLevelCache,
}

impl ModelStore {
    pub fn new(database: Database, registry: Arc<ModelRegistry>, cache: TwoLevelCache) -> Self {
        Self {
            database,
            registry,
            cache,
        }
    }

    /// Wires storage and both cache tiers from application configuration
    pub async fn from_config(
        config: &AppConfig,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self, DomainError> {
        let database = Database::with_store(StorageFactory::create(&config.storage).await?);
        let cache = TwoLevelCache::from_config(&config.cache).await?;

        info!("Model store ready");
        Ok(Self::new(database, registry, cache))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &TwoLevelCache {
        &self.cache
    }

    fn documents(&self) -> Result<Arc<dyn DocumentStore>, DomainError> {
        self.database.meta()
    }

    /// Narrows queries issued through a concrete submodel to its discriminator
    fn scoped(schema: &ModelSchema, mut query: Query) -> Query {
        if let Some(discriminator) = schema.submodel() {
            query.insert(SUBMODEL_FIELD, discriminator);
        }
        query
    }

    /// Identity-shaped expressions look up by id, anything else by key field
    fn lookup_query(schema: &ModelSchema, expression: &str) -> Query {
        if RecordId::is_identity_expression(expression) {
            Query::by_id(&RecordId::new(expression))
        } else {
            Query::new().eq(schema.key_query_field(), expression)
        }
    }

    /// New, unsaved record of the given type
    pub fn create(&self, schema: &Arc<ModelSchema>, attrs: Document) -> Result<Record, DomainError> {
        Record::create(schema.clone(), attrs)
    }

    pub async fn find_one(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
    ) -> Result<Option<Record>, DomainError> {
        let query = Self::scoped(schema, query);
        let document = self
            .documents()?
            .find_one(schema.collection(), &query)
            .await?;

        document
            .map(|document| self.registry.load(schema, document))
            .transpose()
    }

    pub async fn find(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
    ) -> Result<Vec<Record>, DomainError> {
        let query = Self::scoped(schema, query);
        let documents = self
            .documents()?
            .find_many(schema.collection(), &query)
            .await?;

        documents
            .into_iter()
            .map(|document| self.registry.load(schema, document))
            .collect()
    }

    pub async fn find_ids(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
    ) -> Result<Vec<RecordId>, DomainError> {
        let query = Self::scoped(schema, query);
        let documents = self
            .documents()?
            .find_many(schema.collection(), &query)
            .await?;

        Ok(documents.iter().filter_map(RecordId::from_document).collect())
    }

    pub async fn count(&self, schema: &Arc<ModelSchema>, query: Query) -> Result<u64, DomainError> {
        let query = Self::scoped(schema, query);
        self.documents()?.count(schema.collection(), &query).await
    }

    /// Looks a record up by identity or key field value
    pub async fn get(
        &self,
        schema: &Arc<ModelSchema>,
        expression: Option<&str>,
    ) -> Result<Option<Record>, DomainError> {
        let Some(expression) = expression else {
            return Ok(None);
        };
        self.find_one(schema, Self::lookup_query(schema, expression))
            .await
    }

    /// Like `get`, failing with `error` when nothing is found
    pub async fn get_or(
        &self,
        schema: &Arc<ModelSchema>,
        expression: Option<&str>,
        error: DomainError,
    ) -> Result<Record, DomainError> {
        self.get(schema, expression).await?.ok_or(error)
    }

    /// Read-through lookup under `{collection}.{expression}`
    pub async fn cache_get(
        &self,
        schema: &Arc<ModelSchema>,
        expression: Option<&str>,
    ) -> Result<Option<Record>, DomainError> {
        let Some(expression) = expression else {
            return Ok(None);
        };

        let key = CacheKey::entity(schema.collection(), expression);
        let cached = self
            .cache
            .get_or_load(key.as_str(), || async {
                let record = self.get(schema, Some(expression)).await?;
                Ok(record.map(|r| Value::Object(r.to_document(true, true))))
            })
            .await?;

        match cached {
            None => Ok(None),
            Some(Value::Object(document)) => self.registry.load(schema, document).map(Some),
            Some(other) => Err(DomainError::serialization(format!(
                "Cached value under {} is not a document: {}",
                key, other
            ))),
        }
    }

    pub async fn cache_get_or(
        &self,
        schema: &Arc<ModelSchema>,
        expression: Option<&str>,
        error: DomainError,
    ) -> Result<Record, DomainError> {
        self.cache_get(schema, expression).await?.ok_or(error)
    }

    /// Memoized zero-argument computation keyed by `{collection}.{id}.{method}`
    pub async fn cached_method<F, Fut>(
        &self,
        record: &Record,
        method: &str,
        compute: F,
    ) -> Result<Value, DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, DomainError>>,
    {
        let schema = record.schema();
        if !schema.has_cached_method(method) {
            return Err(DomainError::configuration(format!(
                "{} is not a cached method of {}",
                method,
                schema.name()
            )));
        }
        let Some(id) = record.id() else {
            return Err(DomainError::save_required("This object must be saved first"));
        };

        let key = CacheKey::method(schema.collection(), id.as_str(), method);
        let value = self
            .cache
            .get_or_load(key.as_str(), || async { compute().await.map(Some) })
            .await?;

        Ok(value.unwrap_or(Value::Null))
    }

    /// Persists the record with default options
    pub async fn save(&self, record: &mut Record) -> Result<(), DomainError> {
        self.save_with(record, SaveOptions::default()).await
    }

    /// Validates, invalidates and persists the record.
    ///
    /// A `Skip` from `before_validation` or `before_save` returns early
    /// without error and without touching storage or cache.
    pub async fn save_with(&self, record: &mut Record, options: SaveOptions) -> Result<(), DomainError> {
        let schema = record.schema().clone();
        let hooks = self.registry.hooks(schema.name());
        let is_new = record.is_new();

        if !options.skip_hooks && hooks.before_validation(record).await? == HookFlow::Skip {
            debug!(model = schema.name(), "Save skipped before validation");
            return Ok(());
        }

        self.validate_all(record, hooks.as_ref()).await?;

        if !options.skip_hooks {
            record.touch();
            if hooks.before_save(record).await? == HookFlow::Skip {
                debug!(model = schema.name(), "Save skipped before save");
                return Ok(());
            }
        }

        if options.invalidate_cache {
            self.invalidate(record).await;
        }

        let documents = self.documents()?;
        let document = record.to_storage();
        match record.id().cloned() {
            None => {
                let id = documents.insert(schema.collection(), document).await?;
                record.set_id(Some(id));
            }
            Some(id) => documents.replace(schema.collection(), &id, document).await?,
        }

        record.take_snapshot();

        if !options.skip_hooks {
            hooks.after_save(record, is_new).await?;
        }

        debug!(
            model = schema.name(),
            id = ?record.id(),
            inserted = is_new,
            "Record saved"
        );
        Ok(())
    }

    /// Field checks, reference existence, type-level validation and the
    /// submodel discriminator, in that order
    pub async fn validate_all(
        &self,
        record: &Record,
        hooks: &dyn ModelHooks,
    ) -> Result<(), DomainError> {
        let schema = record.schema();
        let integrity = ReferenceIntegrity::new(self);

        for field in schema.fields() {
            let value = record.value(field.name());
            field.validate(&value)?;

            if let Some(target) = field.reference_target(schema.name()) {
                integrity.check_reference(field.name(), target, &value).await?;
            }
        }

        hooks.validate(record).await?;
        record.check_submodel()
    }

    /// Assigns every non-rejected field present in `data` and saves
    pub async fn update(&self, record: &mut Record, data: &Document) -> Result<(), DomainError> {
        self.update_with(record, data, SaveOptions::default()).await
    }

    pub async fn update_with(
        &self,
        record: &mut Record,
        data: &Document,
        options: SaveOptions,
    ) -> Result<(), DomainError> {
        record.apply_update(data);
        self.save_with(record, options).await
    }

    /// Applies a patch to the stored document of a persisted record.
    ///
    /// `when` adds conditions; nothing happens unless they match. On success
    /// the record's cache entries are evicted and its values reloaded.
    /// Returns whether the document was updated.
    pub async fn db_update(
        &self,
        record: &mut Record,
        patch: &Patch,
        when: Option<Query>,
    ) -> Result<bool, DomainError> {
        let Some(id) = record.id().cloned() else {
            return Err(DomainError::save_required("This object must be saved first"));
        };
        let schema = record.schema().clone();

        let mut query = when.unwrap_or_default();
        query.insert(crate::domain::storage::ID_FIELD, &id);

        let updated = self
            .documents()?
            .update_many(schema.collection(), &query, patch)
            .await?;
        if updated == 0 {
            return Ok(false);
        }

        self.invalidate(record).await;
        self.reload(record).await?;
        Ok(true)
    }

    /// Refreshes field values from storage.
    ///
    /// The snapshot is left alone so a later save still evicts the keys the
    /// record had before the reload.
    pub async fn reload(&self, record: &mut Record) -> Result<(), DomainError> {
        let Some(id) = record.id().cloned() else {
            return Ok(());
        };

        let fresh = self
            .find_one(record.schema(), Query::by_id(&id))
            .await?
            .ok_or_else(|| DomainError::model_destroyed("model has been deleted from db"))?;

        record.reload_from(&fresh);
        Ok(())
    }

    /// Destroys the record with default options
    pub async fn destroy(&self, record: &mut Record) -> Result<(), DomainError> {
        self.destroy_with(record, SaveOptions::default()).await
    }

    /// Runs destroy policies, evicts, deletes and clears the identity.
    ///
    /// A record that was never saved is returned unchanged.
    pub async fn destroy_with(
        &self,
        record: &mut Record,
        options: SaveOptions,
    ) -> Result<(), DomainError> {
        let Some(id) = record.id().cloned() else {
            return Ok(());
        };
        let schema = record.schema().clone();
        let hooks = self.registry.hooks(schema.name());

        if !options.skip_hooks {
            hooks
                .before_delete(&ReferenceIntegrity::new(self), record)
                .await?;
        }

        if options.invalidate_cache {
            self.invalidate(record).await;
        }

        self.documents()?
            .delete_one(schema.collection(), &id)
            .await?;

        if !options.skip_hooks {
            hooks.after_delete(record).await?;
        }

        record.set_id(None);
        debug!(model = schema.name(), id = %id, "Record destroyed");
        Ok(())
    }

    /// Every record, of any type, referencing this one
    pub async fn references(&self, record: &Record) -> Result<Vec<Record>, DomainError> {
        let Some(id) = record.id() else {
            return Ok(Vec::new());
        };

        let mut dependents = Vec::new();
        for reference in ReferenceIntegrity::new(self).references_to(record) {
            let schema = self.registry.schema(&reference.dependent)?;
            let query = Query::new().eq(reference.field.as_str(), id);
            dependents.extend(self.find(&schema, query).await?);
        }
        Ok(dependents)
    }

    /// Bulk update without per-record hooks; matching records are evicted first
    pub async fn update_many(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
        patch: &Patch,
    ) -> Result<u64, DomainError> {
        self.invalidate_many(schema, query.clone()).await?;

        let query = Self::scoped(schema, query);
        self.documents()?
            .update_many(schema.collection(), &query, patch)
            .await
    }

    /// Bulk delete without per-record hooks; matching records are evicted first
    pub async fn destroy_many(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
    ) -> Result<u64, DomainError> {
        self.invalidate_many(schema, query.clone()).await?;

        let query = Self::scoped(schema, query);
        self.documents()?
            .delete_many(schema.collection(), &query)
            .await
    }

    /// Deletes every record of the type
    pub async fn destroy_all(&self, schema: &Arc<ModelSchema>) -> Result<u64, DomainError> {
        self.destroy_many(schema, Query::new()).await
    }

    /// Evicts the entries addressed by the record's snapshot and its
    /// memoized methods from both tiers
    pub async fn invalidate(&self, record: &Record) {
        for key in record.invalidation_keys() {
            self.cache.invalidate(key.as_str()).await;
        }
    }

    /// Evicts the entries of every record matching the query
    pub async fn invalidate_many(
        &self,
        schema: &Arc<ModelSchema>,
        query: Query,
    ) -> Result<(), DomainError> {
        for record in self.find(schema, query).await? {
            for key in record.current_cache_keys() {
                self.cache.invalidate(key.as_str()).await;
            }
        }
        Ok(())
    }
}
