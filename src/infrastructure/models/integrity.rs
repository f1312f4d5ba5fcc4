//! Referential integrity: destroy policies and reference validation

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::DomainError;
use crate::domain::model::{ModelReference, OnDestroy, Record, ReferenceGuard};
use crate::domain::storage::{Patch, Query, RecordId};

use super::store::ModelStore;

/// Destroy-policy engine bound to a store.
///
/// Every Raise reference is checked before anything is mutated, so a
/// blocked destroy reports all blocking dependent types and leaves
/// dependents untouched. Cascade and Detach run afterwards as bulk
/// operations without per-record hooks.
pub struct ReferenceIntegrity<'a> {
    store: &'a ModelStore,
}

impl<'a> ReferenceIntegrity<'a> {
    pub fn new(store: &'a ModelStore) -> Self {
        Self { store }
    }

    /// References pointing at the record's type or any of its ancestors
    pub fn references_to(&self, record: &Record) -> Vec<ModelReference> {
        let schema = record.schema();
        let registry = self.store.registry().references();

        let mut references: Vec<ModelReference> = Vec::new();
        for owner in std::iter::once(schema.name()).chain(schema.ancestors().iter().map(String::as_str))
        {
            for reference in registry.references_to(owner) {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }
        references
    }

    /// Fails when a non-null reference points at a record that does not exist
    pub async fn check_reference(
        &self,
        field: &str,
        target: &str,
        value: &Value,
    ) -> Result<(), DomainError> {
        let id = match value {
            Value::Null => return Ok(()),
            Value::String(id) => RecordId::new(id.as_str()),
            other => RecordId::new(other.to_string()),
        };

        let target_schema = self.store.registry().schema(target)?;
        let found = self
            .store
            .find_one(&target_schema, Query::by_id(&id))
            .await?;

        if found.is_none() {
            return Err(DomainError::validation(format!(
                "Broken reference {}: no {} found",
                field, target
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceGuard for ReferenceIntegrity<'_> {
    async fn enforce_references(&self, record: &Record) -> Result<(), DomainError> {
        let Some(id) = record.id() else {
            return Ok(());
        };

        let references = self.references_to(record);
        if references.is_empty() {
            return Ok(());
        }

        let registry = self.store.registry();
        let mut blocking = Vec::new();

        for reference in references
            .iter()
            .filter(|r| r.on_destroy == OnDestroy::Raise)
        {
            let dependent = registry.schema(&reference.dependent)?;
            let query = Query::new().eq(reference.field.as_str(), id);
            if self.store.count(&dependent, query).await? > 0 {
                blocking.push(dependent.name().to_string());
            }
        }

        if !blocking.is_empty() {
            return Err(DomainError::has_references(record.schema().name(), blocking));
        }

        for reference in &references {
            let dependent = registry.schema(&reference.dependent)?;
            let query = Query::new().eq(reference.field.as_str(), id);

            match reference.on_destroy {
                OnDestroy::Raise => {}
                OnDestroy::Cascade => {
                    let deleted = self.store.destroy_many(&dependent, query).await?;
                    debug!(
                        owner = record.schema().name(),
                        dependent = %reference.dependent,
                        field = %reference.field,
                        deleted,
                        "Cascaded destroy"
                    );
                }
                OnDestroy::Detach => {
                    let patch = Patch::new().set(reference.field.as_str(), Value::Null);
                    let detached = self.store.update_many(&dependent, query, &patch).await?;
                    debug!(
                        owner = record.schema().name(),
                        dependent = %reference.dependent,
                        field = %reference.field,
                        detached,
                        "Detached references"
                    );
                }
            }
        }

        Ok(())
    }
}
