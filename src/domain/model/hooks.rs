//! Lifecycle hooks run around save and destroy

use async_trait::async_trait;

use crate::domain::DomainError;

use super::record::Record;

/// Outcome of a pre-validation or pre-save hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookFlow {
    #[default]
    Continue,
    /// Abort the save without error; the record is returned unchanged
    Skip,
}

/// Destroy-policy enforcement, supplied to `before_delete`
#[async_trait]
pub trait ReferenceGuard: Send + Sync {
    async fn enforce_references(&self, record: &Record) -> Result<(), DomainError>;
}

/// Per-type lifecycle hooks. Every method has a no-op default except
/// `before_delete`, which enforces destroy policies.
#[async_trait]
pub trait ModelHooks: Send + Sync {
    async fn before_validation(&self, _record: &mut Record) -> Result<HookFlow, DomainError> {
        Ok(HookFlow::Continue)
    }

    /// Cross-field validation, run after every field passed its own checks
    async fn validate(&self, _record: &Record) -> Result<(), DomainError> {
        Ok(())
    }

    async fn before_save(&self, _record: &mut Record) -> Result<HookFlow, DomainError> {
        Ok(HookFlow::Continue)
    }

    async fn after_save(&self, _record: &Record, _is_new: bool) -> Result<(), DomainError> {
        Ok(())
    }

    async fn before_delete(
        &self,
        guard: &dyn ReferenceGuard,
        record: &Record,
    ) -> Result<(), DomainError> {
        guard.enforce_references(record).await
    }

    async fn after_delete(&self, _record: &Record) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Hooks used for types that register none
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl ModelHooks for DefaultHooks {}
