//! Cross-record references and the process-wide reference registry

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

use super::schema::ModelSchema;

/// What happens to dependents when the record they point at is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDestroy {
    /// Refuse the destroy while dependents exist
    #[default]
    Raise,
    /// Bulk-delete dependents
    Cascade,
    /// Null the referencing field on dependents
    Detach,
}

impl OnDestroy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raise => "raise",
            Self::Cascade => "cascade",
            Self::Detach => "detach",
        }
    }
}

impl fmt::Display for OnDestroy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnDestroy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "cascade" => Ok(Self::Cascade),
            "detach" => Ok(Self::Detach),
            _ => Err(DomainError::configuration(format!(
                "Unknown destroy policy: {}. Valid policies: raise, cascade, detach",
                s
            ))),
        }
    }
}

/// A dependent type's field pointing at an owner type.
///
/// Equality and hashing only look at `(dependent, field)`. Two registrations
/// that differ only by owner therefore collapse into one; the first one
/// registered wins.
#[derive(Debug, Clone)]
pub struct ModelReference {
    /// Referenced (owner) type name
    pub owner: String,
    /// Type holding the reference field
    pub dependent: String,
    /// Name of the reference field on the dependent type
    pub field: String,
    pub on_destroy: OnDestroy,
}

impl ModelReference {
    pub fn new(
        owner: impl Into<String>,
        dependent: impl Into<String>,
        field: impl Into<String>,
        on_destroy: OnDestroy,
    ) -> Self {
        Self {
            owner: owner.into(),
            dependent: dependent.into(),
            field: field.into(),
            on_destroy,
        }
    }
}

impl PartialEq for ModelReference {
    fn eq(&self, other: &Self) -> bool {
        self.dependent == other.dependent && self.field == other.field
    }
}

impl Eq for ModelReference {}

impl Hash for ModelReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dependent.hash(state);
        self.field.hash(state);
    }
}

/// Owner type name -> references pointing at it.
///
/// Append-only: entries are added while types are registered and never
/// removed for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    entries: RwLock<HashMap<String, HashSet<ModelReference>>>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference under its owner; returns false if an equal one was already there
    pub fn register(&self, reference: ModelReference) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(reference.owner.clone())
            .or_default()
            .insert(reference)
    }

    /// Registers every reference field declared by a concrete schema.
    ///
    /// Abstract schemas register nothing; their concrete subtypes do.
    /// Returns the number of new references.
    pub fn register_schema(&self, schema: &ModelSchema) -> usize {
        if schema.is_abstract() {
            return 0;
        }

        let mut added = 0;

        for (field, owner, on_destroy) in schema.reference_fields() {
            let reference = ModelReference::new(owner, schema.name(), field, on_destroy);
            if self.register(reference) {
                added += 1;
            }
        }

        added
    }

    /// References whose owner is the given type, ordered by dependent then field
    pub fn references_to(&self, owner: &str) -> Vec<ModelReference> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut references: Vec<ModelReference> = entries
            .get(owner)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        references.sort_by(|a, b| (&a.dependent, &a.field).cmp(&(&b.dependent, &b.field)));
        references
    }

    pub fn has_references(&self, owner: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(owner).is_some_and(|set| !set.is_empty())
    }
}
