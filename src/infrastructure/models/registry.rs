//! Registered model types, their hooks and submodel loaders

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::domain::DomainError;
use crate::domain::model::{
    DefaultHooks, ModelHooks, ModelSchema, Record, ReferenceRegistry, SUBMODEL_FIELD,
};
use crate::domain::storage::Document;

/// Builds a concrete record out of a stored document
pub type SubmodelLoader = Arc<dyn Fn(Document) -> Result<Record, DomainError> + Send + Sync>;

/// Process-wide table of model types.
///
/// Built once at startup and shared by every `ModelStore`. Registering a
/// schema also registers its reference fields with the reference registry.
#[derive(Default)]
pub struct ModelRegistry {
    schemas: RwLock<HashMap<String, Arc<ModelSchema>>>,
    hooks: RwLock<HashMap<String, Arc<dyn ModelHooks>>>,
    loaders: RwLock<HashMap<String, HashMap<String, SubmodelLoader>>>,
    references: ReferenceRegistry,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schemas = self
            .schemas
            .read()
            .map(|s| {
                let mut names: Vec<String> = s.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default();
        f.debug_struct("ModelRegistry")
            .field("schemas", &schemas)
            .field("references", &self.references)
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model type with default hooks
    pub fn register(&self, schema: ModelSchema) -> Result<Arc<ModelSchema>, DomainError> {
        self.register_with_hooks(schema, Arc::new(DefaultHooks))
    }

    pub fn register_with_hooks(
        &self,
        schema: ModelSchema,
        hooks: Arc<dyn ModelHooks>,
    ) -> Result<Arc<ModelSchema>, DomainError> {
        let schema = Arc::new(schema);
        let name = schema.name().to_string();

        {
            let mut schemas = self
                .schemas
                .write()
                .map_err(|e| DomainError::configuration(format!("Registry lock poisoned: {}", e)))?;
            if schemas.contains_key(&name) {
                return Err(DomainError::configuration(format!(
                    "Model {} is already registered",
                    name
                )));
            }
            schemas.insert(name.clone(), schema.clone());
        }

        self.set_hooks(&name, hooks)?;
        let added = self.references.register_schema(&schema);

        debug!(
            model = %name,
            collection = schema.collection(),
            references = added,
            "Model registered"
        );
        Ok(schema)
    }

    /// Replaces the hooks of a registered type
    pub fn set_hooks(&self, model: &str, hooks: Arc<dyn ModelHooks>) -> Result<(), DomainError> {
        let mut all = self
            .hooks
            .write()
            .map_err(|e| DomainError::configuration(format!("Registry lock poisoned: {}", e)))?;
        all.insert(model.to_string(), hooks);
        Ok(())
    }

    pub fn schema(&self, model: &str) -> Result<Arc<ModelSchema>, DomainError> {
        self.schemas
            .read()
            .ok()
            .and_then(|schemas| schemas.get(model).cloned())
            .ok_or_else(|| DomainError::configuration(format!("Model {} is not registered", model)))
    }

    pub fn hooks(&self, model: &str) -> Arc<dyn ModelHooks> {
        self.hooks
            .read()
            .ok()
            .and_then(|hooks| hooks.get(model).cloned())
            .unwrap_or_else(|| Arc::new(DefaultHooks))
    }

    pub fn references(&self) -> &ReferenceRegistry {
        &self.references
    }

    /// Registers a loader for `discriminator` under a submodel base.
    ///
    /// Loaders can only live on a base, never on a concrete submodel.
    pub fn register_submodel(
        &self,
        base: &ModelSchema,
        discriminator: impl Into<String>,
        loader: SubmodelLoader,
    ) -> Result<(), DomainError> {
        if base.submodel().is_some() {
            return Err(DomainError::integrity(
                "Attempted to register submodel with another submodel",
            ));
        }

        let discriminator = discriminator.into();
        let mut loaders = self
            .loaders
            .write()
            .map_err(|e| DomainError::configuration(format!("Registry lock poisoned: {}", e)))?;
        let family = loaders.entry(base.name().to_string()).or_default();

        if family.contains_key(&discriminator) {
            return Err(DomainError::integrity(format!(
                "Submodel {} already registered",
                discriminator
            )));
        }

        debug!(base = base.name(), submodel = %discriminator, "Submodel registered");
        family.insert(discriminator, loader);
        Ok(())
    }

    /// Registers a concrete submodel schema under its base
    pub fn register_submodel_schema(
        &self,
        base: &ModelSchema,
        submodel: Arc<ModelSchema>,
    ) -> Result<(), DomainError> {
        let discriminator = submodel.submodel().map(str::to_string).ok_or_else(|| {
            DomainError::integrity(format!(
                "Attempted to register abstract model {} as a submodel",
                submodel.name()
            ))
        })?;

        let loader: SubmodelLoader =
            Arc::new(move |document| Record::from_document(submodel.clone(), document));
        self.register_submodel(base, discriminator, loader)
    }

    /// Turns a stored document into a record of the right concrete type.
    ///
    /// Submodel types dispatch on the stored discriminator through the
    /// loaders of the nearest type (itself or an ancestor) that has any.
    pub fn load(&self, schema: &Arc<ModelSchema>, document: Document) -> Result<Record, DomainError> {
        if schema.submodel_family().is_none() {
            return Record::from_document(schema.clone(), document);
        }

        let Some(discriminator) = document.get(SUBMODEL_FIELD) else {
            return Err(DomainError::missing_submodel(format!(
                "{} has no submodel in the DB. Bug?",
                schema.name()
            )));
        };
        let discriminator = match discriminator {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let loader = {
            let loaders = self
                .loaders
                .read()
                .map_err(|e| DomainError::configuration(format!("Registry lock poisoned: {}", e)))?;

            let family = std::iter::once(schema.name())
                .chain(schema.ancestors().iter().map(String::as_str))
                .find_map(|name| loaders.get(name).filter(|family| !family.is_empty()));

            match family {
                None => None,
                Some(family) => Some(family.get(&discriminator).cloned().ok_or_else(|| {
                    DomainError::unknown_submodel(format!(
                        "Submodel {} is not registered with {}",
                        discriminator,
                        schema.name()
                    ))
                })?),
            }
        };

        match loader {
            Some(loader) => loader(document),
            None => Record::from_document(schema.clone(), document),
        }
    }
}
