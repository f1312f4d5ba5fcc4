use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Save required: {message}")]
    SaveRequired { message: String },

    #[error("Integrity error: {message}")]
    Integrity { message: String },

    #[error("{model} has dangling references of types {dependents:?}")]
    HasReferences {
        model: String,
        dependents: Vec<String>,
    },

    #[error("Missing submodel: {message}")]
    MissingSubmodel { message: String },

    #[error("Wrong submodel: {message}")]
    WrongSubmodel { message: String },

    #[error("Unknown submodel: {message}")]
    UnknownSubmodel { message: String },

    #[error("Model destroyed: {message}")]
    ModelDestroyed { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn save_required(message: impl Into<String>) -> Self {
        Self::SaveRequired {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Raise-policy violation; dependents are sorted so the message is stable
    pub fn has_references(model: impl Into<String>, mut dependents: Vec<String>) -> Self {
        dependents.sort();
        dependents.dedup();
        Self::HasReferences {
            model: model.into(),
            dependents,
        }
    }

    pub fn missing_submodel(message: impl Into<String>) -> Self {
        Self::MissingSubmodel {
            message: message.into(),
        }
    }

    pub fn wrong_submodel(message: impl Into<String>) -> Self {
        Self::WrongSubmodel {
            message: message.into(),
        }
    }

    pub fn unknown_submodel(message: impl Into<String>) -> Self {
        Self::UnknownSubmodel {
            message: message.into(),
        }
    }

    pub fn model_destroyed(message: impl Into<String>) -> Self {
        Self::ModelDestroyed {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// True for field or cross-field constraint violations
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::SaveRequired { .. })
    }

    /// True for reference-policy and submodel discriminator failures
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. }
                | Self::HasReferences { .. }
                | Self::MissingSubmodel { .. }
                | Self::WrongSubmodel { .. }
                | Self::UnknownSubmodel { .. }
                | Self::ModelDestroyed { .. }
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
