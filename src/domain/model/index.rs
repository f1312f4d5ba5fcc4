//! Index declarations derived from schemas

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Ascending,
    Descending,
}

/// Special index kinds supported by document stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Geo2d,
    Geosphere,
    Hashed,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSpec {
    Direction(IndexDirection),
    Type(IndexType),
}

impl IndexSpec {
    pub fn ascending() -> Self {
        Self::Direction(IndexDirection::Ascending)
    }

    pub fn descending() -> Self {
        Self::Direction(IndexDirection::Descending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub key: String,
    pub spec: IndexSpec,
}

impl IndexKey {
    pub fn new(key: impl Into<String>, spec: IndexSpec) -> Self {
        Self {
            key: key.into(),
            spec,
        }
    }
}

/// Subset of index options understood by the supported stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

impl IndexOptions {
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub options: IndexOptions,
}

impl Index {
    pub fn new(keys: Vec<IndexKey>) -> Self {
        Self {
            keys,
            options: IndexOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Single-key index
    pub fn single(key: impl Into<String>, spec: IndexSpec, options: IndexOptions) -> Self {
        Self {
            keys: vec![IndexKey::new(key, spec)],
            options,
        }
    }
}
