//! Field descriptors and per-field validation
//!
//! Descriptors are plain data assembled once when a schema is built.
//! Validation is a pure function of a descriptor and a value; the only check
//! needing storage (reference existence) is left to the lifecycle layer.

use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use regex::Regex;
use serde_json::Value;

use crate::domain::DomainError;

use super::index::{IndexDirection, IndexOptions, IndexSpec};
use super::reference::OnDestroy;

/// Value assigned to a field when a record is created without it
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory(<fn>)"),
        }
    }
}

/// Inclusive numeric bounds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumberBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Inclusive length bounds for strings (in characters) and lists (in items)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LengthBounds {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

/// Field type together with its type-specific constraints
#[derive(Debug, Clone)]
pub enum FieldKind {
    Any,
    String {
        length: LengthBounds,
        pattern: Option<Regex>,
        auto_trim: bool,
    },
    Int(NumberBounds),
    Float(NumberBounds),
    Bool,
    List(LengthBounds),
    Dict,
    Datetime,
    ObjectId,
    Reference {
        target: String,
        on_destroy: OnDestroy,
    },
    SelfReference {
        on_destroy: OnDestroy,
    },
}

impl FieldKind {
    /// Names of the accepted JSON shapes, empty when any value is accepted
    fn accepted_types(&self) -> &'static [&'static str] {
        match self {
            Self::String { .. } => &["string"],
            Self::Int(_) => &["int"],
            Self::Float(_) => &["int", "float"],
            Self::Bool => &["bool"],
            Self::List(_) => &["list"],
            Self::Dict => &["dict"],
            Self::Datetime => &["datetime"],
            Self::Any | Self::ObjectId | Self::Reference { .. } | Self::SelfReference { .. } => &[],
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String { .. } => value.is_string(),
            Self::Int(_) => value.is_i64() || value.is_u64(),
            Self::Float(_) => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List(_) => value.is_array(),
            Self::Dict => value.is_object(),
            Self::Datetime => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Any | Self::ObjectId | Self::Reference { .. } | Self::SelfReference { .. } => {
                true
            }
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. } | Self::SelfReference { .. })
    }
}

/// One declared field of a model type
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    required: bool,
    rejected: bool,
    restricted: bool,
    default: Option<DefaultValue>,
    index: Option<IndexSpec>,
    index_options: IndexOptions,
    choices: Option<Vec<Value>>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let index = match kind {
            FieldKind::Reference { .. } | FieldKind::SelfReference { .. } => {
                Some(IndexSpec::Direction(IndexDirection::Ascending))
            }
            _ => None,
        };

        Self {
            name: name.into(),
            kind,
            required: false,
            rejected: false,
            restricted: false,
            default: None,
            index,
            index_options: IndexOptions::default(),
            choices: None,
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Any)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::String {
                length: LengthBounds::default(),
                pattern: None,
                auto_trim: true,
            },
        )
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int(NumberBounds::default()))
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float(NumberBounds::default()))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List(LengthBounds::default()))
    }

    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Datetime)
    }

    pub fn object_id(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ObjectId)
    }

    /// Reference to another model type, indexed by default, Raise on destroy
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                target: target.into(),
                on_destroy: OnDestroy::Raise,
            },
        )
    }

    /// Reference to the declaring type itself
    pub fn self_reference(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::SelfReference {
                on_destroy: OnDestroy::Raise,
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Rejected fields are ignored by bulk attribute updates
    pub fn rejected(mut self) -> Self {
        self.rejected = true;
        self
    }

    /// Restricted fields are hidden from exported documents unless asked for
    pub fn restricted(mut self) -> Self {
        self.restricted = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    pub fn indexed(mut self) -> Self {
        self.index = Some(IndexSpec::Direction(IndexDirection::Ascending));
        self
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.index = Some(spec);
        self
    }

    pub fn without_index(mut self) -> Self {
        self.index = None;
        self.index_options.unique = false;
        self
    }

    /// Unique implies an ascending index unless another spec was chosen
    pub fn unique(mut self) -> Self {
        if self.index.is_none() {
            self.index = Some(IndexSpec::Direction(IndexDirection::Ascending));
        }
        self.index_options.unique = true;
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let choices: Vec<Value> = choices.into_iter().map(Into::into).collect();
        self.choices = if choices.is_empty() { None } else { Some(choices) };
        self
    }

    pub fn on_destroy(mut self, policy: OnDestroy) -> Self {
        match &mut self.kind {
            FieldKind::Reference { on_destroy, .. } | FieldKind::SelfReference { on_destroy } => {
                *on_destroy = policy;
            }
            _ => {}
        }
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        match &mut self.kind {
            FieldKind::String { length, .. } | FieldKind::List(length) => length.min = Some(min),
            _ => {}
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        match &mut self.kind {
            FieldKind::String { length, .. } | FieldKind::List(length) => length.max = Some(max),
            _ => {}
        }
        self
    }

    pub fn min_value(mut self, min: f64) -> Self {
        if let FieldKind::Int(bounds) | FieldKind::Float(bounds) = &mut self.kind {
            bounds.min = Some(min);
        }
        self
    }

    pub fn max_value(mut self, max: f64) -> Self {
        if let FieldKind::Int(bounds) | FieldKind::Float(bounds) = &mut self.kind {
            bounds.max = Some(max);
        }
        self
    }

    /// Requires string values to match the pattern from their first character
    pub fn matching(mut self, pattern: &str) -> Result<Self, DomainError> {
        let compiled = Regex::new(pattern).map_err(|e| {
            DomainError::configuration(format!("Invalid pattern for field {}: {}", self.name, e))
        })?;
        if let FieldKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(compiled);
        }
        Ok(self)
    }

    pub fn without_trim(mut self) -> Self {
        if let FieldKind::String { auto_trim, .. } = &mut self.kind {
            *auto_trim = false;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    pub fn index_spec(&self) -> Option<&IndexSpec> {
        self.index.as_ref()
    }

    pub fn index_options(&self) -> &IndexOptions {
        &self.index_options
    }

    /// Destroy policy for reference fields
    pub fn destroy_policy(&self) -> Option<OnDestroy> {
        match &self.kind {
            FieldKind::Reference { on_destroy, .. } | FieldKind::SelfReference { on_destroy } => {
                Some(*on_destroy)
            }
            _ => None,
        }
    }

    /// Referenced type name; self references resolve to the declaring type
    pub fn reference_target<'a>(&'a self, owner: &'a str) -> Option<&'a str> {
        match &self.kind {
            FieldKind::Reference { target, .. } => Some(target),
            FieldKind::SelfReference { .. } => Some(owner),
            _ => None,
        }
    }

    /// Value for a record created without this field
    pub fn default_for_new(&self) -> Value {
        self.default
            .as_ref()
            .map(DefaultValue::produce)
            .unwrap_or(Value::Null)
    }

    /// Applies assignment-time normalization (string auto-trim)
    pub fn normalize(&self, value: Value) -> Value {
        match (&self.kind, value) {
            (FieldKind::String { auto_trim: true, .. }, Value::String(s)) => {
                Value::String(s.trim().to_string())
            }
            (_, value) => value,
        }
    }

    pub(crate) fn check_declaration(&self) -> Result<(), DomainError> {
        if self.required && self.destroy_policy() == Some(OnDestroy::Detach) {
            return Err(DomainError::configuration(format!(
                "cannot auto-detach a required reference {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Checks a value against every constraint of this descriptor
    pub fn validate(&self, value: &Value) -> Result<(), DomainError> {
        if value.is_null() {
            if self.required {
                return Err(DomainError::validation(format!(
                    "field {} is required",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.kind.accepts(value) {
            return Err(DomainError::validation(format!(
                "field {} must be any of {:?}",
                self.name,
                self.kind.accepted_types()
            )));
        }

        if let Some(choices) = &self.choices {
            if !choices.contains(value) {
                return Err(DomainError::validation(format!(
                    "field {} must be one of {}",
                    self.name,
                    Value::Array(choices.clone())
                )));
            }
        }

        match &self.kind {
            FieldKind::String {
                length, pattern, ..
            } => {
                let s = value.as_str().unwrap_or_default();
                self.check_length(s.chars().count(), length, "characters")?;

                if let Some(pattern) = pattern {
                    let anchored = pattern.find(s).is_some_and(|m| m.start() == 0);
                    if !anchored {
                        return Err(DomainError::validation(format!(
                            "field {} must match pattern \"{}\"",
                            self.name,
                            pattern.as_str()
                        )));
                    }
                }
            }
            FieldKind::Int(bounds) | FieldKind::Float(bounds) => {
                let n = value.as_f64().unwrap_or_default();
                if let Some(min) = bounds.min {
                    if n < min {
                        return Err(DomainError::validation(format!(
                            "field {} must be >= {}",
                            self.name, min
                        )));
                    }
                }
                if let Some(max) = bounds.max {
                    if n > max {
                        return Err(DomainError::validation(format!(
                            "field {} must be <= {}",
                            self.name, max
                        )));
                    }
                }
            }
            FieldKind::List(length) => {
                let len = value.as_array().map(Vec::len).unwrap_or_default();
                self.check_length(len, length, "items")?;
            }
            _ => {}
        }

        Ok(())
    }

    fn check_length(&self, len: usize, bounds: &LengthBounds, unit: &str) -> Result<(), DomainError> {
        if let Some(min) = bounds.min {
            if len < min {
                return Err(DomainError::validation(format!(
                    "field {} must be at least {} {} long",
                    self.name, min, unit
                )));
            }
        }
        if let Some(max) = bounds.max {
            if len > max {
                return Err(DomainError::validation(format!(
                    "field {} must be at most {} {} long",
                    self.name, max, unit
                )));
            }
        }
        Ok(())
    }
}
