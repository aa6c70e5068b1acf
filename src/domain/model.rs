use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::fields::CachedInstance;

/// The JSON object stored in the cache for one instance. Typed fields use
/// `"name:TypeCode"` keys, see [`crate::domain::fields`].
pub type Native = serde_json::Map<String, serde_json::Value>;

/// An already-loaded model instance, type-erased so that specs for different
/// models can travel in one batch. Handlers downcast to their own type.
pub type ModelObject = Arc<dyn Any + Send + Sync>;

pub fn model_object<T: Any + Send + Sync>(value: T) -> ModelObject {
    Arc::new(value)
}

/// Primary key of a cached instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pk {
    Int(i64),
    Str(String),
}

impl Pk {
    /// 0 and "" are not usable primary keys.
    pub fn is_valid(&self) -> bool {
        match self {
            Pk::Int(value) => *value != 0,
            Pk::Str(value) => !value.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Pk::Int(value) => Some(*value),
            Pk::Str(value) => value.parse().ok(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Pk::Int(value) => serde_json::Value::from(*value),
            Pk::Str(value) => serde_json::Value::from(value.as_str()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Pk::Int),
            serde_json::Value::String(s) => Some(Pk::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pk::Int(value) => write!(f, "{}", value),
            Pk::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Pk {
    fn from(value: i64) -> Self {
        Pk::Int(value)
    }
}

impl From<&str> for Pk {
    fn from(value: &str) -> Self {
        Pk::Str(value.to_string())
    }
}

impl From<String> for Pk {
    fn from(value: String) -> Self {
        Pk::Str(value)
    }
}

impl FromStr for Pk {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>().map(Pk::Int).unwrap_or_else(|_| Pk::Str(s.to_string())))
    }
}

/// Identifies a model inside PK / PKList field payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub app: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(app: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.model)
    }
}

/// One requested instance: model name, primary key, and the instance itself
/// when the caller already has it.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub model: String,
    pub pk: Pk,
    pub object: Option<ModelObject>,
}

impl ObjectSpec {
    pub fn new(model: impl Into<String>, pk: impl Into<Pk>) -> Self {
        Self {
            model: model.into(),
            pk: pk.into(),
            object: None,
        }
    }

    pub fn with_object(mut self, object: ModelObject) -> Self {
        self.object = Some(object);
        self
    }
}

/// Result of a cache read for one instance.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub instance: CachedInstance,
    pub key: String,
    pub object: Option<ModelObject>,
}

/// Follow-on work produced by a handler when its instance changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Delete a raw cache key, e.g. an aggregate count.
    Key(String),
    /// A related instance whose cached representation may be stale.
    /// `immediate` entries are deleted right away, before the follow-up runs.
    Instance {
        model: String,
        pk: Pk,
        immediate: bool,
    },
}

impl Invalidation {
    pub fn key(key: impl Into<String>) -> Self {
        Invalidation::Key(key.into())
    }

    pub fn instance(model: impl Into<String>, pk: impl Into<Pk>, immediate: bool) -> Self {
        Invalidation::Instance {
            model: model.into(),
            pk: pk.into(),
            immediate,
        }
    }
}

/// An instance that still needs `update_instance` for one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingUpdate {
    pub model: String,
    pub pk: Pk,
    pub version: String,
}

impl PendingUpdate {
    pub fn new(model: impl Into<String>, pk: impl Into<Pk>, version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            pk: pk.into(),
            version: version.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pk_validity() {
        assert!(Pk::from(1).is_valid());
        assert!(!Pk::from(0).is_valid());
        assert!(Pk::from("slug").is_valid());
        assert!(!Pk::from("").is_valid());
    }

    #[test]
    fn test_pk_parse_and_display() {
        assert_eq!("42".parse::<Pk>().unwrap(), Pk::Int(42));
        assert_eq!("frank".parse::<Pk>().unwrap(), Pk::Str("frank".to_string()));
        assert_eq!(Pk::Int(7).to_string(), "7");
    }

    #[test]
    fn test_pk_json() {
        assert_eq!(Pk::from_json(&serde_json::json!(3)), Some(Pk::Int(3)));
        assert_eq!(Pk::from_json(&serde_json::json!("a")), Some(Pk::from("a")));
        assert_eq!(Pk::from_json(&serde_json::json!(null)), None);
    }
}
