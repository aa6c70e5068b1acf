//! Stand-ins handed to readers instead of database-backed model instances.
//!
//! They carry only what the cache stored. Reading anything else is an error,
//! not a silent database hit.

use crate::domain::fields::{CachedInstance, FieldValue};
use crate::domain::model::{ModelRef, Pk};
use crate::utils::error::{CacheError, Result};

/// A model instance rebuilt from its cached representation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModel {
    model: String,
    data: CachedInstance,
}

impl CachedModel {
    pub fn new(model: impl Into<String>, data: CachedInstance) -> Self {
        Self {
            model: model.into(),
            data,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Attribute access. Missing attributes are `MissingAttribute`.
    pub fn get(&self, attribute: &str) -> Result<&FieldValue> {
        self.data
            .get(attribute)
            .ok_or_else(|| CacheError::MissingAttribute {
                model: self.model.clone(),
                attribute: attribute.to_string(),
            })
    }

    pub fn pk(&self) -> Option<Pk> {
        ["pk", "id"]
            .iter()
            .filter_map(|name| self.data.get(*name))
            .find_map(|value| value.as_json().and_then(Pk::from_json))
    }

    pub fn data(&self) -> &CachedInstance {
        &self.data
    }

    pub fn into_data(self) -> CachedInstance {
        self.data
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.data
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// A related instance known only by its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkOnlyModel {
    pub model: ModelRef,
    pub pk: Pk,
}

impl PkOnlyModel {
    pub fn new(model: ModelRef, pk: Pk) -> Self {
        Self { model, pk }
    }
}

/// A to-many relation known only by its primary keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkOnlyQueryset {
    pub model: ModelRef,
    pub pks: Vec<Pk>,
}

impl PkOnlyQueryset {
    pub fn new(model: ModelRef, pks: Vec<Pk>) -> Self {
        Self { model, pks }
    }

    pub fn count(&self) -> usize {
        self.pks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PkOnlyModel> + '_ {
        self.pks
            .iter()
            .map(|pk| PkOnlyModel::new(self.model.clone(), pk.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_data() {
        let mut data = CachedInstance::new();
        data.insert("username".to_string(), FieldValue::Json(json!("frank")));
        let cm = CachedModel::new("User", data);
        assert_eq!(cm.get("username").unwrap().as_str(), Some("frank"));
    }

    #[test]
    fn test_does_not_have_data() {
        let mut data = CachedInstance::new();
        data.insert("username".to_string(), FieldValue::Json(json!("frank")));
        let cm = CachedModel::new("User", data);
        let err = cm.get("email").unwrap_err();
        assert!(matches!(err, CacheError::MissingAttribute { attribute, .. } if attribute == "email"));
    }

    #[test]
    fn test_pk_from_id() {
        let mut data = CachedInstance::new();
        data.insert("id".to_string(), FieldValue::Json(json!(5)));
        assert_eq!(CachedModel::new("User", data).pk(), Some(Pk::Int(5)));
    }

    #[test]
    fn test_pk_only_queryset_iter() {
        let qs = PkOnlyQueryset::new(ModelRef::new("auth", "user"), vec![1.into(), 2.into()]);
        let models: Vec<PkOnlyModel> = qs.iter().collect();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].pk, Pk::Int(2));
    }
}
