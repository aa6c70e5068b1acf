use crate::domain::model::{Invalidation, ModelObject, Native, Pk};
use crate::domain::ports::ModelCache;
use crate::utils::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Object-safe view of a [`ModelCache`], working on type-erased objects.
#[async_trait]
pub trait ErasedModelCache: Send + Sync {
    async fn load(&self, pk: &Pk) -> Result<Option<ModelObject>>;
    fn serializes(&self) -> bool;
    fn serialize(&self, object: &ModelObject) -> Result<Option<Native>>;
    async fn invalidate(&self, object: &ModelObject) -> Result<Vec<Invalidation>>;
}

struct Erased<M> {
    model: String,
    inner: M,
}

impl<M: ModelCache> Erased<M> {
    fn downcast<'a>(&self, object: &'a ModelObject) -> Result<&'a M::Object> {
        object
            .downcast_ref::<M::Object>()
            .ok_or_else(|| CacheError::InvalidSpec {
                reason: format!(
                    "object supplied for '{}' is not a {}",
                    self.model,
                    std::any::type_name::<M::Object>()
                ),
            })
    }
}

#[async_trait]
impl<M: ModelCache> ErasedModelCache for Erased<M> {
    async fn load(&self, pk: &Pk) -> Result<Option<ModelObject>> {
        let loaded = self.inner.load(pk).await?;
        Ok(loaded.map(|object| Arc::new(object) as ModelObject))
    }

    fn serializes(&self) -> bool {
        self.inner.serializes()
    }

    fn serialize(&self, object: &ModelObject) -> Result<Option<Native>> {
        self.inner.serialize(self.downcast(object)?)
    }

    async fn invalidate(&self, object: &ModelObject) -> Result<Vec<Invalidation>> {
        let typed = self.downcast(object)?;
        self.inner.invalidate(typed).await
    }
}

#[derive(Clone)]
pub enum Registration {
    Handled(Arc<dyn ErasedModelCache>),
    /// Known to the cache but deliberately not cached; updates are no-ops.
    Unhandled,
}

/// Handlers keyed by (model, version). Model names match case-insensitively,
/// so `User` and `user` share a handler while keeping their own cache keys.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    handlers: HashMap<(String, String), Registration>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: ModelCache>(&mut self, model: &str, version: &str, handler: M) -> &mut Self {
        let erased = Erased {
            model: model.to_string(),
            inner: handler,
        };
        self.handlers.insert(
            Self::slot(model, version),
            Registration::Handled(Arc::new(erased)),
        );
        self
    }

    pub fn register_unhandled(&mut self, model: &str, version: &str) -> &mut Self {
        self.handlers
            .insert(Self::slot(model, version), Registration::Unhandled);
        self
    }

    pub fn lookup(&self, model: &str, version: &str) -> Result<&Registration> {
        self.handlers
            .get(&Self::slot(model, version))
            .ok_or_else(|| CacheError::UnknownModel {
                model: model.to_string(),
                version: version.to_string(),
            })
    }

    /// Handler that can produce a cached representation.
    pub fn serializer(&self, model: &str, version: &str) -> Result<Arc<dyn ErasedModelCache>> {
        match self.lookup(model, version)? {
            Registration::Handled(handler) if handler.serializes() => Ok(Arc::clone(handler)),
            _ => Err(CacheError::MissingSerializer {
                model: model.to_string(),
                version: version.to_string(),
            }),
        }
    }

    pub fn is_registered(&self, model: &str, version: &str) -> bool {
        self.handlers.contains_key(&Self::slot(model, version))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn slot(model: &str, version: &str) -> (String, String) {
        (model.to_ascii_lowercase(), version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ModelCache for Noop {
        type Object = i64;

        async fn load(&self, pk: &Pk) -> Result<Option<i64>> {
            Ok(pk.as_int())
        }

        fn serialize(&self, object: &i64) -> Result<Option<Native>> {
            let mut native = Native::new();
            native.insert("id".to_string(), (*object).into());
            Ok(Some(native))
        }

        async fn invalidate(&self, _object: &i64) -> Result<Vec<Invalidation>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = ModelRegistry::new();
        registry.register("User", "default", Noop);
        assert!(registry.lookup("user", "default").is_ok());
        assert!(registry.lookup("USER", "default").is_ok());
        assert!(registry.lookup("User", "v2").is_err());
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.lookup("Foo", "default"),
            Err(CacheError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_unhandled_has_no_serializer() {
        let mut registry = ModelRegistry::new();
        registry.register_unhandled("Bar", "default");
        assert!(matches!(
            registry.serializer("Bar", "default"),
            Err(CacheError::MissingSerializer { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_object_type_is_rejected() {
        let mut registry = ModelRegistry::new();
        registry.register("User", "default", Noop);
        let handler = registry.serializer("User", "default").unwrap();
        let wrong: ModelObject = Arc::new("not an i64".to_string());
        assert!(matches!(
            handler.serialize(&wrong),
            Err(CacheError::InvalidSpec { .. })
        ));
        let loaded = handler.load(&Pk::Int(3)).await.unwrap().unwrap();
        assert!(handler.serialize(&loaded).unwrap().is_some());
    }
}
