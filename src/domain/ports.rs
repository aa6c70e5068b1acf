use crate::domain::model::{Invalidation, Native, Pk};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared key/value store holding serialized instances as JSON strings.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Missing keys are absent from the returned map.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set_many(&self, entries: HashMap<String, String>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }
}

pub trait ConfigProvider: Send + Sync {
    fn cache_enabled(&self) -> bool;
    fn key_prefix(&self) -> &str;
    fn default_version(&self) -> &str;
    fn versions(&self) -> &[String];
}

/// Per-model caching strategy: how to load an instance, how to serialize it,
/// and what else goes stale when it changes.
#[async_trait]
pub trait ModelCache: Send + Sync + 'static {
    type Object: Send + Sync + 'static;

    /// `Ok(None)` when the instance does not exist.
    async fn load(&self, pk: &Pk) -> Result<Option<Self::Object>>;

    /// Models that only cascade invalidation return `false` here.
    fn serializes(&self) -> bool {
        true
    }

    fn serialize(&self, object: &Self::Object) -> Result<Option<Native>>;

    async fn invalidate(&self, object: &Self::Object) -> Result<Vec<Invalidation>>;
}

/// Source of primary keys for a cached queryset. Each call on the store
/// counts as one query.
#[async_trait]
pub trait PkQuery: Send + Sync {
    async fn fetch_pks(&self) -> Result<Vec<Pk>>;

    async fn count(&self) -> Result<usize>;

    /// Lazily narrow the query; must not touch the store.
    fn slice(&self, offset: usize, limit: Option<usize>) -> Arc<dyn PkQuery>;
}
