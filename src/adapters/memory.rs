use crate::domain::ports::CacheBackend;
use crate::utils::error::Result;
use async_trait::async_trait;
use moka::sync::Cache;
use std::time::Duration;

/// In-process cache backend.
///
/// Only useful for a single process: separate workers each get their own copy
/// and will not see each other's invalidations.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, String>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(max_capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            entries: builder.build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000, Some(Duration::from_secs(300)))
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::default();
        cache.set("drfc_default_User_1", "{}".to_string()).await.unwrap();
        assert_eq!(
            cache.get("drfc_default_User_1").await.unwrap().as_deref(),
            Some("{}")
        );
        cache.delete("drfc_default_User_1").await.unwrap();
        assert!(cache.get("drfc_default_User_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let cache = MemoryCache::default();
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), "1".to_string());
        entries.insert("b".to_string(), "2".to_string());
        cache.set_many(entries).await.unwrap();

        let found = cache
            .get_many(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], "2");
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::default();
        cache.set("a", "1".to_string()).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
    }
}
