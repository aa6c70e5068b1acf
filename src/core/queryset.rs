use crate::core::instance_cache::InstanceCache;
use crate::domain::cached::CachedModel;
use crate::domain::model::{ObjectSpec, Pk};
use crate::domain::ports::PkQuery;
use crate::utils::error::{CacheError, Result};
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

/// List-view queryset backed by the instance cache.
///
/// Only the primary keys come from the store (one query); every instance is
/// read through [`InstanceCache::get_instances`].
#[derive(Clone)]
pub struct CachedQueryset {
    cache: Arc<InstanceCache>,
    model: String,
    query: Arc<dyn PkQuery>,
    primary_keys: Option<Vec<Pk>>,
}

impl CachedQueryset {
    pub fn new(
        cache: Arc<InstanceCache>,
        model: impl Into<String>,
        query: Arc<dyn PkQuery>,
        primary_keys: Option<Vec<Pk>>,
    ) -> Self {
        Self {
            cache,
            model: model.into(),
            query,
            primary_keys,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Primary keys already held, without querying.
    pub fn cached_pks(&self) -> Option<&[Pk]> {
        self.primary_keys.as_deref()
    }

    pub async fn pks(&mut self) -> Result<&[Pk]> {
        if self.primary_keys.is_none() {
            let pks = self.query.fetch_pks().await?;
            tracing::debug!(model = %self.model, count = pks.len(), "loaded primary keys");
            self.primary_keys = Some(pks);
        }
        Ok(self.primary_keys.as_deref().unwrap_or_default())
    }

    /// Held keys are counted in memory; otherwise a count query runs and the
    /// keys stay unloaded.
    pub async fn count(&self) -> Result<usize> {
        match &self.primary_keys {
            Some(pks) => Ok(pks.len()),
            None => self.query.count().await,
        }
    }

    pub fn none(&self) -> Self {
        Self {
            primary_keys: Some(Vec::new()),
            ..self.clone()
        }
    }

    /// Lazy slice: nothing is queried until the result is used.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Self {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => Some(n.saturating_add(1)),
            Bound::Excluded(&n) => Some(n),
            Bound::Unbounded => None,
        };

        match &self.primary_keys {
            Some(pks) => {
                let from = start.min(pks.len());
                let to = end.unwrap_or(pks.len()).clamp(from, pks.len());
                Self {
                    primary_keys: Some(pks[from..to].to_vec()),
                    ..self.clone()
                }
            }
            None => {
                let limit = end.map(|e| e.saturating_sub(start));
                Self {
                    query: self.query.slice(start, limit),
                    ..self.clone()
                }
            }
        }
    }

    pub async fn get(&self, pk: &Pk) -> Result<CachedModel> {
        let entry = self.cache.get_instance(&self.model, pk, None).await?;
        entry
            .map(|entry| CachedModel::new(self.model.clone(), entry.instance))
            .ok_or_else(|| CacheError::DoesNotExist {
                model: self.model.clone(),
                pk: pk.to_string(),
            })
    }

    /// Every instance in primary-key order. Keys whose instance has vanished
    /// since the key query are skipped.
    pub async fn instances(&mut self) -> Result<Vec<CachedModel>> {
        let model = self.model.clone();
        let cache = Arc::clone(&self.cache);
        let pks = self.pks().await?.to_vec();

        let specs = pks.iter().map(|pk| ObjectSpec::new(model.clone(), pk.clone())).collect();
        let mut found = cache.get_instances(specs, None).await?;

        Ok(pks
            .into_iter()
            .filter_map(|pk| found.remove(&(model.clone(), pk)))
            .map(|entry| CachedModel::new(model.clone(), entry.instance))
            .collect())
    }
}
