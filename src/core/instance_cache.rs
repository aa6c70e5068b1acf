use crate::core::registry::{ModelRegistry, Registration};
use crate::domain::fields::decode_native;
use crate::domain::model::{CachedEntry, Invalidation, ModelObject, Native, ObjectSpec, PendingUpdate, Pk};
use crate::domain::ports::{CacheBackend, ConfigProvider};
use crate::utils::error::{CacheError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_KEY_PREFIX: &str = "drfc";
pub const DEFAULT_VERSION: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub key_prefix: String,
    pub default_version: String,
    pub versions: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_version: DEFAULT_VERSION.to_string(),
            versions: vec![DEFAULT_VERSION.to_string()],
        }
    }
}

impl CacheSettings {
    pub fn from_provider<C: ConfigProvider + ?Sized>(config: &C) -> Self {
        Self {
            enabled: config.cache_enabled(),
            key_prefix: config.key_prefix().to_string(),
            default_version: config.default_version().to_string(),
            versions: config.versions().to_vec(),
        }
    }
}

/// Instance cache engine.
///
/// Reads go through [`InstanceCache::get_instances`]; writes call
/// [`InstanceCache::update_instance`] (directly or through the invalidation
/// queue) after the database has changed.
///
/// When the cache is disabled there is no backend: reads always rebuild from
/// the loaders and updates do nothing.
pub struct InstanceCache {
    backend: Option<Arc<dyn CacheBackend>>,
    registry: ModelRegistry,
    settings: CacheSettings,
}

impl InstanceCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        registry: ModelRegistry,
        settings: CacheSettings,
    ) -> Result<Self> {
        let backend = if settings.enabled { Some(backend) } else { None };
        Self::build(backend, registry, settings)
    }

    pub fn disabled(registry: ModelRegistry, settings: CacheSettings) -> Result<Self> {
        Self::build(
            None,
            registry,
            CacheSettings {
                enabled: false,
                ..settings
            },
        )
    }

    pub fn from_config<C: ConfigProvider + ?Sized>(
        config: &C,
        backend: Arc<dyn CacheBackend>,
        registry: ModelRegistry,
    ) -> Result<Self> {
        Self::new(backend, registry, CacheSettings::from_provider(config))
    }

    fn build(
        backend: Option<Arc<dyn CacheBackend>>,
        registry: ModelRegistry,
        settings: CacheSettings,
    ) -> Result<Self> {
        if !settings.versions.contains(&settings.default_version) {
            return Err(CacheError::ConfigValidationError {
                field: "cache.default_version".to_string(),
                message: format!(
                    "'{}' is not one of the configured versions {:?}",
                    settings.default_version, settings.versions
                ),
            });
        }
        Ok(Self {
            backend,
            registry,
            settings,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&Arc<dyn CacheBackend>> {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn default_version(&self) -> &str {
        &self.settings.default_version
    }

    pub fn versions(&self) -> &[String] {
        &self.settings.versions
    }

    /// `drfc_default_User_1`
    pub fn key_for(&self, version: &str, model: &str, pk: &Pk) -> String {
        format!("{}_{}_{}_{}", self.settings.key_prefix, version, model, pk)
    }

    pub async fn delete_all_versions(&self, model: &str, pk: &Pk) -> Result<()> {
        if let Some(backend) = &self.backend {
            for version in &self.settings.versions {
                backend.delete(&self.key_for(version, model, pk)).await?;
            }
        }
        Ok(())
    }

    /// Fetch decoded instances for a batch of specs.
    ///
    /// Keys are read with one `get_many` and misses are written back with one
    /// `set_many`. Instances that do not exist are left out of the result.
    /// Backend failures are logged and treated as misses.
    pub async fn get_instances(
        &self,
        specs: Vec<ObjectSpec>,
        version: Option<&str>,
    ) -> Result<HashMap<(String, Pk), CachedEntry>> {
        let version = version.unwrap_or(self.settings.default_version.as_str());

        // 去重，保留呼叫端已載入的物件
        let mut ordered: Vec<(ObjectSpec, String)> = Vec::with_capacity(specs.len());
        let mut seen: HashMap<(String, Pk), usize> = HashMap::new();
        for spec in specs {
            if spec.model.is_empty() {
                return Err(CacheError::InvalidSpec {
                    reason: "model name cannot be empty".to_string(),
                });
            }
            if !spec.pk.is_valid() {
                return Err(CacheError::InvalidSpec {
                    reason: format!("'{}' is not a usable primary key for {}", spec.pk, spec.model),
                });
            }

            let id = (spec.model.clone(), spec.pk.clone());
            match seen.get(&id).copied() {
                Some(index) => {
                    if ordered[index].0.object.is_none() {
                        ordered[index].0.object = spec.object;
                    }
                }
                None => {
                    let key = self.key_for(version, &spec.model, &spec.pk);
                    seen.insert(id, ordered.len());
                    ordered.push((spec, key));
                }
            }
        }

        let cache_keys: Vec<String> = ordered.iter().map(|(_, key)| key.clone()).collect();
        let cached = match &self.backend {
            Some(backend) if !cache_keys.is_empty() => match backend.get_many(&cache_keys).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, "cache get_many failed, rebuilding from loaders");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };

        tracing::debug!(
            requested = cache_keys.len(),
            hits = cached.len(),
            version = %version,
            "instance cache lookup"
        );

        let mut result = HashMap::with_capacity(ordered.len());
        let mut to_set: HashMap<String, String> = HashMap::new();

        for (spec, key) in ordered {
            let handler = self.registry.serializer(&spec.model, version)?;

            let mut object = spec.object;
            let native = match cached.get(&key).and_then(|raw| parse_native(&key, raw)) {
                Some(native) if !native.is_empty() => native,
                _ => {
                    if object.is_none() {
                        object = handler.load(&spec.pk).await?;
                    }
                    let native = match &object {
                        Some(obj) => handler.serialize(obj)?.unwrap_or_default(),
                        None => Native::new(),
                    };
                    if !native.is_empty() {
                        to_set.insert(key.clone(), serde_json::to_string(&native)?);
                    }
                    native
                }
            };

            if native.is_empty() {
                tracing::debug!(model = %spec.model, pk = %spec.pk, "instance not found");
                continue;
            }

            let instance = decode_native(native)?;
            result.insert(
                (spec.model, spec.pk),
                CachedEntry {
                    instance,
                    key,
                    object,
                },
            );
        }

        if let Some(backend) = &self.backend {
            if !to_set.is_empty() {
                let count = to_set.len();
                match backend.set_many(to_set).await {
                    Ok(()) => tracing::debug!(count, "stored rebuilt instances"),
                    Err(e) => tracing::warn!(error = %e, count, "cache set_many failed"),
                }
            }
        }

        Ok(result)
    }

    pub async fn get_instance(
        &self,
        model: &str,
        pk: &Pk,
        version: Option<&str>,
    ) -> Result<Option<CachedEntry>> {
        let mut found = self
            .get_instances(vec![ObjectSpec::new(model, pk.clone())], version)
            .await?;
        Ok(found.remove(&(model.to_string(), pk.clone())))
    }

    /// Refresh the cached representation of an instance after a write.
    ///
    /// With `update_only`, entries that are not already cached are left
    /// alone and cause no follow-on invalidation. Returns the related
    /// instances that still need updating; `immediate` ones have already
    /// been deleted from the cache.
    pub async fn update_instance(
        &self,
        model: &str,
        pk: &Pk,
        object: Option<ModelObject>,
        version: Option<&str>,
        update_only: bool,
    ) -> Result<Vec<PendingUpdate>> {
        let versions: Vec<String> = match version {
            Some(v) => vec![v.to_string()],
            None => self.settings.versions.clone(),
        };

        let mut pending = Vec::new();
        for version in &versions {
            let handler = match self.registry.lookup(model, version)? {
                Registration::Handled(handler) => Arc::clone(handler),
                Registration::Unhandled => {
                    tracing::debug!(model, version = %version, "model is not cached, skipping");
                    continue;
                }
            };
            let Some(backend) = &self.backend else {
                continue;
            };

            let object = match &object {
                Some(obj) => Some(Arc::clone(obj)),
                None => handler.load(pk).await?,
            };

            let invalidate = if handler.serializes() {
                let key = self.key_for(version, model, pk);
                let current_raw = backend.get(&key).await?;
                let current = current_raw.as_deref().and_then(|raw| parse_native(&key, raw));

                let new = match (&object, update_only && current_raw.is_none()) {
                    (Some(obj), false) => handler.serialize(obj)?,
                    _ => None,
                };
                let deleted = object.is_none();

                let invalidate = current != new || deleted;
                if invalidate {
                    match (&new, deleted) {
                        (Some(native), false) => {
                            backend.set(&key, serde_json::to_string(native)?).await?;
                            tracing::debug!(key = %key, "cached instance refreshed");
                        }
                        _ => {
                            backend.delete(&key).await?;
                            tracing::debug!(key = %key, "cached instance removed");
                        }
                    }
                }
                invalidate
            } else {
                true
            };

            let Some(obj) = object.filter(|_| invalidate) else {
                continue;
            };

            for upstream in handler.invalidate(&obj).await? {
                match upstream {
                    Invalidation::Key(key) => {
                        backend.delete(&key).await?;
                        tracing::debug!(key = %key, "dependent key deleted");
                    }
                    Invalidation::Instance {
                        model: related,
                        pk: related_pk,
                        immediate,
                    } => {
                        if immediate {
                            backend
                                .delete(&self.key_for(version, &related, &related_pk))
                                .await?;
                        }
                        pending.push(PendingUpdate::new(related, related_pk, version.clone()));
                    }
                }
            }
        }

        Ok(pending)
    }

    /// Run `update_instance` and every follow-up inline, breadth first.
    ///
    /// Follow-ups run with `update_only` so only entries that are already
    /// cached get rebuilt. Each (model, pk, version) is visited once per
    /// cascade; follow-up failures are logged and counted, not returned.
    pub async fn update_cascade(
        &self,
        model: &str,
        pk: &Pk,
        version: Option<&str>,
        update_only: bool,
    ) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();
        let mut visited: HashSet<(String, Pk, String)> = HashSet::new();
        let root_versions: Vec<String> = match version {
            Some(v) => vec![v.to_string()],
            None => self.settings.versions.clone(),
        };
        for v in root_versions {
            visited.insert((model.to_ascii_lowercase(), pk.clone(), v));
        }

        let mut queue: std::collections::VecDeque<PendingUpdate> = self
            .update_instance(model, pk, None, version, update_only)
            .await?
            .into();
        report.updated += 1;

        while let Some(next) = queue.pop_front() {
            let visit = (next.model.to_ascii_lowercase(), next.pk.clone(), next.version.clone());
            if !visited.insert(visit) {
                continue;
            }

            match self
                .update_instance(&next.model, &next.pk, None, Some(&next.version), true)
                .await
            {
                Ok(more) => {
                    report.updated += 1;
                    queue.extend(more);
                }
                Err(e) => {
                    tracing::warn!(
                        model = %next.model,
                        pk = %next.pk,
                        version = %next.version,
                        error = %e,
                        "follow-up update failed"
                    );
                    report.failed.push(next);
                }
            }
        }

        Ok(report)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Number of `update_instance` calls that succeeded, root included.
    pub updated: usize,
    pub failed: Vec<PendingUpdate>,
}

fn parse_native(key: &str, raw: &str) -> Option<Native> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(native)) => Some(native),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring unreadable cache entry");
            None
        }
    }
}
