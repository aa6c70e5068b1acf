//! Store model instances in a shared cache for fast REST reads.
//!
//! Reads fetch serialized instances by primary key from the cache and rebuild
//! misses through per-model loaders. Writes update the cached copy and
//! cascade to related instances, inline or through a background queue.

pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::MemoryCache;
pub use config::{CacheConfig, InvalidationMode};
pub use core::instance_cache::{CacheSettings, CascadeReport, InstanceCache};
pub use core::invalidation::{InvalidationQueue, QueueSettings, QueueStats, UpdateTask};
pub use core::queryset::CachedQueryset;
pub use core::registry::ModelRegistry;
pub use domain::cached::{CachedModel, PkOnlyModel, PkOnlyQueryset};
pub use domain::fields::{FieldValue, NativeBuilder};
pub use domain::model::{CachedEntry, Invalidation, ModelRef, ObjectSpec, PendingUpdate, Pk};
pub use domain::ports::{CacheBackend, ConfigProvider, ModelCache, PkQuery};
pub use utils::error::{CacheError, Result};
