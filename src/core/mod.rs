pub mod instance_cache;
pub mod invalidation;
pub mod queryset;
pub mod registry;

pub use crate::domain::model::{CachedEntry, Invalidation, ObjectSpec, PendingUpdate, Pk};
pub use crate::domain::ports::{CacheBackend, ConfigProvider, ModelCache, PkQuery};
pub use crate::utils::error::Result;
