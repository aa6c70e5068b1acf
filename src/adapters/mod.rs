// Adapters layer: concrete cache backends behind the CacheBackend port.

pub mod memory;

pub use memory::MemoryCache;

use crate::config::toml_config::BackendSection;
use crate::domain::ports::CacheBackend;
use crate::utils::error::{CacheError, Result};
use std::sync::Arc;

pub fn build_backend(section: &BackendSection) -> Result<Arc<dyn CacheBackend>> {
    match section.r#type.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new(section.max_capacity, section.ttl()))),
        other => Err(CacheError::InvalidConfigValueError {
            field: "backend.type".to_string(),
            value: other.to_string(),
            reason: "Unsupported cache backend".to_string(),
        }),
    }
}
