//! Sample poll application wired to the instance cache.

pub mod handlers;
pub mod models;
pub mod store;

pub use handlers::{ChoiceHandler, GroupHandler, QuestionHandler, UserHandler, USER_COUNT_KEY};
pub use models::{Choice, Group, PollData, PollModel, Question, User, UserRecord};
pub use store::{PollStore, StoreQuery};

use crate::core::queryset::CachedQueryset;
use crate::core::registry::ModelRegistry;
use crate::core::instance_cache::InstanceCache;
use crate::utils::error::{CacheError, Result};
use std::sync::Arc;

/// Registers the poll handlers for every version. `Bar` is known but not
/// cached.
pub fn poll_registry(store: Arc<PollStore>, versions: &[String]) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    for version in versions {
        registry
            .register("User", version, UserHandler::new(Arc::clone(&store)))
            .register("Group", version, GroupHandler::new(Arc::clone(&store)))
            .register("Question", version, QuestionHandler::new(Arc::clone(&store)))
            .register("Choice", version, ChoiceHandler::new(Arc::clone(&store)))
            .register_unhandled("Bar", version);
    }
    registry
}

pub fn poll_queryset(
    cache: Arc<InstanceCache>,
    store: Arc<PollStore>,
    model: &str,
) -> Result<CachedQueryset> {
    let poll_model = PollModel::from_name(model).ok_or_else(|| CacheError::UnknownModel {
        model: model.to_string(),
        version: cache.default_version().to_string(),
    })?;
    let query = Arc::new(StoreQuery::new(store, poll_model));
    Ok(CachedQueryset::new(cache, poll_model.name(), query, None))
}
