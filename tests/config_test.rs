use anyhow::Result;
use cached_instances::adapters::build_backend;
use cached_instances::app::poll::{poll_registry, PollStore};
use cached_instances::utils::validation::Validate;
use cached_instances::{CacheConfig, CacheError, InstanceCache, InvalidationMode, Pk};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn demo_path(name: &str) -> String {
    format!("{}/demos/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_load_from_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("cache.toml");
    std::fs::write(
        &config_path,
        r#"
[cache]
key_prefix = "${CACHED_INSTANCES_TEST_PREFIX}"
default_version = "v1"
versions = ["v1", "v2"]

[invalidation]
mode = "sync"
"#,
    )?;

    std::env::set_var("CACHED_INSTANCES_TEST_PREFIX", "polls");
    let config = CacheConfig::from_file(&config_path)?;
    std::env::remove_var("CACHED_INSTANCES_TEST_PREFIX");

    assert_eq!(config.cache.key_prefix, "polls");
    assert_eq!(config.cache.versions, vec!["v1", "v2"]);
    assert_eq!(config.invalidation.mode, InvalidationMode::Sync);
    assert_eq!(config.backend.r#type, "memory");
    assert!(config.validate().is_ok());
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let result = CacheConfig::from_file(Path::new("/definitely/not/here/cache.toml"));
    assert!(matches!(result, Err(CacheError::IoError(_))));
}

#[test]
fn test_malformed_toml() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("broken.toml");
    std::fs::write(&config_path, "[cache\nenabled = ")?;

    let err = CacheConfig::from_file(&config_path).unwrap_err();
    assert!(matches!(err, CacheError::ConfigValidationError { .. }));
    Ok(())
}

#[test]
fn test_invalid_mode_is_rejected() {
    let result = CacheConfig::from_toml_str("[invalidation]\nmode = \"later\"\n");
    assert!(result.is_err());
}

#[test]
fn test_prefix_with_whitespace_is_rejected() -> Result<()> {
    let config = CacheConfig::from_toml_str("[cache]\nkey_prefix = \"my cache\"\n")?;
    assert!(config.validate().is_err());
    Ok(())
}

#[tokio::test]
async fn test_demo_files_wire_up() -> Result<()> {
    let mut config = CacheConfig::from_file(demo_path("cache.toml"))?;
    config.cache.enabled = true;
    config.validate()?;

    let store = Arc::new(PollStore::from_fixture(demo_path("poll.json"))?);
    let backend = build_backend(&config.backend)?;
    let registry = poll_registry(Arc::clone(&store), &config.cache.versions);
    let cache = InstanceCache::from_config(&config, backend, registry)?;

    let question = cache
        .get_instance("Question", &Pk::Int(1), None)
        .await?
        .expect("demo question 1");
    assert_eq!(question.key, "drfc_default_Question_1");
    assert_eq!(
        question.instance["question_text"].as_str(),
        Some("What's up?")
    );
    Ok(())
}
