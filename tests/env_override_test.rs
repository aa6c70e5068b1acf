// Kept in its own test binary: the override is process-wide and would leak
// into config tests running in parallel.

use anyhow::Result;
use cached_instances::config::toml_config::ENABLE_ENV_VAR;
use cached_instances::{CacheConfig, CacheError};

#[test]
fn test_enable_env_var_overrides_file() -> Result<()> {
    std::env::set_var(ENABLE_ENV_VAR, "false");
    let disabled = CacheConfig::from_toml_str("[cache]\nenabled = true\n");

    std::env::set_var(ENABLE_ENV_VAR, "1");
    let mut enabled = CacheConfig::default();
    enabled.cache.enabled = false;
    let applied = enabled.apply_env_overrides();

    std::env::set_var(ENABLE_ENV_VAR, "sometimes");
    let invalid = CacheConfig::from_toml_str("");
    std::env::remove_var(ENABLE_ENV_VAR);

    assert!(!disabled?.cache.enabled);
    applied?;
    assert!(enabled.cache.enabled);
    assert!(matches!(
        invalid,
        Err(CacheError::InvalidConfigValueError { .. })
    ));
    Ok(())
}
