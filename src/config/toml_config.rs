use crate::core::instance_cache::{DEFAULT_KEY_PREFIX, DEFAULT_VERSION};
use crate::core::invalidation::QueueSettings;
use crate::core::ConfigProvider;
use crate::utils::error::{CacheError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// 覆蓋 `cache.enabled` 的環境變數
pub const ENABLE_ENV_VAR: &str = "USE_DRF_INSTANCE_CACHE";

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache: CacheSection,
    pub backend: BackendSection,
    pub invalidation: InvalidationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub key_prefix: String,
    pub default_version: String,
    pub versions: Vec<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_version: DEFAULT_VERSION.to_string(),
            versions: vec![DEFAULT_VERSION.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub r#type: String,
    pub max_capacity: u64,
    /// 0 表示不過期
    pub ttl_seconds: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            r#type: "memory".to_string(),
            max_capacity: 10_000,
            ttl_seconds: 300,
        }
    }
}

impl BackendSection {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationSection {
    pub mode: InvalidationMode,
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for InvalidationSection {
    fn default() -> Self {
        Self {
            mode: InvalidationMode::Async,
            queue_capacity: 1024,
            workers: 4,
        }
    }
}

impl InvalidationSection {
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            capacity: self.queue_capacity,
            workers: self.workers,
        }
    }
}

impl CacheConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CacheError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，並套用環境變數覆蓋
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        let mut config: CacheConfig =
            toml::from_str(&processed_content).map_err(|e| CacheError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// 替換環境變數 (例如 ${CACHE_PREFIX})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENABLE_ENV_VAR) {
            self.cache.enabled = parse_bool(ENABLE_ENV_VAR, &raw)?;
        }
        Ok(())
    }
}

fn parse_bool(field: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::InvalidConfigValueError {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "Expected true or false".to_string(),
        }),
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_key_segment("cache.key_prefix", &self.cache.key_prefix)?;

        if self.cache.versions.is_empty() {
            return Err(CacheError::ConfigValidationError {
                field: "cache.versions".to_string(),
                message: "At least one cache version is required".to_string(),
            });
        }
        for version in &self.cache.versions {
            validation::validate_key_segment("cache.versions", version)?;
        }
        if !self.cache.versions.contains(&self.cache.default_version) {
            return Err(CacheError::InvalidConfigValueError {
                field: "cache.default_version".to_string(),
                value: self.cache.default_version.clone(),
                reason: format!(
                    "Must be one of the configured versions: {}",
                    self.cache.versions.join(", ")
                ),
            });
        }

        validation::validate_one_of("backend.type", &self.backend.r#type, &["memory"])?;
        validation::validate_positive_number(
            "backend.max_capacity",
            usize::try_from(self.backend.max_capacity).unwrap_or(usize::MAX),
            1,
        )?;

        validation::validate_positive_number(
            "invalidation.queue_capacity",
            self.invalidation.queue_capacity,
            1,
        )?;
        validation::validate_range("invalidation.workers", self.invalidation.workers, 1, 64)?;

        Ok(())
    }
}

impl ConfigProvider for CacheConfig {
    fn cache_enabled(&self) -> bool {
        self.cache.enabled
    }

    fn key_prefix(&self) -> &str {
        &self.cache.key_prefix
    }

    fn default_version(&self) -> &str {
        &self.cache.default_version
    }

    fn versions(&self) -> &[String] {
        &self.cache.versions
    }
}
