use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache backend error: {message}")]
    BackendError { message: String },

    #[error("No cache handler for model '{model}' (version '{version}')")]
    UnknownModel { model: String, version: String },

    #[error("Model '{model}' has no serializer for version '{version}'")]
    MissingSerializer { model: String, version: String },

    #[error("Invalid object spec: {reason}")]
    InvalidSpec { reason: String },

    #[error("Invalid field key '{key}': {reason}")]
    FieldKeyError { key: String, reason: String },

    #[error("Unknown field type code '{code}'")]
    UnknownFieldType { code: String },

    #[error("Cannot decode field '{field}': {reason}")]
    FieldDecodeError { field: String, reason: String },

    #[error("Field '{field}' appears more than once in the cached representation")]
    DuplicateField { field: String },

    #[error("{model} matching query does not exist (pk={pk})")]
    DoesNotExist { model: String, pk: String },

    #[error("'{model}' object has no attribute '{attribute}'")]
    MissingAttribute { model: String, attribute: String },

    #[error("Invalidation queue is closed")]
    QueueClosed,

    #[error("Configuration validation error in field '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid configuration value for '{field}' = '{value}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Requirements line {line}: {reason}")]
    ManifestError { line: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Backend,
    Model,
    Data,
    Queue,
    Manifest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CacheError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CacheError::ConfigValidationError { .. } | CacheError::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            CacheError::IoError(_) | CacheError::BackendError { .. } => ErrorCategory::Backend,
            CacheError::UnknownModel { .. } | CacheError::MissingSerializer { .. } => {
                ErrorCategory::Model
            }
            CacheError::SerializationError(_)
            | CacheError::InvalidSpec { .. }
            | CacheError::FieldKeyError { .. }
            | CacheError::UnknownFieldType { .. }
            | CacheError::FieldDecodeError { .. }
            | CacheError::DuplicateField { .. }
            | CacheError::DoesNotExist { .. }
            | CacheError::MissingAttribute { .. } => ErrorCategory::Data,
            CacheError::QueueClosed => ErrorCategory::Queue,
            CacheError::ManifestError { .. } => ErrorCategory::Manifest,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CacheError::DoesNotExist { .. } | CacheError::MissingAttribute { .. } => {
                ErrorSeverity::Low
            }
            CacheError::BackendError { .. } | CacheError::QueueClosed => ErrorSeverity::Medium,
            CacheError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the TOML configuration file and the USE_DRF_INSTANCE_CACHE variable"
            }
            ErrorCategory::Backend => "Check that the cache backend is reachable, then retry",
            ErrorCategory::Model => {
                "Register a handler for the model and version, or mark the model as unhandled"
            }
            ErrorCategory::Data => {
                "Clear the affected cache keys; a stale or malformed entry will be rebuilt"
            }
            ErrorCategory::Queue => "Restart the invalidation queue before enqueueing more work",
            ErrorCategory::Manifest => "Pin every requirement as name==version",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CacheError::UnknownModel { model, .. } => {
                format!("The cache does not know how to handle '{}'", model)
            }
            CacheError::DoesNotExist { model, pk } => {
                format!("No {} with primary key {} was found", model, pk)
            }
            CacheError::ManifestError { line, reason } => {
                format!("Requirements file problem on line {}: {}", line, reason)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
