pub mod toml_config;

pub use toml_config::{CacheConfig, InvalidationMode};

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "cached-instances")]
#[command(about = "Serve model instances from a shared cache and keep it fresh after writes")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON fixture for the sample poll store
    #[arg(short, long, default_value = "demos/poll.json")]
    pub fixture: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Read cached instances (retrieve view)
    Get {
        model: String,
        #[arg(required = true)]
        pks: Vec<String>,
        #[arg(long)]
        version: Option<String>,
    },
    /// Read every instance of a model through a cached queryset (list view)
    List { model: String },
    /// Refresh an instance after a write and cascade to related instances
    Update {
        model: String,
        pk: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        update_only: bool,
    },
    /// Check a pinned requirements manifest
    CheckRequirements { path: String },
}

#[cfg(feature = "cli")]
impl crate::utils::validation::Validate for CliConfig {
    fn validate(&self) -> crate::utils::error::Result<()> {
        use crate::utils::validation::{validate_non_empty_string, validate_path};

        if let Some(config) = &self.config {
            validate_path("config", config)?;
        }
        match &self.command {
            Command::CheckRequirements { path } => validate_path("path", path)?,
            Command::Get { model, .. } | Command::List { model } | Command::Update { model, .. } => {
                validate_path("fixture", &self.fixture)?;
                validate_non_empty_string("model", model)?;
            }
        }
        Ok(())
    }
}
