use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::experiment::{Status, ValidationRules};
use crate::workflows::{EngineSettings, TransitionTable};

/// Main configuration structure for the experiment workflow service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExperimenterConfig {
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Status transitions and archive rules
    pub workflow: WorkflowConfig,
    /// Field validation limits
    pub validation: ValidationRules,
    /// Delivery system (Normandy) settings
    pub delivery: DeliveryConfig,
    /// Where experiments are kept
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human readable ones
    pub json_logs: bool,
    /// Enable workflow metrics collection
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Allowed targets per status
    pub transitions: TransitionTable,
    /// Statuses in which an experiment cannot be archived or unarchived
    pub non_archivable_statuses: BTreeSet<Status>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            transitions: TransitionTable::default(),
            non_archivable_statuses: [Status::Live].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL of the recipe API
    pub api_url: String,
    /// Base URL of experiment pages, used in recipe payloads
    pub experiment_url: String,
    /// Delivery slugs are cut to this many characters
    pub slug_max_len: usize,
    pub timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://normandy.cdn.mozilla.net/api/v3".to_string(),
            experiment_url: "https://experimenter.services.mozilla.com/experiments".to_string(),
            slug_max_len: 80,
            timeout_seconds: 30,
        }
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the file backend
    pub path: PathBuf,
    /// Database URL for the sqlite backend
    pub database_url: String,
    /// Run migrations on connect
    pub auto_migrate: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from(".experimenter/experiments"),
            database_url: "sqlite://.experimenter/experimenter.db".to_string(),
            auto_migrate: true,
        }
    }
}

impl ExperimenterConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (experimenter.toml, .experimenter-rc)
    /// 3. Environment variables (prefixed with EXPERIMENTER_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("experimenter.toml").exists() {
            builder = builder.add_source(File::with_name("experimenter"));
        }

        if Path::new(".experimenter-rc").exists() {
            builder = builder.add_source(
                File::with_name(".experimenter-rc").format(config::FileFormat::Toml),
            );
        }

        // Double underscore separates sections so field names keep their single underscores
        builder = builder.add_source(
            Environment::with_prefix("EXPERIMENTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from a single explicit file, still honouring environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(
                Environment::with_prefix("EXPERIMENTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Engine knobs derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            transitions: self.workflow.transitions.clone(),
            non_archivable: self.workflow.non_archivable_statuses.clone(),
            validation: self.validation.clone(),
            delivery_slug_max_len: self.delivery.slug_max_len,
        }
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ExperimenterConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = ExperimenterConfig::load_env_file();
        ExperimenterConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ExperimenterConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
