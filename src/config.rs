//! Configuration management for Tollgate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Result, TollgateError};
use crate::ratelimit::PolicyTable;

/// Prefix for environment variable overrides, e.g. `TOLLGATE_LOGGING__LEVEL`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tier policy configuration
    #[serde(default)]
    pub policy: PolicyFileConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Build the tracing filter for the configured level.
    pub fn level_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.level).map_err(|e| {
            TollgateError::Config(format!("Invalid log level '{}': {}", self.level, e))
        })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where tier policies come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFileConfig {
    /// Path to a YAML policy table; the built-in table is used when unset
    pub path: Option<String>,
}

impl TollgateConfig {
    /// Load configuration from a YAML file, applying environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(File::new(path, FileFormat::Yaml))
    }

    /// Load configuration from a YAML string, applying environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::load(File::from_str(yaml, FileFormat::Yaml))
    }

    fn load<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|settings| settings.try_deserialize::<TollgateConfig>())
            .map_err(|e| TollgateError::Config(e.to_string()))
    }

    /// Build the policy table this configuration points at.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        match &self.policy.path {
            Some(path) => PolicyTable::from_file(path),
            None => Ok(PolicyTable::builtin()),
        }
    }
}
