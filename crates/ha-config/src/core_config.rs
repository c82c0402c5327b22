//! Core Home Assistant configuration
//!
//! Parses the `homeassistant:` and `logger:` sections of configuration.yaml

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_configuration;

/// The `logger:` section
///
/// ```yaml
/// logger:
///   default: warning
///   logs:
///     ha_components::midea_dehum_wrapper: debug
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Level for every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target level overrides
    #[serde(default)]
    pub logs: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            logs: BTreeMap::new(),
        }
    }
}

/// Map a logger level name to a tracing level
///
/// Accepts the Python-style names (`critical`, `warning`, `notset`, ...)
/// next to the tracing ones.
pub fn tracing_level(level: &str) -> ConfigResult<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "error" => Ok("error"),
        "warning" | "warn" => Ok("warn"),
        "info" => Ok("info"),
        "debug" => Ok("debug"),
        "notset" | "trace" => Ok("trace"),
        other => Err(ConfigError::InvalidValue {
            key: "logger".to_string(),
            reason: format!("unknown log level '{}'", other),
        }),
    }
}

impl LoggerConfig {
    /// Build an env-filter directive string, e.g. `warn,ha_core=debug`
    pub fn filter_directives(&self) -> ConfigResult<String> {
        let mut directives = vec![tracing_level(&self.default)?.to_string()];
        for (target, level) in &self.logs {
            directives.push(format!("{}={}", target, tracing_level(level)?));
        }
        Ok(directives.join(","))
    }
}

/// Core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Name of the location (e.g., "Home")
    #[serde(default = "default_name")]
    pub name: String,

    /// Logging configuration
    #[serde(default)]
    pub logger: LoggerConfig,
}

fn default_name() -> String {
    "Home".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            logger: LoggerConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load core configuration from a config directory
    ///
    /// A missing configuration.yaml gives the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        match load_configuration(config_dir)? {
            Some(yaml) => Self::from_yaml(&yaml),
            None => Ok(Self::default()),
        }
    }

    /// Parse core configuration from YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let name = match mapping.get("homeassistant").and_then(|ha| ha.get("name")) {
            Some(name) => name
                .as_str()
                .map(String::from)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "homeassistant.name".to_string(),
                    reason: "must be a string".to_string(),
                })?,
            None => default_name(),
        };

        let logger = match mapping.get("logger") {
            // `logger:` with no body enables the defaults
            Some(Value::Null) | None => LoggerConfig::default(),
            Some(section) => serde_yaml::from_value(section.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "logger".to_string(),
                    reason: e.to_string(),
                }
            })?,
        };
        logger.filter_directives()?;

        Ok(Self { name, logger })
    }
}
