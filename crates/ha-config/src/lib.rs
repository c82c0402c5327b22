//! Static configuration from `configuration.yaml`
//!
//! Reads `configuration.yaml` from the config directory. Only the
//! `homeassistant:` name and the `logger:` section are interpreted; the
//! integrations themselves are configured through config entries.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::CoreConfig;
//!
//! let config = CoreConfig::load("/config")?;
//! let filter = config.logger.filter_directives()?;
//! ```

mod core_config;
mod error;
mod loader;

pub use core_config::{tracing_level, CoreConfig, LoggerConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_configuration, load_yaml, load_yaml_str, CONFIG_FILE};

pub use serde_yaml::Value;
