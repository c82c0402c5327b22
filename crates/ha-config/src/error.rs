use std::path::PathBuf;
use thiserror::Error;

/// Result type of configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors while reading `configuration.yaml`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("bad value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}
