//! YAML file loading

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Load and parse a YAML file
///
/// An empty file yields an empty mapping.
pub fn load_yaml(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    debug!("Loading YAML file: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_yaml_str(&content, path)
}

/// Parse YAML content read from `source_path`
pub fn load_yaml_str(content: &str, source_path: &Path) -> ConfigResult<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    })?;

    Ok(match value {
        Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
        other => other,
    })
}

/// Load `configuration.yaml` from a config directory, None if it doesn't exist
pub fn load_configuration(config_dir: impl AsRef<Path>) -> ConfigResult<Option<Value>> {
    let path = config_dir.as_ref().join(CONFIG_FILE);
    if !path.exists() {
        debug!("No {} in {:?}", CONFIG_FILE, config_dir.as_ref());
        return Ok(None);
    }
    load_yaml(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_simple_yaml() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "homeassistant:\n  name: Cellar\n",
        )
        .unwrap();

        let config = load_configuration(dir.path()).unwrap().unwrap();
        assert_eq!(config["homeassistant"]["name"].as_str(), Some("Cellar"));
    }

    #[test]
    fn test_missing_configuration() {
        let dir = TempDir::new().unwrap();
        assert!(load_configuration(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let value = load_yaml_str("", Path::new("empty.yaml")).unwrap();
        assert!(value.as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_parse_error() {
        let result = load_yaml_str("key: [unclosed", Path::new("bad.yaml"));
        assert!(matches!(result, Err(ConfigError::ParseYaml { .. })));
    }
}
