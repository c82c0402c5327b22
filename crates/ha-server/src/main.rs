//! Home Assistant Rust Server
//!
//! Main entry point: loads the configuration, sets up the persisted config
//! entries and runs until ctrl-c.

use anyhow::{Context as _, Result};
use ha_components::{midea_dehum_wrapper, register_humidifier_services, HomeAssistant};
use ha_config::CoreConfig;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config directory
const CONFIG_DIR_ENV: &str = "HA_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config";

/// Config directory: first argument, then `HA_CONFIG_DIR`, then `./config`
fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_DIR_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string())
        .into()
}

/// `RUST_LOG` when set, else the `logger:` section of configuration.yaml
fn init_logging(config: &CoreConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.logger.filter_directives()?)
            .context("invalid logger configuration")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = CoreConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {:?}", config_dir))?;
    init_logging(&config)?;

    info!("Starting Home Assistant (Rust) for {}", config.name);
    info!("Config directory: {:?}", config_dir);

    let hass = HomeAssistant::new(&config_dir);
    register_humidifier_services(&hass.services, hass.humidifiers.clone());
    midea_dehum_wrapper::register(&hass);

    hass.load().await.context("failed to load storage")?;

    let results = hass.config_entries.setup_all().await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("{} of {} config entries failed to set up", failed, results.len());
    }
    info!(
        "Home Assistant is running with {} humidifier entities",
        hass.humidifiers.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for result in hass.config_entries.unload_all().await {
        if let Err(e) = result {
            warn!("Failed to unload config entry: {}", e);
        }
    }
    hass.save().await.context("failed to save storage")?;

    Ok(())
}
