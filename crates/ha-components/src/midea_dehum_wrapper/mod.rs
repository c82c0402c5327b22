//! Midea Dehumidifier Wrapper
//!
//! Exposes an existing climate entity as a dehumidifier. Presets and fan
//! modes are merged into one mode list, humidity setpoints and on/off are
//! forwarded to the climate services, and the wrapper state follows every
//! state change of the climate entity.

mod climate;
mod config_flow;
mod humidifier;

pub use climate::ClimateView;
pub use config_flow::MideaDehumConfigFlow;
pub use humidifier::{available_modes, unified_mode, MideaDehumWrapper, TurnOnOutcome};

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, IntegrationHandler};
use ha_event_bus::EventBus;
use ha_service_registry::ServiceRegistry;
use ha_state_store::StateStore;
use std::sync::Arc;
use tracing::debug;

use crate::hass::HomeAssistant;
use crate::humidifier::{HumidifierEntity, HumidifierPlatform};

pub const DOMAIN: &str = "midea_dehum_wrapper";

/// Tag put in front of fan modes in the unified mode list
pub const FAN_PREFIX: &str = "Fan: ";
/// Non-selectable divider between presets and fan modes
pub const SEPARATOR: &str = "---";

/// Config entry data key holding the wrapped climate entity id
pub const CONF_CLIMATE_ENTITY: &str = "climate_entity";
/// Config entry option overriding which HVAC modes count as "on"
pub const CONF_ACTIVE_HVAC_MODES: &str = "active_hvac_modes";

pub const DEFAULT_ACTIVE_HVAC_MODES: &[&str] =
    &["dry", "cool", "fan_only", "heat", "heat_cool", "auto"];

pub const DEFAULT_MIN_HUMIDITY: f64 = 30.0;
pub const DEFAULT_MAX_HUMIDITY: f64 = 80.0;

/// Active HVAC modes of an entry: the option when set, else the defaults
pub fn active_hvac_modes(entry: &ConfigEntry) -> Vec<String> {
    entry
        .option_value::<Vec<String>>(CONF_ACTIVE_HVAC_MODES)
        .unwrap_or_else(|| {
            DEFAULT_ACTIVE_HVAC_MODES
                .iter()
                .map(|m| m.to_string())
                .collect()
        })
}

/// Sets up and unloads wrapper config entries
pub struct MideaDehumIntegration {
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    platform: Arc<HumidifierPlatform>,
}

impl MideaDehumIntegration {
    pub fn new(hass: &HomeAssistant) -> Self {
        Self {
            bus: hass.bus.clone(),
            states: hass.states.clone(),
            services: hass.services.clone(),
            platform: hass.humidifiers.clone(),
        }
    }
}

#[async_trait]
impl IntegrationHandler for MideaDehumIntegration {
    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), String> {
        let climate_entity_id = entry
            .data_value::<String>(CONF_CLIMATE_ENTITY)
            .ok_or_else(|| format!("config entry {} has no {}", entry.entry_id, CONF_CLIMATE_ENTITY))?;

        debug!(
            "Setting up Midea Dehumidifier Wrapper with climate entity: {}",
            climate_entity_id
        );

        let entity = Arc::new(MideaDehumWrapper::new(
            entry,
            climate_entity_id,
            active_hvac_modes(entry),
            self.bus.clone(),
            self.states.clone(),
            self.services.clone(),
        ));
        self.platform
            .add_entities(&entry.entry_id, vec![entity as Arc<dyn HumidifierEntity>]);
        Ok(())
    }

    async fn async_unload_entry(&self, entry: &ConfigEntry) -> Result<bool, String> {
        self.platform.remove_config_entry(&entry.entry_id);
        Ok(true)
    }
}

/// Register the integration with the config entries manager
pub fn register(hass: &HomeAssistant) {
    hass.config_entries
        .register_integration(DOMAIN, Arc::new(MideaDehumIntegration::new(hass)));
}

/// Config flow for creating wrapper entries
pub fn config_flow(hass: &HomeAssistant) -> MideaDehumConfigFlow {
    MideaDehumConfigFlow::new(hass.states.clone())
}
