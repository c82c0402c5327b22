//! Handle bundling the shared runtime pieces

use ha_config_entries::ConfigEntries;
use ha_event_bus::EventBus;
use ha_registries::{DeviceRegistry, Storage, StorageResult};
use ha_service_registry::ServiceRegistry;
use ha_state_store::StateStore;
use std::path::Path;
use std::sync::Arc;

use crate::humidifier::HumidifierPlatform;

/// Everything integrations need, shared behind `Arc`s
#[derive(Clone)]
pub struct HomeAssistant {
    /// Event bus shared by every component
    pub bus: Arc<EventBus>,
    /// Current entity states
    pub states: Arc<StateStore>,
    /// Registered services
    pub services: Arc<ServiceRegistry>,
    /// Rooted at `<config_dir>/.storage`
    pub storage: Arc<Storage>,
    /// Devices entities are linked to
    pub devices: Arc<DeviceRegistry>,
    /// Config entries and their integrations
    pub config_entries: Arc<ConfigEntries>,
    /// Humidifier entities of all integrations
    pub humidifiers: Arc<HumidifierPlatform>,
}

impl HomeAssistant {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());
        let storage = Arc::new(Storage::new(config_dir));
        let devices = Arc::new(DeviceRegistry::new(storage.clone()));
        let config_entries = Arc::new(ConfigEntries::new(storage.clone()));
        let humidifiers = Arc::new(HumidifierPlatform::new(states.clone(), devices.clone()));

        Self {
            bus,
            states,
            services,
            storage,
            devices,
            config_entries,
            humidifiers,
        }
    }

    /// Devices first, so entries set up afterwards find their devices
    pub async fn load(&self) -> StorageResult<()> {
        self.devices.load().await?;
        self.config_entries.load().await
    }

    pub async fn save(&self) -> StorageResult<()> {
        self.devices.save().await?;
        self.config_entries.save().await
    }
}
