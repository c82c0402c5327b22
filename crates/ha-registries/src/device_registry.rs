//! Devices that entities are grouped under
//!
//! An entity describes its device with a [`DeviceInfo`]. Descriptions that
//! share an identifier end up on the same [`DeviceEntry`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

pub const STORAGE_KEY: &str = "core.device_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// `(domain, id)`, e.g. `("midea_dehum_wrapper", "climate.cellar")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }
}

/// Device description supplied by an entity when it is added
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Identifiers the device is matched by
    pub identifiers: Vec<DeviceIdentifier>,
    /// Name shown for the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Manufacturer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A registered device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Random hex UUID
    pub id: String,

    /// Identifiers the device is matched by
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Config entries with an entity on this device
    #[serde(default)]
    pub config_entries: Vec<String>,

    /// Name reported by the integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Manufacturer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// When the device was first registered
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last change to the device
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn from_info(info: &DeviceInfo) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: info.identifiers.clone(),
            config_entries: Vec::new(),
            name: info.name.clone(),
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Fold a newer description into this entry; returns true if anything changed
    fn merge(&mut self, info: &DeviceInfo, config_entry_id: &str) -> bool {
        let mut changed = false;
        for identifier in &info.identifiers {
            if !self.identifiers.contains(identifier) {
                self.identifiers.push(identifier.clone());
                changed = true;
            }
        }
        if !self.config_entries.iter().any(|id| id == config_entry_id) {
            self.config_entries.push(config_entry_id.to_string());
            changed = true;
        }
        for (field, value) in [
            (&mut self.name, &info.name),
            (&mut self.manufacturer, &info.manufacturer),
            (&mut self.model, &info.model),
        ] {
            if value.is_some() && *field != *value {
                *field = value.clone();
                changed = true;
            }
        }
        if changed {
            self.modified_at = Utc::now();
        }
        changed
    }
}

/// On-disk layout of `.storage/core.device_registry`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    /// Every registered device
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Devices by id, plus an identifier lookup
///
/// Entries are immutable behind an `Arc`; an update swaps in a new entry.
pub struct DeviceRegistry {
    storage: Arc<Storage>,
    devices: DashMap<String, Arc<DeviceEntry>>,
    identifiers: DashMap<DeviceIdentifier, String>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            devices: DashMap::new(),
            identifiers: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let stored = self.storage.load::<DeviceRegistryData>().await?;
        let devices = stored.map(|d| d.devices).unwrap_or_default();

        info!(count = devices.len(), "Restoring devices");
        devices
            .into_iter()
            .for_each(|device| self.insert(Arc::new(device)));
        Ok(())
    }

    /// Persist all devices, oldest first
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.devices.iter().map(|d| d.value().as_ref().clone()).collect();
        devices.sort_by_key(|d| d.created_at);
        self.storage.save(&DeviceRegistryData { devices }).await
    }

    fn insert(&self, device: Arc<DeviceEntry>) {
        for identifier in &device.identifiers {
            self.identifiers.insert(identifier.clone(), device.id.clone());
        }
        self.devices.insert(device.id.clone(), device);
    }

    fn forget(&self, device: &DeviceEntry) {
        device.identifiers.iter().for_each(|identifier| {
            self.identifiers.remove(identifier);
        });
        self.devices.remove(&device.id);
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.get(device_id).map(|d| Arc::clone(d.value()))
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let device_id = self
            .identifiers
            .get(&DeviceIdentifier::new(domain, id))?
            .value()
            .clone();
        self.get(&device_id)
    }

    /// Devices the config entry is attached to
    pub fn for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.devices
            .iter()
            .filter(|d| d.config_entries.iter().any(|id| id == config_entry_id))
            .map(|d| Arc::clone(d.value()))
            .collect()
    }

    /// Get or create the device described by `info` for a config entry
    ///
    /// An existing device sharing any identifier is updated in place.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|identifier| self.get_by_identifier(identifier.domain(), identifier.id()));

        let entry = match existing {
            Some(existing) => {
                let mut updated = (*existing).clone();
                if !updated.merge(info, config_entry_id) {
                    return existing;
                }
                debug!(device_id = %updated.id, "Updated device");
                updated
            }
            None => {
                let mut created = DeviceEntry::from_info(info);
                created.merge(info, config_entry_id);
                debug!(device_id = %created.id, name = ?created.name, "Created device");
                created
            }
        };

        let entry = Arc::new(entry);
        self.insert(Arc::clone(&entry));
        entry
    }

    /// Detach a config entry from all its devices
    ///
    /// Devices left without any config entry are removed.
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        for device in self.for_config_entry(config_entry_id) {
            let mut updated = (*device).clone();
            updated.config_entries.retain(|id| id != config_entry_id);

            if updated.config_entries.is_empty() {
                self.forget(&updated);
                debug!(device_id = %updated.id, "Removed device");
            } else {
                updated.modified_at = Utc::now();
                self.insert(Arc::new(updated));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
