//! Humidifier Platform
//!
//! Entities implement [`HumidifierEntity`]; the [`HumidifierPlatform`] turns
//! them into published `humidifier.*` states and routes the `humidifier`
//! services to them.

use async_trait::async_trait;
use dashmap::DashMap;
use ha_core::domains::humidifier as attrs;
use ha_core::{
    generate_entity_id, Context, EntityId, ServiceCall, STATE_OFF, STATE_ON,
    STATE_UNAVAILABLE,
};
use ha_event_bus::StateChangeListener;
use ha_registries::{DeviceInfo, DeviceRegistry};
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use ha_state_store::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, error, info, warn};

/// Entity domain for humidifiers
pub const DOMAIN: &str = ha_core::domains::HUMIDIFIER;

/// Lower humidity bound when an entity doesn't report one
pub const DEFAULT_MIN_HUMIDITY: f64 = 0.0;
/// Upper humidity bound when an entity doesn't report one
pub const DEFAULT_MAX_HUMIDITY: f64 = 100.0;

/// What kind of device a humidifier entity controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumidifierDeviceClass {
    Humidifier,
    Dehumidifier,
}

impl HumidifierDeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            HumidifierDeviceClass::Humidifier => "humidifier",
            HumidifierDeviceClass::Dehumidifier => "dehumidifier",
        }
    }
}

/// Supported feature bits of a humidifier entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HumidifierEntityFeature(u32);

impl HumidifierEntityFeature {
    /// Entity exposes `mode` / `available_modes` and accepts `set_mode`
    pub const MODES: Self = Self(1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for HumidifierEntityFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A humidifier-shaped entity
///
/// Read accessors are evaluated every time the entity's state is written.
/// Commands receive the context of the call that triggered them.
#[async_trait]
pub trait HumidifierEntity: Send + Sync {
    /// Stable id used to detect duplicate entities
    fn unique_id(&self) -> Option<String> {
        None
    }

    /// Display name, also the source of the generated entity id
    fn name(&self) -> String;

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    fn device_class(&self) -> Option<HumidifierDeviceClass> {
        None
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn supported_features(&self) -> HumidifierEntityFeature {
        HumidifierEntityFeature::empty()
    }

    /// Polled entities get refreshed by the platform; pushed ones write
    /// their own state
    fn should_poll(&self) -> bool {
        false
    }

    fn available(&self) -> bool {
        true
    }

    fn is_on(&self) -> bool;

    fn current_humidity(&self) -> Option<f64> {
        None
    }

    fn target_humidity(&self) -> Option<f64> {
        None
    }

    fn min_humidity(&self) -> f64 {
        DEFAULT_MIN_HUMIDITY
    }

    fn max_humidity(&self) -> f64 {
        DEFAULT_MAX_HUMIDITY
    }

    fn mode(&self) -> Option<String> {
        None
    }

    fn available_modes(&self) -> Option<Vec<String>> {
        None
    }

    async fn turn_on(&self, context: Context) -> Result<(), ServiceError>;

    async fn turn_off(&self, context: Context) -> Result<(), ServiceError>;

    async fn set_humidity(&self, humidity: f64, context: Context) -> Result<(), ServiceError>;

    async fn set_mode(&self, _mode: &str, _context: Context) -> Result<(), ServiceError> {
        Err(ServiceError::InvalidData(format!(
            "{} does not support modes",
            self.name()
        )))
    }

    /// Called once the entity has an entity id
    ///
    /// The returned listeners are owned by the platform and dropped when
    /// the entity is removed.
    fn added_to_hass(&self, _writer: EntityStateWriter) -> Vec<StateChangeListener> {
        Vec::new()
    }
}

/// Compute the published state and attributes of a humidifier entity
pub fn humidifier_state(entity: &dyn HumidifierEntity) -> (String, HashMap<String, Value>) {
    let features = entity.supported_features();
    let supports_modes = features.contains(HumidifierEntityFeature::MODES);
    let mut attributes = HashMap::new();

    attributes.insert(attrs::ATTR_MIN_HUMIDITY.to_string(), json!(entity.min_humidity()));
    attributes.insert(attrs::ATTR_MAX_HUMIDITY.to_string(), json!(entity.max_humidity()));
    if supports_modes {
        attributes.insert(
            attrs::ATTR_AVAILABLE_MODES.to_string(),
            json!(entity.available_modes()),
        );
    }

    if let Some(device_class) = entity.device_class() {
        attributes.insert("device_class".to_string(), json!(device_class.as_str()));
    }
    attributes.insert("supported_features".to_string(), json!(features.bits()));
    attributes.insert("friendly_name".to_string(), json!(entity.name()));
    if let Some(icon) = entity.icon() {
        attributes.insert("icon".to_string(), json!(icon));
    }

    if !entity.available() {
        return (STATE_UNAVAILABLE.to_string(), attributes);
    }

    if let Some(humidity) = entity.target_humidity() {
        attributes.insert(attrs::ATTR_HUMIDITY.to_string(), json!(humidity));
    }
    if let Some(current) = entity.current_humidity() {
        attributes.insert(attrs::ATTR_CURRENT_HUMIDITY.to_string(), json!(current));
    }
    if supports_modes {
        attributes.insert(attrs::ATTR_MODE.to_string(), json!(entity.mode()));
    }

    let state = if entity.is_on() { STATE_ON } else { STATE_OFF };
    (state.to_string(), attributes)
}

/// Publishes an entity's state under its entity id
///
/// Holds the entity weakly so entities can keep a writer without creating a
/// reference cycle. Once the platform removes the entity the writer is
/// retired and discards every later write, including those of commands that
/// were still running at removal.
#[derive(Clone)]
pub struct EntityStateWriter {
    entity_id: EntityId,
    states: Arc<StateStore>,
    entity: Weak<dyn HumidifierEntity>,
    retired: Arc<Mutex<bool>>,
}

impl EntityStateWriter {
    pub fn new(
        entity_id: EntityId,
        states: Arc<StateStore>,
        entity: Weak<dyn HumidifierEntity>,
    ) -> Self {
        Self {
            entity_id,
            states,
            entity,
            retired: Arc::new(Mutex::new(false)),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Recompute and store the entity state; no-op once the entity is gone
    pub fn write(&self, context: Context) {
        // held through the store write so retiring can't interleave with it
        let retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        if *retired {
            debug!(entity_id = %self.entity_id, "Entity removed, skipping state write");
            return;
        }
        let Some(entity) = self.entity.upgrade() else {
            debug!(entity_id = %self.entity_id, "Entity dropped, skipping state write");
            return;
        };
        let (state, attributes) = humidifier_state(entity.as_ref());
        self.states
            .set(self.entity_id.clone(), state, attributes, context);
    }

    /// Stop publishing; waits for a write in progress to finish
    fn retire(&self) {
        *self.retired.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }
}

impl std::fmt::Debug for EntityStateWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStateWriter")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

struct PlatformEntity {
    entity: Arc<dyn HumidifierEntity>,
    config_entry_id: String,
    unique_id: Option<String>,
    writer: EntityStateWriter,
    // Dropping these ends the entity's subscriptions
    _listeners: Vec<StateChangeListener>,
}

/// Owns the humidifier entities of all config entries
pub struct HumidifierPlatform {
    states: Arc<StateStore>,
    devices: Arc<DeviceRegistry>,
    /// entity_id -> entity
    entities: DashMap<String, PlatformEntity>,
    /// unique_id -> entity_id
    unique_ids: DashMap<String, String>,
}

impl HumidifierPlatform {
    pub fn new(states: Arc<StateStore>, devices: Arc<DeviceRegistry>) -> Self {
        Self {
            states,
            devices,
            entities: DashMap::new(),
            unique_ids: DashMap::new(),
        }
    }

    /// Add the entities of a config entry
    ///
    /// Each entity gets an entity id generated from its name, its device is
    /// registered, its `added_to_hass` hook runs and its state is written
    /// once. Entities whose unique id is already taken are skipped. Returns
    /// the ids of the entities that were added.
    pub fn add_entities(
        &self,
        config_entry_id: &str,
        entities: Vec<Arc<dyn HumidifierEntity>>,
    ) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            let unique_id = entity.unique_id();
            if let Some(ref uid) = unique_id {
                if let Some(existing) = self.unique_ids.get(uid) {
                    error!(
                        unique_id = %uid,
                        existing = %existing.value(),
                        "Platform {} does not generate unique IDs, skipping entity",
                        DOMAIN
                    );
                    continue;
                }
            }

            let name = entity.name();
            let entity_id = match generate_entity_id(DOMAIN, &name, |candidate| {
                self.states.contains(candidate) || self.entities.contains_key(candidate)
            }) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Cannot generate entity id for '{}': {}", name, e);
                    continue;
                }
            };

            if let Some(info) = entity.device_info() {
                let device = self.devices.get_or_create(config_entry_id, &info);
                debug!(entity_id = %entity_id, device_id = %device.id, "Linked entity to device");
            }

            let writer =
                EntityStateWriter::new(entity_id.clone(), self.states.clone(), Arc::downgrade(&entity));
            let listeners = entity.added_to_hass(writer.clone());
            writer.write(Context::new());

            if let Some(ref uid) = unique_id {
                self.unique_ids.insert(uid.clone(), entity_id.to_string());
            }
            self.entities.insert(
                entity_id.to_string(),
                PlatformEntity {
                    entity,
                    config_entry_id: config_entry_id.to_string(),
                    unique_id,
                    writer,
                    _listeners: listeners,
                },
            );

            info!(entity_id = %entity_id, "Added humidifier entity '{}'", name);
            added.push(entity_id);
        }

        added
    }

    /// Get an entity by entity id
    pub fn get(&self, entity_id: &str) -> Option<Arc<dyn HumidifierEntity>> {
        self.entities.get(entity_id).map(|e| e.entity.clone())
    }

    /// Rewrite the state of an entity; false if it is unknown
    pub fn write_state(&self, entity_id: &str, context: Context) -> bool {
        let Some(writer) = self.entities.get(entity_id).map(|e| e.writer.clone()) else {
            return false;
        };
        writer.write(context);
        true
    }

    /// Entity ids belonging to a config entry
    pub fn entity_ids_for_config_entry(&self, config_entry_id: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| e.config_entry_id == config_entry_id)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Remove every entity of a config entry
    ///
    /// Releases their listeners, removes their published state and detaches
    /// the config entry from its devices. Returns the number removed.
    pub fn remove_config_entry(&self, config_entry_id: &str) -> usize {
        let entity_ids = self.entity_ids_for_config_entry(config_entry_id);

        for entity_id in &entity_ids {
            let Some((_, removed)) = self.entities.remove(entity_id) else {
                continue;
            };
            if let Some(uid) = removed.unique_id.as_deref() {
                self.unique_ids.remove(uid);
            }
            removed.writer.retire();
            self.states.remove(removed.writer.entity_id(), Context::new());
            debug!(entity_id = %entity_id, "Removed humidifier entity");
        }

        self.devices.clear_config_entry(config_entry_id);
        entity_ids.len()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Collect the platform entities a service call targets
fn target_entities(
    platform: &HumidifierPlatform,
    call: &ServiceCall,
) -> Vec<Arc<dyn HumidifierEntity>> {
    call.entity_ids()
        .iter()
        .filter_map(|entity_id| {
            let entity = platform.get(entity_id);
            if entity.is_none() {
                warn!("Service {} targets unknown entity {}", call.service_id(), entity_id);
            }
            entity
        })
        .collect()
}

fn describe(service: &str, name: &str, description: &str) -> ServiceDescription {
    ServiceDescription::new(DOMAIN, service)
        .named(name, description)
        .targeting(DOMAIN)
}

/// Register the `humidifier.*` services
pub fn register_humidifier_services(services: &ServiceRegistry, platform: Arc<HumidifierPlatform>) {
    use ha_core::domains::humidifier::{SET_HUMIDITY, SET_MODE, TOGGLE, TURN_OFF, TURN_ON};

    let p = platform.clone();
    services.register_with_description(
        describe(TURN_ON, "Turn on", "Turns the humidifier on"),
        move |call: ServiceCall| {
            let platform = p.clone();
            async move {
                for entity in target_entities(&platform, &call) {
                    entity.turn_on(call.context.clone()).await?;
                }
                Ok(None)
            }
        },
    );

    let p = platform.clone();
    services.register_with_description(
        describe(TURN_OFF, "Turn off", "Turns the humidifier off"),
        move |call: ServiceCall| {
            let platform = p.clone();
            async move {
                for entity in target_entities(&platform, &call) {
                    entity.turn_off(call.context.clone()).await?;
                }
                Ok(None)
            }
        },
    );

    let p = platform.clone();
    services.register_with_description(
        describe(TOGGLE, "Toggle", "Toggles the humidifier on/off"),
        move |call: ServiceCall| {
            let platform = p.clone();
            async move {
                for entity in target_entities(&platform, &call) {
                    if entity.is_on() {
                        entity.turn_off(call.context.clone()).await?;
                    } else {
                        entity.turn_on(call.context.clone()).await?;
                    }
                }
                Ok(None)
            }
        },
    );

    let p = platform.clone();
    services.register_with_description(
        describe(SET_HUMIDITY, "Set humidity", "Sets the target humidity"),
        move |call: ServiceCall| {
            let platform = p.clone();
            async move {
                let humidity: f64 = call.get(attrs::ATTR_HUMIDITY).ok_or_else(|| {
                    ServiceError::InvalidData("humidity is required".to_string())
                })?;
                for entity in target_entities(&platform, &call) {
                    entity.set_humidity(humidity, call.context.clone()).await?;
                }
                Ok(None)
            }
        },
    );

    let p = platform;
    services.register_with_description(
        describe(SET_MODE, "Set mode", "Sets the humidifier operation mode"),
        move |call: ServiceCall| {
            let platform = p.clone();
            async move {
                let mode: String = call
                    .get(attrs::ATTR_MODE)
                    .ok_or_else(|| ServiceError::InvalidData("mode is required".to_string()))?;
                for entity in target_entities(&platform, &call) {
                    if !entity
                        .supported_features()
                        .contains(HumidifierEntityFeature::MODES)
                    {
                        return Err(ServiceError::InvalidData(format!(
                            "{} does not support modes",
                            entity.name()
                        )));
                    }
                    entity.set_mode(&mode, call.context.clone()).await?;
                }
                Ok(None)
            }
        },
    );

    info!("Humidifier services registered");
}
