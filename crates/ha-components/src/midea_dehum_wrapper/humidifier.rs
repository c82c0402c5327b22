//! The dehumidifier entity wrapping a climate entity

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_core::domains::climate::{
    ATTR_FAN_MODE, ATTR_HUMIDITY, ATTR_HVAC_MODE, ATTR_PRESET_MODE, SET_FAN_MODE, SET_HUMIDITY,
    SET_HVAC_MODE, SET_PRESET_MODE, TURN_OFF, TURN_ON,
};
use ha_core::domains::CLIMATE;
use ha_core::Context;
use ha_event_bus::{EventBus, StateChangeListener, TrackedChange};
use ha_registries::{DeviceIdentifier, DeviceInfo};
use ha_service_registry::{ServiceError, ServiceRegistry};
use ha_state_store::StateStore;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use super::climate::ClimateView;
use super::{DOMAIN, FAN_PREFIX, SEPARATOR};
use crate::humidifier::{
    EntityStateWriter, HumidifierDeviceClass, HumidifierEntity, HumidifierEntityFeature,
};

/// How `turn_on` ended up switching the climate entity on
#[derive(Debug, Clone)]
pub enum TurnOnOutcome {
    /// `set_hvac_mode(dry)` succeeded
    DryMode,
    /// `set_hvac_mode(dry)` failed and plain `turn_on` was used instead
    GenericTurnOn { dry_mode_error: ServiceError },
}

/// Current mode: the preset when set, else the tagged fan mode
pub fn unified_mode(climate: &ClimateView) -> Option<String> {
    climate
        .preset_mode()
        .or_else(|| climate.fan_mode().map(|fan| format!("{FAN_PREFIX}{fan}")))
}

/// Presets, a separator when there are any, then tagged fan modes
///
/// None when the climate entity is missing or offers no modes at all.
pub fn available_modes(climate: &ClimateView) -> Option<Vec<String>> {
    if !climate.exists() {
        return None;
    }

    let mut modes = climate.preset_modes();
    if !modes.is_empty() {
        modes.push(SEPARATOR.to_string());
    }
    modes.extend(
        climate
            .fan_modes()
            .into_iter()
            .map(|fan| format!("{FAN_PREFIX}{fan}")),
    );

    (!modes.is_empty()).then_some(modes)
}

/// Whole numbers are forwarded as integers, `95` stays `95` rather than `95.0`
fn humidity_value(humidity: f64) -> Value {
    // integers up to 2^53 convert exactly
    if humidity.fract() == 0.0 && humidity.abs() <= 9_007_199_254_740_992.0 {
        json!(humidity as i64)
    } else {
        json!(humidity)
    }
}

/// `living_room_ac` -> `Living Room Ac`
///
/// Every letter that follows a non-letter starts a word, so `ac-unit` becomes
/// `Ac-Unit` and `2nd_floor` becomes `2Nd Floor`.
fn title_case(object_id: &str) -> String {
    let mut title = String::with_capacity(object_id.len());
    let mut in_word = false;
    for c in object_id.chars().map(|c| if c == '_' { ' ' } else { c }) {
        if !c.is_alphabetic() {
            title.push(c);
        } else if in_word {
            title.extend(c.to_lowercase());
        } else {
            title.extend(c.to_uppercase());
        }
        in_word = c.is_alphabetic();
    }
    title
}

/// Dehumidifier entity mirroring one climate entity
///
/// Nothing is cached: every read looks the climate entity up again.
pub struct MideaDehumWrapper {
    climate_entity_id: String,
    unique_id: String,
    name: String,
    active_modes: Vec<String>,
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    writer: OnceLock<EntityStateWriter>,
}

impl MideaDehumWrapper {
    pub fn new(
        entry: &ConfigEntry,
        climate_entity_id: String,
        active_modes: Vec<String>,
        bus: Arc<EventBus>,
        states: Arc<StateStore>,
        services: Arc<ServiceRegistry>,
    ) -> Self {
        let name = match states.get(&climate_entity_id) {
            Some(state) => state.name(),
            None => title_case(
                climate_entity_id
                    .rsplit('.')
                    .next()
                    .unwrap_or(&climate_entity_id),
            ),
        };

        Self {
            unique_id: format!("{}_dehumidifier", entry.entry_id),
            climate_entity_id,
            name,
            active_modes,
            bus,
            states,
            services,
            writer: OnceLock::new(),
        }
    }

    pub fn climate_entity_id(&self) -> &str {
        &self.climate_entity_id
    }

    fn climate(&self) -> ClimateView {
        ClimateView::new(self.states.get(&self.climate_entity_id))
    }

    fn write_ha_state(&self, context: Context) {
        match self.writer.get() {
            Some(writer) => writer.write(context),
            None => debug!("{} not added yet, state not written", self.unique_id),
        }
    }

    async fn call_climate(
        &self,
        service: &str,
        mut data: Value,
        context: &Context,
    ) -> Result<(), ServiceError> {
        data["entity_id"] = json!(self.climate_entity_id);
        self.services
            .call(CLIMATE, service, data, context.clone(), false)
            .await?;
        Ok(())
    }

    /// Switch on in dry mode, falling back to a plain `climate.turn_on`
    ///
    /// Only the fallback's error is returned; the dry-mode error is logged
    /// and reported in the outcome.
    pub async fn turn_on_with_fallback(
        &self,
        context: Context,
    ) -> Result<TurnOnOutcome, ServiceError> {
        let outcome = match self
            .call_climate(SET_HVAC_MODE, json!({ ATTR_HVAC_MODE: "dry" }), &context)
            .await
        {
            Ok(()) => TurnOnOutcome::DryMode,
            Err(e) => {
                error!("Unable to set dry mode on {}: {}", self.climate_entity_id, e);
                self.call_climate(TURN_ON, json!({}), &context).await?;
                TurnOnOutcome::GenericTurnOn { dry_mode_error: e }
            }
        };

        self.write_ha_state(context);
        Ok(outcome)
    }
}

#[async_trait]
impl HumidifierEntity for MideaDehumWrapper {
    fn unique_id(&self) -> Option<String> {
        Some(self.unique_id.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo {
            identifiers: vec![DeviceIdentifier::new(DOMAIN, self.climate_entity_id.clone())],
            name: Some(self.name.clone()),
            manufacturer: Some("Midea".to_string()),
            model: Some("Dehumidifier Wrapper".to_string()),
        })
    }

    fn device_class(&self) -> Option<HumidifierDeviceClass> {
        Some(HumidifierDeviceClass::Dehumidifier)
    }

    fn icon(&self) -> Option<String> {
        Some("mdi:dehumidifier".to_string())
    }

    fn supported_features(&self) -> HumidifierEntityFeature {
        HumidifierEntityFeature::MODES
    }

    fn available(&self) -> bool {
        self.climate().is_available()
    }

    fn is_on(&self) -> bool {
        self.climate().is_running_in(&self.active_modes)
    }

    fn current_humidity(&self) -> Option<f64> {
        self.climate().current_humidity()
    }

    fn target_humidity(&self) -> Option<f64> {
        self.climate().target_humidity()
    }

    fn min_humidity(&self) -> f64 {
        self.climate().min_humidity()
    }

    fn max_humidity(&self) -> f64 {
        self.climate().max_humidity()
    }

    fn mode(&self) -> Option<String> {
        unified_mode(&self.climate())
    }

    fn available_modes(&self) -> Option<Vec<String>> {
        available_modes(&self.climate())
    }

    async fn turn_on(&self, context: Context) -> Result<(), ServiceError> {
        self.turn_on_with_fallback(context).await.map(|_| ())
    }

    async fn turn_off(&self, context: Context) -> Result<(), ServiceError> {
        self.call_climate(TURN_OFF, json!({}), &context).await?;
        self.write_ha_state(context);
        Ok(())
    }

    async fn set_humidity(&self, humidity: f64, context: Context) -> Result<(), ServiceError> {
        let data = json!({ ATTR_HUMIDITY: humidity_value(humidity) });
        self.call_climate(SET_HUMIDITY, data, &context).await?;
        self.write_ha_state(context);
        Ok(())
    }

    async fn set_mode(&self, mode: &str, context: Context) -> Result<(), ServiceError> {
        if mode == SEPARATOR {
            debug!("Separator selected, nothing to do");
        } else if let Some(fan_mode) = mode.strip_prefix(FAN_PREFIX) {
            debug!("Setting fan mode {} on {}", fan_mode, self.climate_entity_id);
            self.call_climate(SET_FAN_MODE, json!({ ATTR_FAN_MODE: fan_mode }), &context)
                .await?;
        } else {
            debug!("Setting preset {} on {}", mode, self.climate_entity_id);
            self.call_climate(SET_PRESET_MODE, json!({ ATTR_PRESET_MODE: mode }), &context)
                .await?;
        }

        self.write_ha_state(context);
        Ok(())
    }

    fn added_to_hass(&self, writer: EntityStateWriter) -> Vec<StateChangeListener> {
        let on_change = writer.clone();
        if self.writer.set(writer).is_err() {
            warn!("{} was added twice", self.unique_id);
        }

        let listener = self
            .bus
            .track_state_change([self.climate_entity_id.clone()], move |change| match change {
                TrackedChange::Changed(event) => on_change.write(event.context),
                // a change of the climate entity may be among the lost events
                TrackedChange::Missed { .. } => on_change.write(Context::new()),
            });

        debug!("Dehumidifier entity added, tracking {}", self.climate_entity_id);
        vec![listener]
    }
}
