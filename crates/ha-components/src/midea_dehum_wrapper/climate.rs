//! Typed read access to the wrapped climate entity's state

use ha_core::domains::climate::{
    ATTR_CURRENT_HUMIDITY, ATTR_FAN_MODE, ATTR_FAN_MODES, ATTR_HUMIDITY, ATTR_HVAC_MODE,
    ATTR_MAX_HUMIDITY, ATTR_MIN_HUMIDITY, ATTR_PRESET_MODE, ATTR_PRESET_MODES,
};
use ha_core::{State, STATE_OFF};

use super::{DEFAULT_MAX_HUMIDITY, DEFAULT_MIN_HUMIDITY};

/// Snapshot of the climate entity, None when it doesn't exist
///
/// Every accessor degrades to a safe default when the entity or the
/// attribute is missing.
#[derive(Debug, Clone)]
pub struct ClimateView {
    state: Option<State>,
}

impl ClimateView {
    pub fn new(state: Option<State>) -> Self {
        Self { state }
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    /// Present and not reporting `unavailable`
    pub fn is_available(&self) -> bool {
        self.state.as_ref().is_some_and(|s| !s.is_unavailable())
    }

    pub fn raw_state(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.state.as_str())
    }

    /// `hvac_mode` attribute when set, else the raw state
    pub fn hvac_mode(&self) -> Option<String> {
        self.non_empty(ATTR_HVAC_MODE)
            .or_else(|| self.raw_state().map(String::from))
    }

    /// Running in one of `active_modes` and not switched off
    pub fn is_running_in(&self, active_modes: &[String]) -> bool {
        let Some(raw) = self.raw_state() else {
            return false;
        };
        let Some(mode) = self.hvac_mode() else {
            return false;
        };
        raw != STATE_OFF && active_modes.iter().any(|m| *m == mode)
    }

    pub fn target_humidity(&self) -> Option<f64> {
        self.attribute(ATTR_HUMIDITY)
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.attribute(ATTR_CURRENT_HUMIDITY)
    }

    pub fn min_humidity(&self) -> f64 {
        self.attribute(ATTR_MIN_HUMIDITY)
            .unwrap_or(DEFAULT_MIN_HUMIDITY)
    }

    pub fn max_humidity(&self) -> f64 {
        self.attribute(ATTR_MAX_HUMIDITY)
            .unwrap_or(DEFAULT_MAX_HUMIDITY)
    }

    pub fn preset_mode(&self) -> Option<String> {
        self.non_empty(ATTR_PRESET_MODE)
    }

    pub fn fan_mode(&self) -> Option<String> {
        self.non_empty(ATTR_FAN_MODE)
    }

    pub fn preset_modes(&self) -> Vec<String> {
        self.attribute(ATTR_PRESET_MODES).unwrap_or_default()
    }

    pub fn fan_modes(&self) -> Vec<String> {
        self.attribute(ATTR_FAN_MODES).unwrap_or_default()
    }

    fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state.as_ref().and_then(|s| s.attribute(key))
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.attribute::<String>(key).filter(|v| !v.is_empty())
    }
}
