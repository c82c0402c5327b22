//! Entity domains and the service names this workspace dispatches
//!
//! Only the domains the humidifier platform and the climate devices it wraps
//! talk to are listed here.

/// Climate (HVAC) domain
pub const CLIMATE: &str = "climate";

/// Humidifier / dehumidifier domain
pub const HUMIDIFIER: &str = "humidifier";

/// Services exposed by climate entities
pub mod climate {
    pub const SET_HVAC_MODE: &str = "set_hvac_mode";
    pub const SET_PRESET_MODE: &str = "set_preset_mode";
    pub const SET_FAN_MODE: &str = "set_fan_mode";
    pub const SET_HUMIDITY: &str = "set_humidity";
    pub const TURN_ON: &str = "turn_on";
    pub const TURN_OFF: &str = "turn_off";

    /// Service data keys
    pub const ATTR_HVAC_MODE: &str = "hvac_mode";
    pub const ATTR_PRESET_MODE: &str = "preset_mode";
    pub const ATTR_PRESET_MODES: &str = "preset_modes";
    pub const ATTR_FAN_MODE: &str = "fan_mode";
    pub const ATTR_FAN_MODES: &str = "fan_modes";
    pub const ATTR_HUMIDITY: &str = "humidity";
    pub const ATTR_CURRENT_HUMIDITY: &str = "current_humidity";
    pub const ATTR_MIN_HUMIDITY: &str = "min_humidity";
    pub const ATTR_MAX_HUMIDITY: &str = "max_humidity";
}

/// Services exposed by humidifier entities
pub mod humidifier {
    pub const TURN_ON: &str = "turn_on";
    pub const TURN_OFF: &str = "turn_off";
    pub const TOGGLE: &str = "toggle";
    pub const SET_HUMIDITY: &str = "set_humidity";
    pub const SET_MODE: &str = "set_mode";

    pub const ATTR_HUMIDITY: &str = "humidity";
    pub const ATTR_CURRENT_HUMIDITY: &str = "current_humidity";
    pub const ATTR_MIN_HUMIDITY: &str = "min_humidity";
    pub const ATTR_MAX_HUMIDITY: &str = "max_humidity";
    pub const ATTR_MODE: &str = "mode";
    pub const ATTR_AVAILABLE_MODES: &str = "available_modes";
}
