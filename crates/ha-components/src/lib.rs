//! Home Assistant Built-in Components
//!
//! The humidifier entity platform, the shared [`HomeAssistant`] instance and
//! the integrations built on them.

mod hass;
pub mod humidifier;
pub mod midea_dehum_wrapper;

pub use hass::HomeAssistant;
pub use humidifier::{
    humidifier_state, register_humidifier_services, EntityStateWriter, HumidifierDeviceClass,
    HumidifierEntity, HumidifierEntityFeature, HumidifierPlatform,
};
