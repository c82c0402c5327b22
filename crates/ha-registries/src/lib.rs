//! Home Assistant Registries
//!
//! This crate provides the `.storage/` JSON persistence layer and the device
//! registry that entities attach their device information to.

pub mod device_registry;
pub mod storage;

pub use device_registry::{
    DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry, DeviceRegistryData,
};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
