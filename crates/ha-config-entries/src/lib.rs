//! Config entries
//!
//! A config entry is one configured instance of an integration. Entries are
//! created by config flows, persisted under `.storage/core.config_entries`
//! and set up or unloaded through the [`IntegrationHandler`] registered for
//! their domain.

pub mod entry;
pub mod flow;
pub mod manager;

pub use entry::{ConfigEntry, ConfigEntryState, EntryMap};
pub use flow::{ConfigFlow, FlowInput, FlowResult, FormField};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult,
    IntegrationHandler, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
