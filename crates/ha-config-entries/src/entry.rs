//! Config entry records

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key/value map used for entry data and options
pub type EntryMap = HashMap<String, serde_json::Value>;

/// Where an entry is in its setup/unload lifecycle
///
/// Runtime only; every entry starts out `NotLoaded` after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    SetupError,
    UnloadInProgress,
    FailedUnload,
}

impl ConfigEntryState {
    /// States an unload may start from; the in-progress and failed-unload
    /// states need a restart
    pub fn can_unload(&self) -> bool {
        matches!(
            self,
            ConfigEntryState::NotLoaded | ConfigEntryState::Loaded | ConfigEntryState::SetupError
        )
    }
}

/// One configured instance of an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// ULID assigned on creation
    pub entry_id: String,
    /// Integration that owns the entry
    pub domain: String,
    /// Title shown for the entry
    pub title: String,

    /// Written once by the config flow
    #[serde(default)]
    pub data: EntryMap,

    /// User-adjustable settings
    #[serde(default)]
    pub options: EntryMap,

    /// Where the entry is in its lifecycle (not persisted)
    #[serde(skip)]
    pub state: ConfigEntryState,

    /// Why setup or unload failed
    #[serde(skip)]
    pub reason: Option<String>,

    /// When the entry was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last change to data or options
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: EntryMap::new(),
            options: EntryMap::new(),
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: EntryMap) -> Self {
        self.data = data;
        self
    }

    pub fn with_options(mut self, options: EntryMap) -> Self {
        self.options = options;
        self
    }

    /// Typed lookup in `data`; None when missing or of another type
    pub fn data_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        lookup(&self.data, key)
    }

    /// Typed lookup in `options`; None when missing or of another type
    pub fn option_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        lookup(&self.options, key)
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }
}

fn lookup<T: DeserializeOwned>(map: &EntryMap, key: &str) -> Option<T> {
    map.get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
