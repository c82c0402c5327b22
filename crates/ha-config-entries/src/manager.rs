//! Registry of config entries and their setup/unload lifecycle

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ha_registries::{Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, EntryMap};
use crate::flow::FlowResult;

pub const STORAGE_KEY: &str = "core.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Errors of config entry management
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("no config entry with id {0}")]
    NotFound(String),

    #[error("config entry {0} is already registered")]
    AlreadyExists(String),

    #[error("config entry can't be unloaded while {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("setup of config entry failed: {0}")]
    SetupFailed(String),

    #[error("unload of config entry failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    Storage(#[from] ha_registries::StorageError),
}

/// Result type of config entry operations
pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// On-disk layout of `.storage/core.config_entries`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    /// Every stored entry
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Setup/unload hooks an integration registers for its domain
#[async_trait]
pub trait IntegrationHandler: Send + Sync {
    /// Set up everything the entry provides (entities, listeners, ...)
    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), String>;

    /// Tear down what `async_setup_entry` created; false means nothing could
    /// be unloaded
    async fn async_unload_entry(&self, entry: &ConfigEntry) -> Result<bool, String>;
}

/// All config entries of the instance
///
/// Setup and unload are serialized through one lock so an entry is never
/// set up and torn down at the same time.
pub struct ConfigEntries {
    storage: Arc<Storage>,
    entries: DashMap<String, ConfigEntry>,
    integrations: DashMap<String, Arc<dyn IntegrationHandler>>,
    lifecycle: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            integrations: DashMap::new(),
            lifecycle: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(stored) = self.storage.load::<ConfigEntriesData>().await? else {
            debug!("No stored config entries");
            return Ok(());
        };

        info!(count = stored.entries.len(), "Restoring config entries");
        for entry in stored.entries {
            self.entries.insert(entry.entry_id.clone(), entry);
        }
        Ok(())
    }

    /// Write every entry, oldest first
    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.created_at);

        let count = entries.len();
        self.storage.save(&ConfigEntriesData { entries }).await?;
        debug!(count, "Config entries written");
        Ok(())
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|e| e.value().clone())
    }

    fn require(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        self.get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut found: Vec<ConfigEntry> = self
            .entries
            .iter()
            .filter(|e| e.domain == domain)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|e| e.created_at);
        found
    }

    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if self.entries.contains_key(&entry.entry_id) {
            return Err(ConfigEntriesError::AlreadyExists(entry.entry_id));
        }

        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.save().await?;

        info!(
            domain = %entry.domain,
            entry_id = %entry.entry_id,
            "Config entry '{}' created",
            entry.title
        );
        Ok(entry)
    }

    /// Turn a finished flow into a persisted, set-up config entry
    ///
    /// Returns None for results that don't create an entry (forms, aborts).
    pub async fn finish_flow(
        &self,
        domain: &str,
        result: FlowResult,
    ) -> ConfigEntriesResult<Option<ConfigEntry>> {
        let FlowResult::CreateEntry { title, data } = result else {
            return Ok(None);
        };

        let entry = self.add(ConfigEntry::new(domain, title).with_data(data)).await?;
        self.setup(&entry.entry_id).await?;

        Ok(self.get(&entry.entry_id))
    }

    /// Replace the options of an entry
    ///
    /// A loaded entry is reloaded so its integration picks up the new
    /// options.
    pub async fn update_options(
        &self,
        entry_id: &str,
        options: EntryMap,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let was_loaded = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
            entry.options = options;
            entry.modified_at = Utc::now();
            entry.is_loaded()
        };
        self.save().await?;

        if was_loaded {
            debug!(entry_id, "Options changed, reloading");
            self.reload(entry_id).await?;
        }
        self.require(entry_id)
    }

    /// Forget an entry; a loaded entry is unloaded first
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        if self.require(entry_id)?.is_loaded() {
            self.unload(entry_id).await?;
        }

        let (_, entry) = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.save().await?;

        info!(domain = %entry.domain, entry_id, "Config entry '{}' removed", entry.title);
        Ok(entry)
    }

    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            debug!(entry_id, from = ?entry.state, to = ?state, "Config entry state");
            entry.state = state;
            entry.reason = reason;
        }
    }

    pub fn register_integration(&self, domain: &str, handler: Arc<dyn IntegrationHandler>) {
        if self
            .integrations
            .insert(domain.to_string(), handler)
            .is_some()
        {
            warn!(domain, "Integration registered twice, keeping the last one");
        }
    }

    fn integration(&self, domain: &str) -> Option<Arc<dyn IntegrationHandler>> {
        self.integrations.get(domain).map(|h| h.value().clone())
    }

    /// Set an entry up through its domain's integration; no-op when loaded
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _guard = self.lifecycle.lock().await;

        let entry = self.require(entry_id)?;
        if entry.is_loaded() {
            return Ok(());
        }

        let handler = match self.integration(&entry.domain) {
            Some(handler) => handler,
            None => {
                let reason = format!("no integration for domain {}", entry.domain);
                warn!(entry_id, "{}", reason);
                self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()));
                return Err(ConfigEntriesError::SetupFailed(reason));
            }
        };

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None);
        if let Err(reason) = handler.async_setup_entry(&entry).await {
            warn!(entry_id, "Setting up '{}' failed: {}", entry.title, reason);
            self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()));
            return Err(ConfigEntriesError::SetupFailed(reason));
        }

        self.set_state(entry_id, ConfigEntryState::Loaded, None);
        info!(domain = %entry.domain, entry_id, "Config entry '{}' loaded", entry.title);
        Ok(())
    }

    /// Unload a loaded entry; entries that never loaded just reset to
    /// `NotLoaded`
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _guard = self.lifecycle.lock().await;

        let entry = self.require(entry_id)?;
        if !entry.state.can_unload() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if !entry.is_loaded() {
            self.set_state(entry_id, ConfigEntryState::NotLoaded, None);
            return Ok(());
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None);
        let unloaded = match self.integration(&entry.domain) {
            Some(handler) => handler.async_unload_entry(&entry).await,
            None => Ok(true),
        };

        let reason = match unloaded {
            Ok(true) => {
                self.set_state(entry_id, ConfigEntryState::NotLoaded, None);
                info!(entry_id, "Config entry '{}' unloaded", entry.title);
                return Ok(());
            }
            Ok(false) => "integration reported nothing to unload".to_string(),
            Err(reason) => reason,
        };

        warn!(entry_id, "Unloading '{}' failed: {}", entry.title, reason);
        self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()));
        Err(ConfigEntriesError::UnloadFailed(reason))
    }

    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set up every known entry one after the other
    pub async fn setup_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::with_capacity(self.len());
        for entry_id in self.entry_ids() {
            results.push(self.setup(&entry_id).await);
        }
        results
    }

    pub async fn unload_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let loaded: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.is_loaded())
            .map(|e| e.key().clone())
            .collect();

        futures::future::join_all(loaded.iter().map(|entry_id| self.unload(entry_id))).await
    }
}
