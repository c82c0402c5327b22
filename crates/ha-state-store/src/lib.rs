//! Current state of every entity
//!
//! Writes and removals are announced as `state_changed` events, which is
//! how a wrapping entity notices that the entity it mirrors has moved.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Holds the current state of every entity
pub struct StateStore {
    states: DashMap<String, State>,
    bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    /// Write a state and fire `state_changed`
    ///
    /// Rewriting the same state value keeps `last_changed` and still fires.
    #[instrument(level = "debug", skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
        context: Context,
    ) -> State {
        let state = state.into();

        // entry guard ends with the match, before listeners run
        let (old_state, new_state) = match self.states.entry(entity_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let next = slot.get().with_update(state, attributes, context.clone());
                (Some(slot.insert(next.clone())), next)
            }
            Entry::Vacant(slot) => {
                let next = State::new(entity_id.clone(), state, attributes, context.clone());
                slot.insert(next.clone());
                (None, next)
            }
        };

        trace!(state = %new_state.state, "State written");
        self.bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );
        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.value().clone())
    }

    /// Just the state string
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }

    /// Entity ids of `domain`, sorted
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|s| s.domain() == domain)
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop a state; fires `state_changed` with no new state when there was one
    #[instrument(level = "debug", skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let (_, old_state) = self.states.remove(&entity_id.to_string())?;

        trace!("State removed");
        self.bus.fire_typed(
            StateChangedData {
                entity_id: entity_id.clone(),
                old_state: Some(old_state.clone()),
                new_state: None,
            },
            context,
        );
        Some(old_state)
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (Arc<EventBus>, StateStore) {
        let bus = Arc::new(EventBus::new());
        (bus.clone(), StateStore::new(bus))
    }

    fn cellar() -> EntityId {
        "climate.cellar".parse().unwrap()
    }

    #[tokio::test]
    async fn test_first_write() {
        let (bus, store) = store();
        let mut events = bus.subscribe_typed::<StateChangedData>();

        let attributes = HashMap::from([("humidity".to_string(), json!(50))]);
        let context = Context::new();
        store.set(cellar(), "dry", attributes, context.clone());

        let event = events.recv().await.unwrap();
        assert!(event.data.old_state.is_none());
        assert_eq!(event.data.new_state.unwrap().state, "dry");
        assert_eq!(event.context, context);

        assert_eq!(store.get_state("climate.cellar").as_deref(), Some("dry"));
        assert_eq!(store.get("climate.cellar").unwrap().attribute::<u32>("humidity"), Some(50));
    }

    #[tokio::test]
    async fn test_rewrite_reports_previous_state() {
        let (bus, store) = store();
        let first = store.set(cellar(), "dry", HashMap::new(), Context::new());

        let mut events = bus.subscribe_typed::<StateChangedData>();
        let same = store.set(cellar(), "dry", HashMap::new(), Context::new());
        assert_eq!(same.last_changed, first.last_changed);
        store.set(cellar(), "off", HashMap::new(), Context::new());

        let repeat = events.recv().await.unwrap();
        assert_eq!(repeat.data.old_state.unwrap().state, "dry");
        let change = events.recv().await.unwrap();
        assert_eq!(change.data.old_state.unwrap().state, "dry");
        assert_eq!(change.data.new_state.unwrap().state, "off");
        assert_eq!(store.entity_count(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let (bus, store) = store();
        store.set(cellar(), "dry", HashMap::new(), Context::new());
        store.set("humidifier.cellar".parse().unwrap(), "on", HashMap::new(), Context::new());
        assert_eq!(store.entity_ids("climate"), vec!["climate.cellar"]);

        let mut events = bus.subscribe_typed::<StateChangedData>();
        assert_eq!(store.remove(&cellar(), Context::new()).unwrap().state, "dry");
        assert!(events.recv().await.unwrap().data.new_state.is_none());

        assert!(!store.contains("climate.cellar"));
        assert!(store.entity_ids("climate").is_empty());
        assert!(store.remove(&cellar(), Context::new()).is_none());
    }
}
