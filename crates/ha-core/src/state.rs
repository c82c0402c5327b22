use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_UNAVAILABLE};

/// Snapshot of one entity as held by the state store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// Entity this state belongs to
    pub entity_id: EntityId,

    /// "dry", "off", "unavailable", ...
    pub state: String,

    /// Attributes such as `friendly_name` or `humidity`
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Moves only when `state` itself changes
    pub last_changed: DateTime<Utc>,
    /// Moves on every write
    pub last_updated: DateTime<Utc>,
    /// Context of the write that produced this state
    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor snapshot for a new write of the same entity
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let mut next = Self::new(self.entity_id.clone(), new_state, new_attributes, context);
        if next.state == self.state {
            next.last_changed = self.last_changed;
        }
        next
    }

    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    /// `friendly_name`, else the object id with spaces for underscores
    pub fn name(&self) -> String {
        match self.attribute::<String>("friendly_name") {
            Some(name) => name,
            None => self.entity_id.object_id().replace('_', " "),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Typed attribute; a missing or mistyped attribute reads as None
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        T::deserialize(self.attributes.get(key)?).ok()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // timestamps and context ignored
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
