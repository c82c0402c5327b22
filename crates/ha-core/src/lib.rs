//! Shared vocabulary of the runtime: entity ids, states, events, contexts
//! and service calls.

mod context;
pub mod domains;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{generate_entity_id, slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::{ServiceCall, SupportsResponse};
pub use state::State;

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
/// Published instead of on/off when the backing device can't be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

pub mod events {
    use super::*;

    pub const STATE_CHANGED: &str = "state_changed";

    /// Payload of `state_changed`; `old_state` is None on first write,
    /// `new_state` is None on removal
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        /// Entity whose state changed
        pub entity_id: EntityId,
        /// None for a newly added entity
        pub old_state: Option<State>,
        /// None for a removed entity
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
