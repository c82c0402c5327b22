//! In-process event bus
//!
//! One broadcast channel per event type. On top of it sits
//! [`EventBus::track_state_change`], a scoped subscription to the state
//! changes of a fixed set of entities.

use dashmap::DashMap;
use ha_core::events::{StateChangedData, STATE_CHANGED};
use ha_core::{Context, Event, EventData, EventType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Events a slow subscriber may fall behind before it starts losing them
const CHANNEL_CAPACITY: usize = 1024;

/// Publish/subscribe hub for events
pub struct EventBus {
    channels: DashMap<EventType, broadcast::Sender<Event>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Receiver for every later event of `event_type`
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        self.channels
            .entry(event_type.into())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_typed<T: EventData + DeserializeOwned>(&self) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _payload: PhantomData,
        }
    }

    /// Deliver to current subscribers; with none the event is dropped
    pub fn fire(&self, event: Event) {
        trace!(event_type = %event.event_type, "Event fired");
        if let Some(tx) = self.channels.get(&event.event_type) {
            let _ = tx.send(event);
        }
    }

    pub fn fire_typed<T: EventData + Serialize>(&self, data: T, context: Context) {
        let event = Event::typed(data, context);
        match serde_json::to_value(&event.data) {
            Ok(json) => self.fire(event.map_data(|_| json)),
            Err(e) => warn!(event_type = %event.event_type, error = %e, "Unserializable event dropped"),
        }
    }

    /// Track state changes of a set of entities
    ///
    /// The callback runs on a dedicated task, once per `state_changed` event
    /// for one of `entity_ids`, in the order the events were fired. When the
    /// task falls behind the bus it gets [`TrackedChange::Missed`] instead of
    /// the dropped events, since a tracked one may have been among them. The
    /// subscription lives as long as the returned listener; dropping it stops
    /// the task.
    pub fn track_state_change<I, S, F>(&self, entity_ids: I, mut callback: F) -> StateChangeListener
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(TrackedChange) + Send + 'static,
    {
        let entity_ids: HashSet<String> = entity_ids.into_iter().map(Into::into).collect();
        let tracked: Vec<String> = entity_ids.iter().cloned().collect();
        let mut rx = self.subscribe(STATE_CHANGED);

        debug!(entity_ids = ?tracked, "Tracking state changes");

        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "State change listener lagged behind the bus");
                        callback(TrackedChange::Missed { skipped });
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let relevant = event
                    .data
                    .get("entity_id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| entity_ids.contains(id));
                if !relevant {
                    continue;
                }

                match serde_json::from_value::<StateChangedData>(event.data.clone()) {
                    Ok(data) => callback(TrackedChange::Changed(event.map_data(|_| data))),
                    Err(e) => warn!(error = %e, "Malformed state_changed event"),
                }
            }
        });

        StateChangeListener {
            entity_ids: tracked,
            handle,
        }
    }

    /// Event types that have had at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification handed to a state change tracker
#[derive(Debug, Clone)]
pub enum TrackedChange {
    /// One of the tracked entities changed
    Changed(Event<StateChangedData>),
    /// `skipped` events were dropped before the tracker saw them
    Missed { skipped: u64 },
}

/// Handle to a running state change tracker
///
/// Owning the handle keeps the subscription alive. Dropping it cancels the
/// listener task, so holders release their subscription simply by going out
/// of scope.
#[derive(Debug)]
pub struct StateChangeListener {
    entity_ids: Vec<String>,
    handle: JoinHandle<()>,
}

impl StateChangeListener {
    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for StateChangeListener {
    fn drop(&mut self) {
        trace!(entity_ids = ?self.entity_ids, "Releasing state change listener");
        self.handle.abort();
    }
}

/// Receiver decoding each event into `T`
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _payload: PhantomData<T>,
}

impl<T: EventData + DeserializeOwned> TypedEventReceiver<T> {
    /// Next event whose payload decodes as `T`; others are skipped
    pub async fn recv(&mut self) -> Result<Event<T>, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = T::deserialize(&event.data) {
                return Ok(event.map_data(|_| data));
            }
        }
    }
}
