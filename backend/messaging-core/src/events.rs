//! Event publication.
//!
//! The core hands every committed change to an [`EventPublisher`]. The
//! publisher is chosen by whoever builds the core; nothing is registered
//! globally.

use event_schema::{EventEnvelope, MessagingEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

pub const EVENT_SOURCE: &str = "messaging-core";

pub type CoreEvent = EventEnvelope<MessagingEvent>;

/// Sink for events emitted after a mutation has been applied.
///
/// Must not block: it is called on the caller's request path.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CoreEvent);
}

/// Fan-out over a tokio broadcast channel
pub struct BroadcastPublisher {
    sender: broadcast::Sender<CoreEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published from now on.
    ///
    /// Slow subscribers that fall more than `capacity` events behind observe
    /// `RecvError::Lagged` and should resynchronise from the core.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: CoreEvent) {
        let event_type = event.data.event_type();
        let aggregate_id = event.data.aggregate_id();
        if self.sender.send(event).is_err() {
            debug!(
                event_type = event_type,
                aggregate_id = %aggregate_id,
                "No subscribers for event"
            );
        }
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: CoreEvent) {}
}

/// Keeps every event in memory, in publication order
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<CoreEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CoreEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .map(|event| event.data.event_type())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: CoreEvent) {
        self.events.lock().push(event);
    }
}
