use chrono::{DateTime, Utc};
/// Event schema for the messaging core
///
/// Defines the versioned envelope every event travels in, the events the
/// messaging core publishes, and the identity events it consumes.
/// Each envelope carries a required `schema_version` field.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Messaging domain events
pub mod events;

pub use events::MessagingEvent;

/// Current schema version for all events
pub const SCHEMA_VERSION: u32 = 1;

/// Base event envelope for every published or consumed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event ID for idempotency and tracing
    pub event_id: Uuid,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Schema version for compatibility checking
    pub schema_version: u32,
    /// Component that generated the event
    pub source: String,
    /// Correlation ID for distributed tracing
    pub correlation_id: Option<Uuid>,
    /// Actual event payload
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(source: impl Into<String>, data: T) -> Self {
        Self::at(source, Utc::now(), data)
    }

    /// Build an envelope stamped with an explicit timestamp (injected clocks).
    pub fn at(source: impl Into<String>, timestamp: DateTime<Utc>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp,
            schema_version: SCHEMA_VERSION,
            source: source.into(),
            correlation_id: None,
            data,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

// ============================================================================
// IDENTITY SERVICE EVENTS (consumed)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeletedEvent {
    pub user_id: Uuid,
    pub deleted_at: DateTime<Utc>,
    pub soft_delete: bool, // false = hard delete user data
}

// ============================================================================
// Version compatibility helpers
// ============================================================================

pub fn is_compatible(current_version: u32, message_version: u32) -> bool {
    // Exact match until a second schema version exists
    current_version == message_version
}
