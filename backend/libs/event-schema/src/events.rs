use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events published by the messaging core
///
/// Subscribers receive these at least once and must handle duplicates
/// idempotently (the envelope's `event_id` is stable across redeliveries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessagingEvent {
    // ============================================================================
    // CONVERSATION EVENTS
    // ============================================================================
    ConversationCreated {
        conversation_id: Uuid,
        created_by: Uuid,
        participants: Vec<Uuid>,
        created_at: DateTime<Utc>,
    },

    ParticipantAdded {
        conversation_id: Uuid,
        added_by: Uuid,
        participant_id: Uuid,
        added_at: DateTime<Utc>,
    },

    // ============================================================================
    // MESSAGE EVENTS
    // ============================================================================
    MessageCreated {
        message_id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        parent_id: Option<Uuid>,
        content: String,
        recipients: Vec<Uuid>,
        created_at: DateTime<Utc>,
    },

    MessageEdited {
        message_id: Uuid,
        conversation_id: Uuid,
        edited_by: Uuid,
        new_content: String,
        edited_at: DateTime<Utc>,
    },

    MessageDeleted {
        message_id: Uuid,
        conversation_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },

    MessageRead {
        message_id: Uuid,
        conversation_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    },

    // ============================================================================
    // ACCOUNT CLEANUP
    // ============================================================================
    IdentityPurged {
        user_id: Uuid,
        messages_deleted: usize,
        conversations_deleted: usize,
        purged_at: DateTime<Utc>,
    },
}

impl MessagingEvent {
    /// Aggregate the event belongs to; subscribers partition on this
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            MessagingEvent::ConversationCreated {
                conversation_id, ..
            }
            | MessagingEvent::ParticipantAdded {
                conversation_id, ..
            } => *conversation_id,
            MessagingEvent::MessageCreated { message_id, .. }
            | MessagingEvent::MessageEdited { message_id, .. }
            | MessagingEvent::MessageDeleted { message_id, .. }
            | MessagingEvent::MessageRead { message_id, .. } => *message_id,
            MessagingEvent::IdentityPurged { user_id, .. } => *user_id,
        }
    }

    /// Get the event type string for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            MessagingEvent::ConversationCreated { .. } => "ConversationCreated",
            MessagingEvent::ParticipantAdded { .. } => "ParticipantAdded",
            MessagingEvent::MessageCreated { .. } => "MessageCreated",
            MessagingEvent::MessageEdited { .. } => "MessageEdited",
            MessagingEvent::MessageDeleted { .. } => "MessageDeleted",
            MessagingEvent::MessageRead { .. } => "MessageRead",
            MessagingEvent::IdentityPurged { .. } => "IdentityPurged",
        }
    }

    /// Whether inbox/badge views derived from read state are affected
    pub fn affects_unread_counts(&self) -> bool {
        matches!(
            self,
            MessagingEvent::MessageCreated { .. }
                | MessagingEvent::MessageDeleted { .. }
                | MessagingEvent::MessageRead { .. }
                | MessagingEvent::IdentityPurged { .. }
        )
    }
}
