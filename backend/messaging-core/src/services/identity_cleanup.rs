/// Account deletion cleanup
///
/// When the identity service hard-deletes a user, everything the core holds
/// for that identity goes with it:
/// - messages the identity sent, with their history and read states
/// - the identity's read-state rows on other people's messages
/// - history entries attributed to the identity
/// - the identity's place in every participant set; conversations left
///   with nobody in them are deleted with their messages
///
/// # Architecture
/// ```text
/// identity-service → UserDeleted → [IdentityCleanupHandler] → purge_identity
///                                      ↓ (duplicate / soft delete)
///                                     Skip
/// ```
use crate::identity::Identity;
use crate::state::CoreState;
use dashmap::mapref::entry::Entry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use event_schema::{is_compatible, EventEnvelope, MessagingEvent, UserDeletedEvent, SCHEMA_VERSION};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a purge removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub identity: Identity,
    pub messages_deleted: usize,
    pub history_entries_deleted: usize,
    pub read_states_deleted: usize,
    pub conversations_left: usize,
    pub conversations_deleted: usize,
}

impl PurgeReport {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            messages_deleted: 0,
            history_entries_deleted: 0,
            read_states_deleted: 0,
            conversations_left: 0,
            conversations_deleted: 0,
        }
    }

    /// True when the identity had nothing in the core
    pub fn is_empty(&self) -> bool {
        self.messages_deleted == 0
            && self.history_entries_deleted == 0
            && self.read_states_deleted == 0
            && self.conversations_left == 0
    }
}

pub struct IdentityCleanupService;

impl IdentityCleanupService {
    /// Remove every trace of `identity` from the core.
    ///
    /// Each conversation is purged under its own write lock; other
    /// conversations stay available throughout.
    pub fn purge_identity(state: &CoreState, identity: Identity) -> PurgeReport {
        let mut report = PurgeReport::new(identity);

        for conversation_id in state.store.conversations_of(identity) {
            let Some(handle) = state.store.conversation(conversation_id) else {
                continue;
            };
            let mut conversation = handle.write();
            if !conversation.conversation.is_participant(identity) {
                continue;
            }

            let mut sent = Vec::new();
            for message_id in conversation.message_ids.clone() {
                let Some(message) = state.store.message(message_id) else {
                    continue;
                };
                let mut record = message.lock();
                if record.message.sender == identity {
                    sent.push(message_id);
                    continue;
                }
                if record.read_states.remove(&identity).is_some() {
                    report.read_states_deleted += 1;
                }
                let before = record.history.len();
                record.history.retain(|entry| entry.edited_by != Some(identity));
                report.history_entries_deleted += before - record.history.len();
            }

            for message_id in sent {
                if let Some(removed) = state.store.remove_message(&mut conversation, message_id) {
                    report.messages_deleted += 1;
                    report.history_entries_deleted += removed.history_entries;
                    report.read_states_deleted += removed.read_states;
                }
            }

            conversation.conversation.participants.remove(&identity);
            report.conversations_left += 1;

            if conversation.conversation.participants.is_empty() {
                for message_id in conversation.message_ids.clone() {
                    if let Some(removed) = state.store.remove_message(&mut conversation, message_id) {
                        report.history_entries_deleted += removed.history_entries;
                        report.read_states_deleted += removed.read_states;
                    }
                }
                state.store.remove_conversation(conversation_id);
                report.conversations_deleted += 1;
                debug!(conversation_id = %conversation_id, "Removed conversation left without participants");
            }
        }

        state.store.forget_identity(identity);

        info!(
            identity = %identity,
            messages_deleted = report.messages_deleted,
            history_entries_deleted = report.history_entries_deleted,
            read_states_deleted = report.read_states_deleted,
            conversations_left = report.conversations_left,
            conversations_deleted = report.conversations_deleted,
            "Identity purged"
        );

        state.emit(MessagingEvent::IdentityPurged {
            user_id: identity.as_uuid(),
            messages_deleted: report.messages_deleted,
            conversations_deleted: report.conversations_deleted,
            purged_at: state.clock.now(),
        });

        report
    }
}

/// Outcome of handing one `UserDeleted` envelope to the handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Purged(PurgeReport),
    SkippedSoftDelete,
    SkippedDuplicate,
    SkippedIncompatible { schema_version: u32 },
}

/// Reacts to identity-service `UserDeleted` events.
///
/// Delivery is at least once, so envelopes are deduplicated by event id for
/// `dedup_ttl`. A purge is itself idempotent; the dedup only saves the work.
pub struct IdentityCleanupHandler {
    state: Arc<CoreState>,
    /// Event id to the clock time it was first accepted
    seen: DashMap<Uuid, DateTime<Utc>>,
    dedup_ttl: chrono::Duration,
}

impl IdentityCleanupHandler {
    pub fn new(state: Arc<CoreState>, dedup_ttl: Duration) -> Self {
        info!(dedup_ttl = ?dedup_ttl, "Initializing identity cleanup handler");
        Self {
            state,
            seen: DashMap::new(),
            dedup_ttl: chrono::Duration::from_std(dedup_ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn handle(&self, envelope: &EventEnvelope<UserDeletedEvent>) -> CleanupOutcome {
        if !is_compatible(SCHEMA_VERSION, envelope.schema_version) {
            warn!(
                event_id = %envelope.event_id,
                schema_version = envelope.schema_version,
                "Skipping UserDeleted event with incompatible schema"
            );
            return CleanupOutcome::SkippedIncompatible {
                schema_version: envelope.schema_version,
            };
        }

        if !self.first_delivery(envelope.event_id) {
            debug!(event_id = %envelope.event_id, "Duplicate UserDeleted event - skipping");
            return CleanupOutcome::SkippedDuplicate;
        }

        let event = &envelope.data;
        if event.soft_delete {
            debug!(user_id = %event.user_id, "Soft delete - keeping messaging data");
            return CleanupOutcome::SkippedSoftDelete;
        }

        let report = IdentityCleanupService::purge_identity(&self.state, Identity::from(event.user_id));
        CleanupOutcome::Purged(report)
    }

    /// Drop dedup entries older than the TTL
    ///
    /// # Returns
    /// Number of entries removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.seen.len();
        let Some(cutoff) = self.state.clock.now().checked_sub_signed(self.dedup_ttl) else {
            return 0;
        };
        self.seen.retain(|_, seen_at| *seen_at >= cutoff);
        let removed = before.saturating_sub(self.seen.len());
        if removed > 0 {
            info!(removed = removed, remaining = self.seen.len(), "Cleaned up expired dedup entries");
        }
        removed
    }

    pub fn tracked_events(&self) -> usize {
        self.seen.len()
    }

    /// Record `event_id`; false if it was already seen within the TTL
    fn first_delivery(&self, event_id: Uuid) -> bool {
        let now = self.state.clock.now();
        match self.seen.entry(event_id) {
            Entry::Occupied(mut seen) => {
                if now - *seen.get() <= self.dedup_ttl {
                    return false;
                }
                seen.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}
