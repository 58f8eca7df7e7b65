use crate::error::{Entity, MessagingError, MessagingResult, Operation};
use crate::guards;
use crate::identity::Identity;
use crate::models::UnreadMessage;
use crate::state::CoreState;
use chrono::{DateTime, Utc};
use event_schema::MessagingEvent;
use tracing::debug;
use uuid::Uuid;

pub struct ReadStateService;

impl ReadStateService {
    /// Mark one message read for `reader`.
    ///
    /// Returns whether anything changed. Unknown messages, the sender's own
    /// messages and already-read rows are all quiet no-ops.
    pub fn mark_read(state: &CoreState, message_id: Uuid, reader: Identity) -> bool {
        let Some(handle) = state.store.message(message_id) else {
            return false;
        };

        let conversation_id = {
            let mut record = handle.lock();
            if record.deleted {
                return false;
            }
            match record.read_states.get_mut(&reader) {
                Some(read) if !*read => *read = true,
                _ => return false,
            }
            record.message.conversation_id
        };
        state.store.unindex_unread(reader, message_id);

        debug!(message_id = %message_id, reader = %reader, "Message marked read");

        state.emit(MessagingEvent::MessageRead {
            message_id,
            conversation_id,
            reader_id: reader.as_uuid(),
            read_at: state.clock.now(),
        });
        true
    }

    /// The reader's own row for a message: Some(read) if one exists
    pub fn read_state(state: &CoreState, message_id: Uuid, reader: Identity) -> Option<bool> {
        let handle = state.store.message(message_id)?;
        let record = handle.lock();
        if record.deleted {
            return None;
        }
        record.read_states.get(&reader).copied()
    }

    /// Unread inbox for `reader`, newest first
    pub fn unread_for(state: &CoreState, reader: Identity) -> Vec<UnreadMessage> {
        let mut unread: Vec<(DateTime<Utc>, i64, UnreadMessage)> = Vec::new();
        let mut stale = Vec::new();

        for message_id in state.store.unread_candidates(reader) {
            let entry = state.store.message(message_id).and_then(|handle| {
                let record = handle.lock();
                record.is_unread_by(reader).then(|| {
                    let (created_at, sequence) = record.message.sort_key();
                    (created_at, sequence, UnreadMessage::from(&record.message))
                })
            });
            match entry {
                Some(entry) => unread.push(entry),
                None => stale.push(message_id),
            }
        }

        // Rows flipped or removed since indexing
        for message_id in stale {
            state.store.unindex_unread(reader, message_id);
        }

        unread.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        unread.into_iter().map(|(_, _, message)| message).collect()
    }

    /// Number of unread messages for `reader`
    pub fn unread_count(state: &CoreState, reader: Identity) -> usize {
        state
            .store
            .unread_candidates(reader)
            .into_iter()
            .filter_map(|id| state.store.message(id))
            .filter(|handle| handle.lock().is_unread_by(reader))
            .count()
    }

    /// Mark every message of a conversation read for `reader`.
    ///
    /// # Returns
    /// Number of rows that flipped from unread to read
    pub fn mark_conversation_read(
        state: &CoreState,
        conversation_id: Uuid,
        reader: Identity,
    ) -> MessagingResult<usize> {
        let op = Operation::MarkConversationRead;
        let handle = state.store.conversation(conversation_id).ok_or_else(|| {
            MessagingError::not_found(op, Entity::Conversation, conversation_id, reader)
        })?;

        let message_ids = {
            let conversation = handle.read();
            guards::require_view(reader, &conversation.conversation, op)?;
            conversation.message_ids.clone()
        };

        let flipped = message_ids
            .into_iter()
            .filter(|id| Self::mark_read(state, *id, reader))
            .count();

        if flipped > 0 {
            debug!(
                conversation_id = %conversation_id,
                reader = %reader,
                flipped = flipped,
                "Conversation marked read"
            );
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;
    use crate::services::MessageService;

    #[tokio::test]
    async fn test_mark_read_clears_inbox_once() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let m = MessageService::post_message(&fx.state, c.id, alice, "hello", None).unwrap();

        let inbox = ReadStateService::unread_for(&fx.state, bob);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, m.id);
        assert_eq!(inbox[0].sender, alice);
        assert_eq!(inbox[0].content, "hello");

        assert_eq!(ReadStateService::read_state(&fx.state, m.id, bob), Some(false));
        assert_eq!(ReadStateService::read_state(&fx.state, m.id, alice), None);

        assert!(ReadStateService::mark_read(&fx.state, m.id, bob));
        assert!(!ReadStateService::mark_read(&fx.state, m.id, bob));
        assert_eq!(ReadStateService::read_state(&fx.state, m.id, bob), Some(true));
        assert!(ReadStateService::unread_for(&fx.state, bob).is_empty());
        assert_eq!(ReadStateService::unread_count(&fx.state, bob), 0);
    }

    #[tokio::test]
    async fn test_mark_read_is_quiet_for_sender_and_unknown() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let m = MessageService::post_message(&fx.state, c.id, alice, "hello", None).unwrap();
        fx.events.clear();

        assert!(!ReadStateService::mark_read(&fx.state, m.id, alice));
        assert!(!ReadStateService::mark_read(&fx.state, Uuid::new_v4(), bob));
        assert!(ReadStateService::unread_for(&fx.state, alice).is_empty());
        assert!(fx.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_inbox_is_newest_first() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;

        let first = MessageService::post_message(&fx.state, c.id, alice, "one", None).unwrap();
        let second = MessageService::post_message(&fx.state, c.id, alice, "two", None).unwrap();
        fx.clock.advance_secs(1);
        let third = MessageService::post_message(&fx.state, c.id, alice, "three", None).unwrap();

        let ids: Vec<_> = ReadStateService::unread_for(&fx.state, bob)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert_eq!(ReadStateService::unread_count(&fx.state, bob), 3);
    }

    #[tokio::test]
    async fn test_deleted_message_leaves_inbox() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let m = MessageService::post_message(&fx.state, c.id, alice, "oops", None).unwrap();

        MessageService::delete_message(&fx.state, m.id, alice).unwrap();
        assert!(ReadStateService::unread_for(&fx.state, bob).is_empty());
        assert!(!ReadStateService::mark_read(&fx.state, m.id, bob));
    }

    #[tokio::test]
    async fn test_mark_conversation_read() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let outsider = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let other = fx.conversation(alice, &[bob]).await;

        for text in ["a", "b", "c"] {
            MessageService::post_message(&fx.state, c.id, alice, text, None).unwrap();
        }
        MessageService::post_message(&fx.state, other.id, alice, "elsewhere", None).unwrap();

        assert_eq!(ReadStateService::mark_conversation_read(&fx.state, c.id, bob).unwrap(), 3);
        assert_eq!(ReadStateService::mark_conversation_read(&fx.state, c.id, bob).unwrap(), 0);
        assert_eq!(ReadStateService::unread_count(&fx.state, bob), 1);

        let err = ReadStateService::mark_conversation_read(&fx.state, c.id, outsider).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
    }
}
