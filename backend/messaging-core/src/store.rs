//! In-memory tables backing the core.
//!
//! Conversations and messages each sit behind their own lock; there is no
//! lock over the whole store. Lock order is conversation before message.
//! No map guard is held while another lock is taken: lookups clone the
//! `Arc` out of the map and drop the guard first.
//!
//! A [`MessageRecord`] owns its history and read-state rows, so a message
//! becomes visible with everything it owns already in place. The
//! conversation's message list and the per-reader unread index are
//! secondary indexes; readers re-validate them against the record.

use crate::identity::Identity;
use crate::models::{Conversation, Message, MessageHistoryEntry};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub(crate) type ConversationHandle = Arc<RwLock<ConversationRecord>>;
pub(crate) type MessageHandle = Arc<Mutex<MessageRecord>>;

#[derive(Debug)]
pub(crate) struct ConversationRecord {
    pub conversation: Conversation,
    /// Store-wide creation ordinal, breaks created_at ties in listings
    pub creation_seq: u64,
    /// Messages of this conversation in sequence order
    pub message_ids: Vec<Uuid>,
    next_sequence: i64,
}

impl ConversationRecord {
    pub fn next_sequence(&mut self) -> i64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

#[derive(Debug)]
pub(crate) struct MessageRecord {
    pub message: Message,
    pub history: Vec<MessageHistoryEntry>,
    /// reader -> read; never contains the sender
    pub read_states: HashMap<Identity, bool>,
    /// Set under the record lock when the message leaves the store
    pub deleted: bool,
}

impl MessageRecord {
    pub fn new(message: Message, recipients: impl IntoIterator<Item = Identity>) -> Self {
        let sender = message.sender;
        let read_states = recipients
            .into_iter()
            .filter(|reader| *reader != sender)
            .map(|reader| (reader, false))
            .collect();
        Self {
            message,
            history: Vec::new(),
            read_states,
            deleted: false,
        }
    }

    pub fn is_unread_by(&self, reader: Identity) -> bool {
        !self.deleted && self.read_states.get(&reader) == Some(&false)
    }

    pub fn unread_readers(&self) -> Vec<Identity> {
        self.read_states
            .iter()
            .filter(|(_, read)| !**read)
            .map(|(reader, _)| *reader)
            .collect()
    }
}

/// What a removed message took with it
#[derive(Debug)]
pub(crate) struct RemovedMessage {
    pub message: Message,
    pub history_entries: usize,
    pub read_states: usize,
}

#[derive(Debug, Default)]
pub struct Store {
    conversations: DashMap<Uuid, ConversationHandle>,
    messages: DashMap<Uuid, MessageHandle>,
    /// identity -> conversations it participates in
    memberships: DashMap<Identity, HashSet<Uuid>>,
    /// reader -> messages that may still be unread for them
    unread: DashMap<Identity, HashSet<Uuid>>,
    creation_counter: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub(crate) fn conversation(&self, id: Uuid) -> Option<ConversationHandle> {
        self.conversations.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn insert_conversation(&self, conversation: Conversation) -> ConversationHandle {
        let id = conversation.id;
        let participants: Vec<Identity> = conversation.participants.iter().copied().collect();
        let record = ConversationRecord {
            conversation,
            creation_seq: self.creation_counter.fetch_add(1, Ordering::Relaxed),
            message_ids: Vec::new(),
            next_sequence: 0,
        };
        let handle = Arc::new(RwLock::new(record));
        self.conversations.insert(id, Arc::clone(&handle));
        for participant in participants {
            self.add_membership(participant, id);
        }
        handle
    }

    pub(crate) fn remove_conversation(&self, id: Uuid) {
        self.conversations.remove(&id);
    }

    pub(crate) fn add_membership(&self, identity: Identity, conversation_id: Uuid) {
        self.memberships
            .entry(identity)
            .or_default()
            .insert(conversation_id);
    }

    pub(crate) fn conversations_of(&self, identity: Identity) -> Vec<Uuid> {
        self.memberships
            .get(&identity)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn forget_identity(&self, identity: Identity) {
        self.memberships.remove(&identity);
        self.unread.remove(&identity);
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub(crate) fn message(&self, id: Uuid) -> Option<MessageHandle> {
        self.messages.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Make a fully built record visible. Caller holds the conversation write lock.
    pub(crate) fn insert_message(&self, conversation: &mut ConversationRecord, record: MessageRecord) {
        let id = record.message.id;
        let unread_readers = record.unread_readers();
        self.messages.insert(id, Arc::new(Mutex::new(record)));
        conversation.message_ids.push(id);
        for reader in unread_readers {
            self.index_unread(reader, id);
        }
    }

    /// Take a message out of the store. Caller holds the conversation write lock.
    pub(crate) fn remove_message(
        &self,
        conversation: &mut ConversationRecord,
        message_id: Uuid,
    ) -> Option<RemovedMessage> {
        conversation.message_ids.retain(|id| *id != message_id);
        let (_, handle) = self.messages.remove(&message_id)?;

        let mut record = handle.lock();
        record.deleted = true;
        for reader in record.unread_readers() {
            self.unindex_unread(reader, message_id);
        }
        Some(RemovedMessage {
            message: record.message.clone(),
            history_entries: std::mem::take(&mut record.history).len(),
            read_states: std::mem::take(&mut record.read_states).len(),
        })
    }

    /// Snapshot the live messages of a conversation. Caller holds its lock.
    pub(crate) fn messages_of(&self, conversation: &ConversationRecord) -> Vec<Message> {
        conversation
            .message_ids
            .iter()
            .filter_map(|id| self.message(*id))
            .filter_map(|handle| {
                let record = handle.lock();
                (!record.deleted).then(|| record.message.clone())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Unread index
    // ------------------------------------------------------------------

    pub(crate) fn index_unread(&self, reader: Identity, message_id: Uuid) {
        self.unread.entry(reader).or_default().insert(message_id);
    }

    pub(crate) fn unindex_unread(&self, reader: Identity, message_id: Uuid) {
        let now_empty = match self.unread.get_mut(&reader) {
            Some(mut ids) => {
                ids.remove(&message_id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.unread.remove_if(&reader, |_, ids| ids.is_empty());
        }
    }

    pub(crate) fn unread_candidates(&self, reader: Identity) -> Vec<Uuid> {
        self.unread
            .get(&reader)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn conversation(members: &[Identity]) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participants: members.iter().copied().collect::<BTreeSet<_>>(),
            created_at: Utc::now(),
        }
    }

    fn message(conversation_id: Uuid, sender: Identity, sequence_number: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            content: "hi".into(),
            parent_id: None,
            created_at: Utc::now(),
            sequence_number,
            edited: false,
            last_edited_by: None,
            edited_at: None,
        }
    }

    #[test]
    fn test_record_never_tracks_sender_read_state() {
        let alice = Identity::new();
        let bob = Identity::new();
        let m = message(Uuid::new_v4(), alice, 1);

        let record = MessageRecord::new(m, [alice, bob]);
        assert_eq!(record.read_states.len(), 1);
        assert!(record.is_unread_by(bob));
        assert!(!record.is_unread_by(alice));
    }

    #[test]
    fn test_insert_and_remove_message_maintains_indexes() {
        let store = Store::new();
        let alice = Identity::new();
        let bob = Identity::new();
        let c = conversation(&[alice, bob]);
        let handle = store.insert_conversation(c.clone());

        let m = message(c.id, alice, 1);
        let id = m.id;
        {
            let mut conv = handle.write();
            store.insert_message(&mut conv, MessageRecord::new(m, [alice, bob]));
        }
        assert_eq!(store.message_count(), 1);
        assert_eq!(store.unread_candidates(bob), vec![id]);
        assert!(store.unread_candidates(alice).is_empty());

        let removed = {
            let mut conv = handle.write();
            store.remove_message(&mut conv, id).unwrap()
        };
        assert_eq!(removed.read_states, 1);
        assert_eq!(store.message_count(), 0);
        assert!(store.unread_candidates(bob).is_empty());
        assert!(handle.read().message_ids.is_empty());
    }

    #[test]
    fn test_memberships_follow_conversation_insert() {
        let store = Store::new();
        let alice = Identity::new();
        let c = conversation(&[alice]);
        store.insert_conversation(c.clone());

        assert_eq!(store.conversations_of(alice), vec![c.id]);
        store.forget_identity(alice);
        assert!(store.conversations_of(alice).is_empty());
    }
}
