use crate::error::{Entity, MessagingError, MessagingResult, Operation};
use crate::guards;
use crate::identity::Identity;
use crate::models::{Message, MessageFilter, MessageHistoryEntry, Pagination, ThreadNode};
use crate::rate_limit::{ActionClass, RateDecision};
use crate::state::CoreState;
use crate::store::MessageRecord;
use event_schema::MessagingEvent;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct MessageService;

impl MessageService {
    /// Post a message, optionally as a reply to `parent_id`.
    ///
    /// Checks run in order: conversation exists, sender participates, content
    /// is valid, parent resolves inside the conversation, rate limit. A post
    /// rejected by an earlier check does not spend rate-limit budget.
    pub fn post_message(
        state: &CoreState,
        conversation_id: Uuid,
        sender: Identity,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> MessagingResult<Message> {
        let op = Operation::PostMessage;
        let handle = state.store.conversation(conversation_id).ok_or_else(|| {
            MessagingError::not_found(op, Entity::Conversation, conversation_id, sender)
        })?;

        let mut conversation = handle.write();
        guards::require_post(sender, &conversation.conversation, op)?;
        validate_content(state, content, op)?;

        if let Some(parent_id) = parent_id {
            let parent_ok = state.store.message(parent_id).is_some_and(|handle| {
                let parent = handle.lock();
                !parent.deleted && parent.message.conversation_id == conversation_id
            });
            if !parent_ok {
                return Err(MessagingError::invalid(
                    op,
                    format!("parent message {parent_id} not found in conversation {conversation_id}"),
                ));
            }
        }

        let now = state.clock.now();
        if let RateDecision::Limited { retry_after } =
            state
                .rate_limiter
                .check(sender, ActionClass::PostMessage, now)
        {
            warn!(sender = %sender, conversation_id = %conversation_id, "Message rate limit exceeded");
            return Err(MessagingError::RateLimited {
                identity: sender,
                action: ActionClass::PostMessage,
                retry_after_secs: retry_after_secs(retry_after),
            });
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            content: content.to_string(),
            parent_id,
            created_at: now,
            sequence_number: conversation.next_sequence(),
            edited: false,
            last_edited_by: None,
            edited_at: None,
        };
        let recipients: Vec<Identity> = conversation.conversation.others(sender).collect();
        state.store.insert_message(
            &mut conversation,
            MessageRecord::new(message.clone(), recipients.iter().copied()),
        );
        drop(conversation);

        info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender = %sender,
            is_reply = message.is_reply(),
            recipients = recipients.len(),
            "Message posted"
        );

        state.emit(MessagingEvent::MessageCreated {
            message_id: message.id,
            conversation_id,
            sender_id: sender.as_uuid(),
            parent_id,
            content: message.content.clone(),
            recipients: recipients.iter().map(Identity::as_uuid).collect(),
            created_at: message.created_at,
        });

        Ok(message)
    }

    /// Replace the content of a message; only its sender may do this.
    ///
    /// Identical content is a no-op. Otherwise the previous content is kept
    /// as a history entry written under the same lock as the new content.
    pub fn edit_message(
        state: &CoreState,
        message_id: Uuid,
        actor: Identity,
        new_content: &str,
    ) -> MessagingResult<Message> {
        let op = Operation::EditMessage;
        let handle = state
            .store
            .message(message_id)
            .ok_or_else(|| MessagingError::not_found(op, Entity::Message, message_id, actor))?;

        let mut record = handle.lock();
        if record.deleted {
            return Err(MessagingError::not_found(op, Entity::Message, message_id, actor));
        }
        guards::require_modify(actor, &record.message, op)?;
        validate_content(state, new_content, op)?;

        if record.message.content == new_content {
            debug!(message_id = %message_id, "Edit with identical content ignored");
            return Ok(record.message.clone());
        }

        let edited_at = state.clock.now();
        let old_content = std::mem::replace(&mut record.message.content, new_content.to_string());
        record.history.push(MessageHistoryEntry {
            id: Uuid::new_v4(),
            message_id,
            old_content,
            edited_by: Some(actor),
            edited_at,
        });
        record.message.edited = true;
        record.message.last_edited_by = Some(actor);
        record.message.edited_at = Some(edited_at);
        let message = record.message.clone();
        let revisions = record.history.len();
        drop(record);

        info!(
            message_id = %message_id,
            conversation_id = %message.conversation_id,
            editor = %actor,
            revisions = revisions,
            "Message edited"
        );

        state.emit(MessagingEvent::MessageEdited {
            message_id,
            conversation_id: message.conversation_id,
            edited_by: actor.as_uuid(),
            new_content: message.content.clone(),
            edited_at,
        });

        Ok(message)
    }

    /// Delete a message with its history and read states. Replies stay and
    /// keep pointing at the removed id.
    pub fn delete_message(state: &CoreState, message_id: Uuid, actor: Identity) -> MessagingResult<()> {
        let op = Operation::DeleteMessage;
        let not_found = || MessagingError::not_found(op, Entity::Message, message_id, actor);
        let handle = state.store.message(message_id).ok_or_else(not_found)?;

        let conversation_id = {
            let record = handle.lock();
            if record.deleted {
                return Err(not_found());
            }
            guards::require_modify(actor, &record.message, op)?;
            record.message.conversation_id
        };

        let conversation_handle = state.store.conversation(conversation_id).ok_or_else(not_found)?;
        let removed = {
            let mut conversation = conversation_handle.write();
            state.store.remove_message(&mut conversation, message_id)
        }
        .ok_or_else(not_found)?;

        info!(
            message_id = %message_id,
            conversation_id = %conversation_id,
            deleted_by = %actor,
            history_entries = removed.history_entries,
            read_states = removed.read_states,
            "Message deleted"
        );

        state.emit(MessagingEvent::MessageDeleted {
            message_id,
            conversation_id,
            deleted_by: actor.as_uuid(),
            deleted_at: state.clock.now(),
        });

        Ok(())
    }

    pub fn get_message(state: &CoreState, message_id: Uuid, actor: Identity) -> MessagingResult<Message> {
        visible_message(state, message_id, actor, Operation::GetMessage)
    }

    /// Edit history of a message, oldest revision first
    pub fn message_history(
        state: &CoreState,
        message_id: Uuid,
        actor: Identity,
    ) -> MessagingResult<Vec<MessageHistoryEntry>> {
        let op = Operation::MessageHistory;
        visible_message(state, message_id, actor, op)?;

        let handle = state
            .store
            .message(message_id)
            .ok_or_else(|| MessagingError::not_found(op, Entity::Message, message_id, actor))?;
        let record = handle.lock();
        if record.deleted {
            return Err(MessagingError::not_found(op, Entity::Message, message_id, actor));
        }
        Ok(record.history.clone())
    }

    /// The message `root_message_id` with every reply beneath it.
    ///
    /// Siblings are ordered by creation time, then sequence number. The
    /// conversation is read under one lock so the tree is a consistent
    /// snapshot.
    pub fn get_thread(
        state: &CoreState,
        root_message_id: Uuid,
        actor: Identity,
    ) -> MessagingResult<ThreadNode> {
        let op = Operation::GetThread;
        let not_found = || MessagingError::not_found(op, Entity::Message, root_message_id, actor);
        let root = state.store.message(root_message_id).ok_or_else(not_found)?;

        let conversation_id = {
            let record = root.lock();
            if record.deleted {
                return Err(not_found());
            }
            record.message.conversation_id
        };

        let handle = state.store.conversation(conversation_id).ok_or_else(not_found)?;
        let messages = {
            let conversation = handle.read();
            if !guards::can_view(actor, &conversation.conversation) {
                return Err(MessagingError::forbidden(
                    op,
                    Entity::Conversation,
                    conversation_id,
                    actor,
                ));
            }
            state.store.messages_of(&conversation)
        };

        if !messages.iter().any(|m| m.id == root_message_id) {
            return Err(not_found());
        }

        build_thread(root_message_id, messages).map_err(|detail| {
            error!(
                root_message_id = %root_message_id,
                conversation_id = %conversation_id,
                detail = %detail,
                "Thread structure is corrupt"
            );
            MessagingError::Internal { operation: op, detail }
        })
    }

    /// Messages of a conversation, oldest first
    pub fn list_messages(
        state: &CoreState,
        conversation_id: Uuid,
        actor: Identity,
        pagination: Pagination,
    ) -> MessagingResult<Vec<Message>> {
        let messages = conversation_messages(state, conversation_id, actor, Operation::ListMessages)?;
        Ok(paginate(state, messages, pagination))
    }

    /// Messages of a conversation matching `filter`, oldest first
    pub fn search_messages(
        state: &CoreState,
        conversation_id: Uuid,
        actor: Identity,
        filter: &MessageFilter,
        pagination: Pagination,
    ) -> MessagingResult<Vec<Message>> {
        let op = Operation::SearchMessages;
        if let (Some(after), Some(before)) = (filter.created_after, filter.created_before) {
            if after > before {
                return Err(MessagingError::invalid(
                    op,
                    "created_after must not be later than created_before",
                ));
            }
        }

        let mut messages = conversation_messages(state, conversation_id, actor, op)?;
        messages.retain(|m| filter.matches(m));
        Ok(paginate(state, messages, pagination))
    }
}

fn validate_content(state: &CoreState, content: &str, op: Operation) -> MessagingResult<()> {
    if content.trim().is_empty() {
        return Err(MessagingError::invalid(op, "content must not be empty"));
    }
    let max = state.config.max_content_length;
    if content.chars().count() > max {
        return Err(MessagingError::invalid(
            op,
            format!("content exceeds {max} characters"),
        ));
    }
    Ok(())
}

/// Whole seconds, rounded up, never zero
fn retry_after_secs(retry_after: chrono::Duration) -> u64 {
    let millis = retry_after.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}

/// A message the actor may see; anything else is NotFound
fn visible_message(
    state: &CoreState,
    message_id: Uuid,
    actor: Identity,
    op: Operation,
) -> MessagingResult<Message> {
    let not_found = || MessagingError::not_found(op, Entity::Message, message_id, actor);
    let handle = state.store.message(message_id).ok_or_else(not_found)?;
    let message = {
        let record = handle.lock();
        if record.deleted {
            return Err(not_found());
        }
        record.message.clone()
    };

    let conversation = state
        .store
        .conversation(message.conversation_id)
        .ok_or_else(not_found)?;
    let visible = guards::can_view(actor, &conversation.read().conversation);
    if visible {
        Ok(message)
    } else {
        Err(not_found())
    }
}

/// Sorted snapshot of a conversation the actor participates in
fn conversation_messages(
    state: &CoreState,
    conversation_id: Uuid,
    actor: Identity,
    op: Operation,
) -> MessagingResult<Vec<Message>> {
    let handle = state.store.conversation(conversation_id).ok_or_else(|| {
        MessagingError::not_found(op, Entity::Conversation, conversation_id, actor)
    })?;

    let mut messages = {
        let conversation = handle.read();
        guards::require_view(actor, &conversation.conversation, op)?;
        state.store.messages_of(&conversation)
    };
    messages.sort_by_key(Message::sort_key);
    Ok(messages)
}

fn paginate(state: &CoreState, messages: Vec<Message>, pagination: Pagination) -> Vec<Message> {
    let limit = state.config.page_limit(pagination.limit);
    messages
        .into_iter()
        .skip(pagination.offset)
        .take(limit)
        .collect()
}

/// Assemble the reply tree under `root_id` from a flat list of messages.
///
/// The walk is iterative and records every id it visits; reaching an id a
/// second time means the parent links form a cycle, reported as an error.
pub(crate) fn build_thread(root_id: Uuid, messages: Vec<Message>) -> Result<ThreadNode, String> {
    let mut children: HashMap<Uuid, Vec<(chrono::DateTime<chrono::Utc>, i64, Uuid)>> =
        HashMap::new();
    for message in &messages {
        if let Some(parent_id) = message.parent_id {
            let (created_at, sequence) = message.sort_key();
            children
                .entry(parent_id)
                .or_default()
                .push((created_at, sequence, message.id));
        }
    }
    for siblings in children.values_mut() {
        siblings.sort();
    }

    // Pre-order walk
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            return Err(format!("reply cycle detected at message {id}"));
        }
        order.push(id);
        if let Some(siblings) = children.get(&id) {
            stack.extend(siblings.iter().rev().map(|(_, _, child)| *child));
        }
    }

    // Children appear after their parent in pre-order, so building in
    // reverse finds every child node ready.
    let mut by_id: HashMap<Uuid, Message> = messages.into_iter().map(|m| (m.id, m)).collect();
    let mut built: HashMap<Uuid, ThreadNode> = HashMap::with_capacity(order.len());
    for id in order.into_iter().rev() {
        let message = by_id
            .remove(&id)
            .ok_or_else(|| format!("message {id} missing from thread snapshot"))?;
        let replies = children
            .get(&id)
            .map(|siblings| {
                siblings
                    .iter()
                    .map(|(_, _, child)| {
                        built
                            .remove(child)
                            .ok_or_else(|| format!("reply {child} built out of order"))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        built.insert(id, ThreadNode { message, replies });
    }

    built
        .remove(&root_id)
        .ok_or_else(|| format!("root message {root_id} missing from thread snapshot"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::models::Conversation;
    use crate::services::test_support::Fixture;
    use chrono::Utc;

    fn post(fx: &Fixture, c: &Conversation, sender: Identity, text: &str, parent: Option<Uuid>) -> Message {
        MessageService::post_message(&fx.state, c.id, sender, text, parent).unwrap()
    }

    #[tokio::test]
    async fn test_post_creates_unread_rows_for_others_only() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let carol = fx.user();
        let c = fx.conversation(alice, &[bob, carol]).await;

        let m = post(&fx, &c, alice, "hello", None);
        let handle = fx.state.store.message(m.id).unwrap();
        let record = handle.lock();

        assert_eq!(record.read_states.len(), 2);
        assert_eq!(record.read_states.get(&bob), Some(&false));
        assert_eq!(record.read_states.get(&carol), Some(&false));
        assert!(!record.read_states.contains_key(&alice));
        assert_eq!(m.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_post_rejections() {
        let fx = Fixture::new();
        let alice = fx.user();
        let outsider = fx.user();
        let c = fx.conversation(alice, &[]).await;
        let other = fx.conversation(outsider, &[]).await;
        let foreign = post(&fx, &other, outsider, "elsewhere", None);

        let err = MessageService::post_message(&fx.state, Uuid::new_v4(), alice, "hi", None).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));

        let err = MessageService::post_message(&fx.state, c.id, outsider, "hi", None).unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden { .. }));

        let err = MessageService::post_message(&fx.state, c.id, alice, "  \n\t ", None).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidArgument { .. }));

        let err = MessageService::post_message(&fx.state, c.id, alice, "hi", Some(foreign.id)).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidArgument { .. }));

        let err = MessageService::post_message(&fx.state, c.id, alice, "hi", Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, MessagingError::InvalidArgument { .. }));

        // None of the rejected posts spent rate-limit budget
        let now = fx.clock.now();
        assert_eq!(
            fx.state.rate_limiter.in_window(alice, ActionClass::PostMessage, now),
            0
        );
    }

    #[tokio::test]
    async fn test_sixth_post_in_window_is_rate_limited() {
        let fx = Fixture::new();
        let alice = fx.user();
        let c = fx.conversation(alice, &[]).await;

        for i in 0..5 {
            post(&fx, &c, alice, &format!("message {i}"), None);
            fx.clock.advance_secs(2);
        }
        let err = MessageService::post_message(&fx.state, c.id, alice, "one too many", None).unwrap_err();
        match err {
            MessagingError::RateLimited {
                identity,
                retry_after_secs,
                ..
            } => {
                assert_eq!(identity, alice);
                assert_eq!(retry_after_secs, 50);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        fx.clock.advance_secs(51);
        post(&fx, &c, alice, "back again", None);
    }

    #[tokio::test]
    async fn test_edit_same_content_is_noop() {
        let fx = Fixture::new();
        let alice = fx.user();
        let c = fx.conversation(alice, &[]).await;
        let m = post(&fx, &c, alice, "hello", None);
        fx.events.clear();

        let unchanged = MessageService::edit_message(&fx.state, m.id, alice, "hello").unwrap();
        assert!(!unchanged.edited);
        assert!(MessageService::message_history(&fx.state, m.id, alice).unwrap().is_empty());
        assert!(fx.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_edit_records_previous_content() {
        let fx = Fixture::new();
        let alice = fx.user();
        let c = fx.conversation(alice, &[]).await;
        let m = post(&fx, &c, alice, "hello", None);

        fx.clock.advance_secs(5);
        let edited = MessageService::edit_message(&fx.state, m.id, alice, "hello there").unwrap();
        MessageService::edit_message(&fx.state, m.id, alice, "hello again").unwrap();

        assert!(edited.edited);
        assert_eq!(edited.last_edited_by, Some(alice));
        assert_eq!(edited.content, "hello there");

        let history = MessageService::message_history(&fx.state, m.id, alice).unwrap();
        let old: Vec<_> = history.iter().map(|h| h.old_content.as_str()).collect();
        assert_eq!(old, vec!["hello", "hello there"]);
        assert!(history.iter().all(|h| h.edited_by == Some(alice)));
    }

    #[tokio::test]
    async fn test_only_sender_may_edit_or_delete() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let m = post(&fx, &c, alice, "mine", None);

        let err = MessageService::edit_message(&fx.state, m.id, bob, "yours").unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden { .. }));
        let err = MessageService::delete_message(&fx.state, m.id, bob).unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden { .. }));
        let err = MessageService::edit_message(&fx.state, m.id, alice, "").unwrap_err();
        assert!(matches!(err, MessagingError::InvalidArgument { .. }));
        let err = MessageService::edit_message(&fx.state, Uuid::new_v4(), alice, "x").unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_keeps_replies_with_dangling_parent() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;
        let root = post(&fx, &c, alice, "root", None);
        let reply = post(&fx, &c, bob, "reply", Some(root.id));

        MessageService::delete_message(&fx.state, root.id, alice).unwrap();

        let err = MessageService::get_message(&fx.state, root.id, alice).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
        let err = MessageService::delete_message(&fx.state, root.id, alice).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));

        let kept = MessageService::get_message(&fx.state, reply.id, alice).unwrap();
        assert_eq!(kept.parent_id, Some(root.id));

        let thread = MessageService::get_thread(&fx.state, reply.id, alice).unwrap();
        assert_eq!(thread.message_count(), 1);
    }

    #[tokio::test]
    async fn test_thread_nests_replies_in_order() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;

        let a = post(&fx, &c, alice, "a", None);
        let b = post(&fx, &c, bob, "b", Some(a.id));
        let b2 = post(&fx, &c, alice, "b2", Some(a.id));
        let cc = post(&fx, &c, alice, "c", Some(b.id));
        let unrelated = post(&fx, &c, bob, "other root", None);

        let thread = MessageService::get_thread(&fx.state, a.id, bob).unwrap();
        assert_eq!(thread.ids(), vec![a.id, b.id, cc.id, b2.id]);
        assert!(thread.find(unrelated.id).is_none());
        assert_eq!(thread.replies[0].replies[0].message.id, cc.id);
    }

    #[tokio::test]
    async fn test_thread_requires_participation() {
        let fx = Fixture::new();
        let alice = fx.user();
        let outsider = fx.user();
        let c = fx.conversation(alice, &[]).await;
        let m = post(&fx, &c, alice, "secret", None);

        let err = MessageService::get_thread(&fx.state, m.id, outsider).unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden { .. }));
        let err = MessageService::get_thread(&fx.state, Uuid::new_v4(), alice).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cycle_in_store_fails_internal() {
        let fx = Fixture::new();
        let alice = fx.user();
        let c = fx.conversation(alice, &[]).await;

        // Parent links that the public API can never produce: a -> c -> b -> a
        let (a, b, cc) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let handle = fx.state.store.conversation(c.id).unwrap();
        {
            let mut conversation = handle.write();
            for (id, parent) in [(a, cc), (b, a), (cc, b)] {
                let sequence_number = conversation.next_sequence();
                let message = Message {
                    id,
                    conversation_id: c.id,
                    sender: alice,
                    content: "loop".into(),
                    parent_id: Some(parent),
                    created_at: Utc::now(),
                    sequence_number,
                    edited: false,
                    last_edited_by: None,
                    edited_at: None,
                };
                fx.state
                    .store
                    .insert_message(&mut conversation, MessageRecord::new(message, Vec::new()));
            }
        }

        let err = MessageService::get_thread(&fx.state, a, alice).unwrap_err();
        assert!(matches!(err, MessagingError::Internal { .. }));
    }

    #[test]
    fn test_build_thread_ignores_insertion_order() {
        let alice = Identity::new();
        let conversation_id = Uuid::new_v4();
        let t0 = Utc::now();
        let make = |seq: i64, parent: Option<Uuid>| Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender: alice,
            content: format!("m{seq}"),
            parent_id: parent,
            created_at: t0 + chrono::Duration::seconds(seq),
            sequence_number: seq,
            edited: false,
            last_edited_by: None,
            edited_at: None,
        };
        let a = make(1, None);
        let b = make(2, Some(a.id));
        let c = make(3, Some(b.id));

        let thread = build_thread(a.id, vec![c.clone(), b.clone(), a.clone()]).unwrap();
        assert_eq!(thread.ids(), vec![a.id, b.id, c.id]);
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].replies.len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_search_paginate_oldest_first() {
        let fx = Fixture::new();
        let alice = fx.user();
        let bob = fx.user();
        let c = fx.conversation(alice, &[bob]).await;

        let mut posted = Vec::new();
        for i in 0..4 {
            posted.push(post(&fx, &c, alice, &format!("note {i}"), None).id);
            fx.clock.advance_secs(1);
        }
        let lunch = post(&fx, &c, bob, "Lunch?", None);

        let page = MessageService::list_messages(&fx.state, c.id, bob, Pagination::new(2, 1)).unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), posted[1..3].to_vec());

        let all = MessageService::list_messages(&fx.state, c.id, bob, Pagination::default()).unwrap();
        assert_eq!(all.len(), 5);

        let filter = MessageFilter {
            text: Some("LUNCH".into()),
            ..Default::default()
        };
        let hits = MessageService::search_messages(&fx.state, c.id, alice, &filter, Pagination::default()).unwrap();
        assert_eq!(hits, vec![lunch]);

        let by_alice = MessageFilter {
            sender: Some(alice),
            ..Default::default()
        };
        let hits = MessageService::search_messages(&fx.state, c.id, alice, &by_alice, Pagination::default()).unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn test_outsider_cannot_list_or_search() {
        let fx = Fixture::new();
        let alice = fx.user();
        let outsider = fx.user();
        let c = fx.conversation(alice, &[]).await;

        let err = MessageService::list_messages(&fx.state, c.id, outsider, Pagination::default()).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
        let err = MessageService::search_messages(
            &fx.state,
            c.id,
            outsider,
            &MessageFilter::default(),
            Pagination::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(chrono::Duration::milliseconds(49_001)), 50);
        assert_eq!(retry_after_secs(chrono::Duration::seconds(50)), 50);
        assert_eq!(retry_after_secs(chrono::Duration::zero()), 1);
    }
}
