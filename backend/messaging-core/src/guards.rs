//! Access guard: pure permission checks over conversations and messages.
//!
//! Every decision reads only the participant set of the conversation and
//! the sender of the message; nothing here touches the store. The
//! `require_*` helpers turn a denial into the error kind callers must see:
//! read paths hide existence (`NotFound`), write paths on visible entities
//! report `Forbidden`.

use crate::error::{Entity, MessagingError, MessagingResult, Operation};
use crate::identity::Identity;
use crate::models::{Conversation, Message};

/// What the caller wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Post,
    Modify,
    AddParticipant,
}

/// What the caller wants to do it to
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Conversation(&'a Conversation),
    /// A message together with the conversation that owns it
    Message(&'a Message, &'a Conversation),
}

pub fn can_view(identity: Identity, conversation: &Conversation) -> bool {
    conversation.is_participant(identity)
}

/// Participants may always post
pub fn can_post(identity: Identity, conversation: &Conversation) -> bool {
    can_view(identity, conversation)
}

pub fn can_modify(identity: Identity, message: &Message) -> bool {
    identity == message.sender
}

/// Any participant may add others; there is no admin tier
pub fn can_add_participant(identity: Identity, conversation: &Conversation) -> bool {
    conversation.is_participant(identity)
}

pub fn is_permitted(identity: Identity, action: Action, resource: Resource<'_>) -> bool {
    match (action, resource) {
        (Action::View, Resource::Conversation(conversation))
        | (Action::View, Resource::Message(_, conversation)) => can_view(identity, conversation),
        (Action::Post, Resource::Conversation(conversation))
        | (Action::Post, Resource::Message(_, conversation)) => can_post(identity, conversation),
        (Action::AddParticipant, Resource::Conversation(conversation))
        | (Action::AddParticipant, Resource::Message(_, conversation)) => {
            can_add_participant(identity, conversation)
        }
        (Action::Modify, Resource::Message(message, _)) => can_modify(identity, message),
        (Action::Modify, Resource::Conversation(_)) => false,
    }
}

/// Non-participants cannot tell a hidden conversation from a missing one
pub fn require_view(
    identity: Identity,
    conversation: &Conversation,
    operation: Operation,
) -> MessagingResult<()> {
    if can_view(identity, conversation) {
        Ok(())
    } else {
        Err(MessagingError::not_found(
            operation,
            Entity::Conversation,
            conversation.id,
            identity,
        ))
    }
}

pub fn require_post(
    identity: Identity,
    conversation: &Conversation,
    operation: Operation,
) -> MessagingResult<()> {
    if can_post(identity, conversation) {
        Ok(())
    } else {
        Err(MessagingError::forbidden(
            operation,
            Entity::Conversation,
            conversation.id,
            identity,
        ))
    }
}

pub fn require_modify(
    identity: Identity,
    message: &Message,
    operation: Operation,
) -> MessagingResult<()> {
    if can_modify(identity, message) {
        Ok(())
    } else {
        Err(MessagingError::forbidden(
            operation,
            Entity::Message,
            message.id,
            identity,
        ))
    }
}

pub fn require_add_participant(
    identity: Identity,
    conversation: &Conversation,
) -> MessagingResult<()> {
    if can_add_participant(identity, conversation) {
        Ok(())
    } else {
        Err(MessagingError::forbidden(
            Operation::AddParticipant,
            Entity::Conversation,
            conversation.id,
            identity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn conversation(members: &[Identity]) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participants: members.iter().copied().collect::<BTreeSet<_>>(),
            created_at: Utc::now(),
        }
    }

    fn message_in(conversation: &Conversation, sender: Identity) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender,
            content: "hello".into(),
            parent_id: None,
            created_at: Utc::now(),
            sequence_number: 1,
            edited: false,
            last_edited_by: None,
            edited_at: None,
        }
    }

    #[test]
    fn test_participants_can_view_post_and_add() {
        let alice = Identity::new();
        let bob = Identity::new();
        let c = conversation(&[alice, bob]);

        for action in [Action::View, Action::Post, Action::AddParticipant] {
            assert!(is_permitted(alice, action, Resource::Conversation(&c)));
            assert!(is_permitted(bob, action, Resource::Conversation(&c)));
        }
    }

    #[test]
    fn test_outsider_is_denied_everything() {
        let alice = Identity::new();
        let outsider = Identity::new();
        let c = conversation(&[alice]);
        let m = message_in(&c, alice);

        for action in [Action::View, Action::Post, Action::Modify, Action::AddParticipant] {
            assert!(!is_permitted(outsider, action, Resource::Conversation(&c)));
            assert!(!is_permitted(outsider, action, Resource::Message(&m, &c)));
        }
    }

    #[test]
    fn test_only_sender_may_modify_message() {
        let alice = Identity::new();
        let bob = Identity::new();
        let c = conversation(&[alice, bob]);
        let m = message_in(&c, alice);

        assert!(is_permitted(alice, Action::Modify, Resource::Message(&m, &c)));
        assert!(!is_permitted(bob, Action::Modify, Resource::Message(&m, &c)));
        assert!(is_permitted(bob, Action::View, Resource::Message(&m, &c)));
    }

    #[test]
    fn test_conversations_are_never_modifiable() {
        let alice = Identity::new();
        let c = conversation(&[alice]);
        assert!(!is_permitted(alice, Action::Modify, Resource::Conversation(&c)));
    }

    #[test]
    fn test_view_denial_maps_to_not_found() {
        let alice = Identity::new();
        let outsider = Identity::new();
        let c = conversation(&[alice]);

        let err = require_view(outsider, &c, Operation::ListMessages).unwrap_err();
        assert!(matches!(err, MessagingError::NotFound { .. }));

        let err = require_post(outsider, &c, Operation::PostMessage).unwrap_err();
        assert!(matches!(err, MessagingError::Forbidden { .. }));
    }
}
