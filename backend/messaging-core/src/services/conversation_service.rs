use crate::error::{Entity, MessagingError, MessagingResult, Operation};
use crate::guards;
use crate::identity::Identity;
use crate::models::{AddParticipantOutcome, Conversation};
use crate::state::CoreState;
use event_schema::MessagingEvent;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

pub struct ConversationService;

impl ConversationService {
    /// Create a conversation with `initial_participants` plus the creator.
    ///
    /// Every participant, the creator included, must be known to the identity
    /// directory. Nothing is stored unless all of them are.
    pub async fn create_conversation(
        state: &CoreState,
        creator: Identity,
        initial_participants: impl IntoIterator<Item = Identity>,
    ) -> MessagingResult<Conversation> {
        let mut participants: BTreeSet<Identity> = initial_participants.into_iter().collect();
        participants.insert(creator);

        try_join_all(
            participants
                .iter()
                .map(|identity| state.ensure_identity_exists(*identity, Operation::CreateConversation)),
        )
        .await?;

        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants,
            created_at: state.clock.now(),
        };
        state.store.insert_conversation(conversation.clone());

        info!(
            conversation_id = %conversation.id,
            creator = %creator,
            participants = conversation.participant_count(),
            "Conversation created"
        );

        state.emit(MessagingEvent::ConversationCreated {
            conversation_id: conversation.id,
            created_by: creator.as_uuid(),
            participants: conversation
                .participants
                .iter()
                .map(Identity::as_uuid)
                .collect(),
            created_at: conversation.created_at,
        });

        Ok(conversation)
    }

    /// Add `target` to a conversation on behalf of `actor`.
    ///
    /// Adding someone who is already a participant succeeds with
    /// [`AddParticipantOutcome::AlreadyPresent`] and emits nothing.
    pub async fn add_participant(
        state: &CoreState,
        conversation_id: Uuid,
        actor: Identity,
        target: Identity,
    ) -> MessagingResult<AddParticipantOutcome> {
        let op = Operation::AddParticipant;
        let handle = state.store.conversation(conversation_id).ok_or_else(|| {
            MessagingError::not_found(op, Entity::Conversation, conversation_id, actor)
        })?;

        {
            let record = handle.read();
            guards::require_add_participant(actor, &record.conversation)?;
            if record.conversation.is_participant(target) {
                debug!(conversation_id = %conversation_id, target = %target, "Participant already present");
                return Ok(AddParticipantOutcome::AlreadyPresent);
            }
        }

        // No lock is held across the directory call
        state.ensure_identity_exists(target, op).await?;

        let added_at = state.clock.now();
        {
            let mut record = handle.write();
            guards::require_add_participant(actor, &record.conversation)?;
            if !record.conversation.participants.insert(target) {
                return Ok(AddParticipantOutcome::AlreadyPresent);
            }
            state.store.add_membership(target, conversation_id);
        }

        info!(
            conversation_id = %conversation_id,
            added_by = %actor,
            participant = %target,
            "Participant added"
        );

        state.emit(MessagingEvent::ParticipantAdded {
            conversation_id,
            added_by: actor.as_uuid(),
            participant_id: target.as_uuid(),
            added_at,
        });

        Ok(AddParticipantOutcome::Added)
    }

    /// Conversations `identity` participates in, newest first
    pub fn list_conversations_for(state: &CoreState, identity: Identity) -> Vec<Conversation> {
        let mut found: Vec<(u64, Conversation)> = state
            .store
            .conversations_of(identity)
            .into_iter()
            .filter_map(|id| state.store.conversation(id))
            .filter_map(|handle| {
                let record = handle.read();
                guards::can_view(identity, &record.conversation)
                    .then(|| (record.creation_seq, record.conversation.clone()))
            })
            .collect();

        found.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        found.into_iter().map(|(_, conversation)| conversation).collect()
    }

    pub fn get_conversation(
        state: &CoreState,
        conversation_id: Uuid,
        actor: Identity,
    ) -> MessagingResult<Conversation> {
        let op = Operation::GetConversation;
        let handle = state.store.conversation(conversation_id).ok_or_else(|| {
            MessagingError::not_found(op, Entity::Conversation, conversation_id, actor)
        })?;

        let record = handle.read();
        guards::require_view(actor, &record.conversation, op)?;
        Ok(record.conversation.clone())
    }
}
