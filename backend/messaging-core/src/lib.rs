pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod guards;
pub mod identity;
pub mod logging;
pub mod models;
pub mod rate_limit;
pub mod services;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use error::{Entity, ErrorKind, MessagingError, MessagingResult, Operation};
pub use events::{BroadcastPublisher, CoreEvent, EventPublisher, NoopPublisher, RecordingPublisher};
pub use identity::{DirectoryError, Identity, IdentityDirectory, InMemoryIdentityDirectory};
pub use models::{
    AddParticipantOutcome, Conversation, Message, MessageFilter, MessageHistoryEntry, Pagination,
    ThreadNode, UnreadMessage,
};
pub use rate_limit::{ActionClass, RateDecision, RateLimitConfig, RateLimiter};
pub use services::{CleanupOutcome, IdentityCleanupHandler, PurgeReport};
pub use state::CoreState;

use services::{ConversationService, IdentityCleanupService, MessageService, ReadStateService};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Entry point for the service layer.
///
/// Cheap to clone; every clone shares the same state. The caller is
/// responsible for authenticating the identities it passes in.
#[derive(Clone)]
pub struct MessagingCore {
    state: Arc<CoreState>,
}

impl MessagingCore {
    pub fn new(
        config: CoreConfig,
        identities: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            state: Arc::new(CoreState::new(config, identities, clock, publisher)),
        }
    }

    /// Core over the system clock, configured from the environment, with a
    /// broadcast publisher sized by `event_channel_capacity`.
    pub fn from_env(
        identities: Arc<dyn IdentityDirectory>,
    ) -> Result<(Self, Arc<BroadcastPublisher>), ConfigError> {
        let config = CoreConfig::from_env()?;
        let publisher = Arc::new(BroadcastPublisher::new(config.event_channel_capacity));
        let core = Self::new(config, identities, Arc::new(SystemClock), publisher.clone());
        Ok((core, publisher))
    }

    pub fn state(&self) -> &Arc<CoreState> {
        &self.state
    }

    pub fn config(&self) -> &CoreConfig {
        &self.state.config
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub async fn create_conversation(
        &self,
        creator: Identity,
        initial_participants: impl IntoIterator<Item = Identity>,
    ) -> MessagingResult<Conversation> {
        ConversationService::create_conversation(&self.state, creator, initial_participants).await
    }

    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor: Identity,
        target: Identity,
    ) -> MessagingResult<AddParticipantOutcome> {
        ConversationService::add_participant(&self.state, conversation_id, actor, target).await
    }

    pub fn list_conversations_for(&self, identity: Identity) -> Vec<Conversation> {
        ConversationService::list_conversations_for(&self.state, identity)
    }

    pub fn get_conversation(
        &self,
        conversation_id: Uuid,
        actor: Identity,
    ) -> MessagingResult<Conversation> {
        ConversationService::get_conversation(&self.state, conversation_id, actor)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn post_message(
        &self,
        conversation_id: Uuid,
        sender: Identity,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> MessagingResult<Message> {
        MessageService::post_message(&self.state, conversation_id, sender, content, parent_id)
    }

    pub fn edit_message(
        &self,
        message_id: Uuid,
        actor: Identity,
        new_content: &str,
    ) -> MessagingResult<Message> {
        MessageService::edit_message(&self.state, message_id, actor, new_content)
    }

    pub fn delete_message(&self, message_id: Uuid, actor: Identity) -> MessagingResult<()> {
        MessageService::delete_message(&self.state, message_id, actor)
    }

    pub fn get_message(&self, message_id: Uuid, actor: Identity) -> MessagingResult<Message> {
        MessageService::get_message(&self.state, message_id, actor)
    }

    pub fn get_thread(&self, root_message_id: Uuid, actor: Identity) -> MessagingResult<ThreadNode> {
        MessageService::get_thread(&self.state, root_message_id, actor)
    }

    pub fn list_messages(
        &self,
        conversation_id: Uuid,
        actor: Identity,
        pagination: Pagination,
    ) -> MessagingResult<Vec<Message>> {
        MessageService::list_messages(&self.state, conversation_id, actor, pagination)
    }

    pub fn search_messages(
        &self,
        conversation_id: Uuid,
        actor: Identity,
        filter: &MessageFilter,
        pagination: Pagination,
    ) -> MessagingResult<Vec<Message>> {
        MessageService::search_messages(&self.state, conversation_id, actor, filter, pagination)
    }

    pub fn message_history(
        &self,
        message_id: Uuid,
        actor: Identity,
    ) -> MessagingResult<Vec<MessageHistoryEntry>> {
        MessageService::message_history(&self.state, message_id, actor)
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    pub fn mark_read(&self, message_id: Uuid, reader: Identity) -> bool {
        ReadStateService::mark_read(&self.state, message_id, reader)
    }

    pub fn read_state(&self, message_id: Uuid, reader: Identity) -> Option<bool> {
        ReadStateService::read_state(&self.state, message_id, reader)
    }

    pub fn unread_for(&self, reader: Identity) -> Vec<UnreadMessage> {
        ReadStateService::unread_for(&self.state, reader)
    }

    pub fn unread_count(&self, reader: Identity) -> usize {
        ReadStateService::unread_count(&self.state, reader)
    }

    pub fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader: Identity,
    ) -> MessagingResult<usize> {
        ReadStateService::mark_conversation_read(&self.state, conversation_id, reader)
    }

    // ------------------------------------------------------------------
    // Account cleanup
    // ------------------------------------------------------------------

    pub fn purge_identity(&self, identity: Identity) -> PurgeReport {
        IdentityCleanupService::purge_identity(&self.state, identity)
    }

    /// Handler for identity-service `UserDeleted` events, deduplicating by
    /// event id for `dedup_ttl`
    pub fn cleanup_handler(&self, dedup_ttl: Duration) -> IdentityCleanupHandler {
        IdentityCleanupHandler::new(Arc::clone(&self.state), dedup_ttl)
    }

    // ------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------

    /// Start sweeping idle rate-limit keys on the current tokio runtime.
    ///
    /// Returns None when the configured sweep interval is zero.
    pub fn spawn_rate_limit_sweeper(&self) -> Option<JoinHandle<()>> {
        let seconds = self.state.config.rate_limit.sweep_interval_seconds;
        if seconds == 0 {
            return None;
        }
        Some(Arc::clone(&self.state.rate_limiter).spawn_sweeper(
            Arc::clone(&self.state.clock),
            Duration::from_secs(seconds),
        ))
    }
}
