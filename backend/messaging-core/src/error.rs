use crate::identity::Identity;
use crate::rate_limit::ActionClass;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Distinguishes between retryable and permanent errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retryable,
    Permanent,
}

/// Operation that produced an error; carried so callers can render a precise message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateConversation,
    AddParticipant,
    GetConversation,
    ListConversations,
    PostMessage,
    EditMessage,
    DeleteMessage,
    GetMessage,
    GetThread,
    ListMessages,
    SearchMessages,
    MessageHistory,
    MarkConversationRead,
    PurgeIdentity,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateConversation => "create_conversation",
            Operation::AddParticipant => "add_participant",
            Operation::GetConversation => "get_conversation",
            Operation::ListConversations => "list_conversations",
            Operation::PostMessage => "post_message",
            Operation::EditMessage => "edit_message",
            Operation::DeleteMessage => "delete_message",
            Operation::GetMessage => "get_message",
            Operation::GetThread => "get_thread",
            Operation::ListMessages => "list_messages",
            Operation::SearchMessages => "search_messages",
            Operation::MessageHistory => "message_history",
            Operation::MarkConversationRead => "mark_conversation_read",
            Operation::PurgeIdentity => "purge_identity",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Conversation,
    Message,
    Identity,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Conversation => f.write_str("conversation"),
            Entity::Message => f.write_str("message"),
            Entity::Identity => f.write_str("identity"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// Entity absent, or present but invisible to the caller
    #[error("{entity} {id} not found ({operation})")]
    NotFound {
        operation: Operation,
        entity: Entity,
        id: Uuid,
        actor: Option<Identity>,
    },

    #[error("{actor} is not allowed to {operation} on {entity} {id}")]
    Forbidden {
        operation: Operation,
        entity: Entity,
        id: Uuid,
        actor: Identity,
    },

    #[error("invalid argument ({operation}): {reason}")]
    InvalidArgument {
        operation: Operation,
        reason: String,
    },

    #[error("rate limit exceeded for {identity} on {action}, retry after {retry_after_secs}s")]
    RateLimited {
        identity: Identity,
        action: ActionClass,
        retry_after_secs: u64,
    },

    #[error("{dependency} unavailable ({operation}): {reason}")]
    Unavailable {
        operation: Operation,
        dependency: &'static str,
        reason: String,
    },

    #[error("internal invariant violated ({operation}): {detail}")]
    Internal { operation: Operation, detail: String },
}

impl MessagingError {
    pub(crate) fn not_found(
        operation: Operation,
        entity: Entity,
        id: Uuid,
        actor: impl Into<Option<Identity>>,
    ) -> Self {
        MessagingError::NotFound {
            operation,
            entity,
            id,
            actor: actor.into(),
        }
    }

    pub(crate) fn forbidden(operation: Operation, entity: Entity, id: Uuid, actor: Identity) -> Self {
        MessagingError::Forbidden {
            operation,
            entity,
            id,
            actor,
        }
    }

    pub(crate) fn invalid(operation: Operation, reason: impl Into<String>) -> Self {
        MessagingError::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::Retryable
        } else {
            ErrorKind::Permanent
        }
    }

    /// Only collaborator outages are worth retrying; the caller owns the backoff.
    /// RateLimited clears on its own after the window and is reported separately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MessagingError::Unavailable { .. })
    }

    /// Status code the service layer is expected to translate this error into
    pub fn status_code(&self) -> u16 {
        match self {
            MessagingError::InvalidArgument { .. } => 400,
            MessagingError::Forbidden { .. } => 403,
            MessagingError::NotFound { .. } => 404,
            MessagingError::RateLimited { .. } => 429,
            MessagingError::Unavailable { .. } => 503,
            MessagingError::Internal { .. } => 500,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            MessagingError::NotFound { operation, .. }
            | MessagingError::Forbidden { operation, .. }
            | MessagingError::InvalidArgument { operation, .. }
            | MessagingError::Unavailable { operation, .. }
            | MessagingError::Internal { operation, .. } => Some(*operation),
            MessagingError::RateLimited { .. } => None,
        }
    }
}
