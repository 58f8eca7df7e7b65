use crate::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation.
///
/// `parent_id` may dangle once the parent has been deleted; callers treat
/// that as "thread root unavailable".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Identity,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Per-conversation ordinal, breaks created_at ties
    pub sequence_number: i64,
    pub edited: bool,
    pub last_edited_by: Option<Identity>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub(crate) fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence_number)
    }
}

/// Pre-edit snapshot written once per content-changing edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHistoryEntry {
    pub id: Uuid,
    pub message_id: Uuid,
    pub old_content: String,
    pub edited_by: Option<Identity>,
    pub edited_at: DateTime<Utc>,
}

/// Inbox projection: just enough to render an unread list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadMessage {
    pub id: Uuid,
    pub sender: Identity,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for UnreadMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// A message and its replies, siblings ordered oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub message: Message,
    pub replies: Vec<ThreadNode>,
}

impl ThreadNode {
    /// Number of messages in this subtree, including this one
    pub fn message_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }

    /// Message ids in depth-first pre-order
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            ids.push(node.message.id);
            stack.extend(node.replies.iter().rev());
        }
        ids
    }

    pub fn find(&self, id: Uuid) -> Option<&ThreadNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.message.id == id {
                return Some(node);
            }
            stack.extend(node.replies.iter());
        }
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// None uses the configured default page size
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }
}

/// Message search criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub sender: Option<Identity>,
    /// Inclusive lower bound
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub created_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the content
    pub text: Option<String>,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        if self.sender.is_some_and(|sender| sender != message.sender) {
            return false;
        }
        if self.created_after.is_some_and(|after| message.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| message.created_at > before) {
            return false;
        }
        match &self.text {
            Some(needle) if !needle.is_empty() => message
                .content
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}
