pub mod conversation;
pub mod message;

pub use conversation::{AddParticipantOutcome, Conversation};
pub use message::{
    Message, MessageFilter, MessageHistoryEntry, Pagination, ThreadNode, UnreadMessage,
};
