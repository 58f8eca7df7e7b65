use crate::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Never empty; the creator is always a member
    pub participants: BTreeSet<Identity>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, identity: Identity) -> bool {
        self.participants.contains(&identity)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Everyone except `sender`; the recipients of a message they post
    pub fn others(&self, sender: Identity) -> impl Iterator<Item = Identity> + '_ {
        self.participants.iter().copied().filter(move |p| *p != sender)
    }
}

/// Result of an idempotent participant add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddParticipantOutcome {
    Added,
    AlreadyPresent,
}
