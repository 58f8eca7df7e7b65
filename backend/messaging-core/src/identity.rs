//! Identity reference and the directory collaborator that vouches for it.
//!
//! The core never looks inside an identity; it only compares, hashes and
//! orders them. Whether an identity exists is answered by the identity
//! service through [`IdentityDirectory`].

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque user identifier owned by the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Uuid);

impl Identity {
    /// Fresh random identity (tests and fixtures)
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for Identity {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("identity directory unreachable: {0}")]
    Unreachable(String),
}

/// Answers whether an identity exists.
///
/// Implementations usually wrap a remote call; the core bounds every call
/// with the configured identity timeout.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn identity_exists(&self, identity: Identity) -> Result<bool, DirectoryError>;
}

/// Directory backed by an in-process set of known identities
#[derive(Debug, Default)]
pub struct InMemoryIdentityDirectory {
    known: DashSet<Identity>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, identity: Identity) {
        self.known.insert(identity);
    }

    /// Register and return a fresh identity
    pub fn create(&self) -> Identity {
        let identity = Identity::new();
        self.register(identity);
        identity
    }

    pub fn remove(&self, identity: Identity) -> bool {
        self.known.remove(&identity).is_some()
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn identity_exists(&self, identity: Identity) -> Result<bool, DirectoryError> {
        Ok(self.known.contains(&identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_directory_tracks_registrations() {
        let directory = InMemoryIdentityDirectory::new();
        let alice = directory.create();
        let stranger = Identity::new();

        assert!(directory.identity_exists(alice).await.unwrap());
        assert!(!directory.identity_exists(stranger).await.unwrap());

        assert!(directory.remove(alice));
        assert!(!directory.identity_exists(alice).await.unwrap());
    }

    #[test]
    fn test_identity_serializes_as_bare_uuid() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&Identity::from_uuid(id)).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
