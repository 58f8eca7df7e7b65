pub mod conversation_service;
pub mod identity_cleanup;
pub mod message_service;
pub mod read_state_service;

pub use conversation_service::ConversationService;
pub use identity_cleanup::{
    CleanupOutcome, IdentityCleanupHandler, IdentityCleanupService, PurgeReport,
};
pub use message_service::MessageService;
pub use read_state_service::ReadStateService;
