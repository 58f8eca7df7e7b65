use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::{MessagingError, MessagingResult, Operation};
use crate::events::{CoreEvent, EventPublisher, EVENT_SOURCE};
use crate::identity::{Identity, IdentityDirectory};
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use event_schema::{EventEnvelope, MessagingEvent};
use std::sync::Arc;
use tokio::time::timeout;

pub(crate) const IDENTITY_DIRECTORY: &str = "identity-directory";

/// Everything an operation needs, shared by all callers
pub struct CoreState {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub rate_limiter: Arc<RateLimiter>,
    pub publisher: Arc<dyn EventPublisher>,
    pub config: CoreConfig,
}

impl CoreState {
    pub fn new(
        config: CoreConfig,
        identities: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store: Store::new(),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            clock,
            identities,
            publisher,
            config,
        }
    }

    /// Publish a change that has already been applied
    pub(crate) fn emit(&self, event: MessagingEvent) {
        let envelope: CoreEvent = EventEnvelope::at(EVENT_SOURCE, self.clock.now(), event);
        self.publisher.publish(envelope);
    }

    /// Ask the identity directory, bounded by the configured timeout.
    ///
    /// Unknown identities are `InvalidArgument`; a failing or slow directory
    /// is `Unavailable`.
    pub(crate) async fn ensure_identity_exists(
        &self,
        identity: Identity,
        operation: Operation,
    ) -> MessagingResult<()> {
        let limit = self.config.identity_timeout();
        match timeout(limit, self.identities.identity_exists(identity)).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(MessagingError::invalid(
                operation,
                format!("identity {identity} does not exist"),
            )),
            Ok(Err(e)) => {
                tracing::warn!(identity = %identity, error = %e, "identity directory call failed");
                Err(MessagingError::Unavailable {
                    operation,
                    dependency: IDENTITY_DIRECTORY,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    identity = %identity,
                    timeout_ms = limit.as_millis() as u64,
                    "identity directory call timed out"
                );
                Err(MessagingError::Unavailable {
                    operation,
                    dependency: IDENTITY_DIRECTORY,
                    reason: format!("timed out after {limit:?}"),
                })
            }
        }
    }
}
