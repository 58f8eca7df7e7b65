use chrono::{TimeZone, Utc};
use messaging_core::{
    logging::init_tracing, CoreConfig, Identity, InMemoryIdentityDirectory, ManualClock,
    MessagingCore, RecordingPublisher,
};
use std::sync::Arc;

/// Core wired to a manual clock, an in-memory directory and a recording publisher
#[allow(dead_code)]
pub struct Harness {
    pub core: MessagingCore,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryIdentityDirectory>,
    pub events: Arc<RecordingPublisher>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        init_tracing();

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let directory = Arc::new(InMemoryIdentityDirectory::new());
        let events = Arc::new(RecordingPublisher::new());
        let core = MessagingCore::new(config, directory.clone(), clock.clone(), events.clone());

        Self {
            core,
            clock,
            directory,
            events,
        }
    }

    pub fn user(&self) -> Identity {
        self.directory.create()
    }

    pub fn users<const N: usize>(&self) -> [Identity; N] {
        std::array::from_fn(|_| self.user())
    }
}
