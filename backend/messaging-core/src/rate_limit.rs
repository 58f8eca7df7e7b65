//! Sliding-window rate limiter keyed by (identity, action class).
//!
//! Each key keeps the timestamps of its admitted events inside the trailing
//! window. Denied attempts are not recorded, so a key never holds more than
//! `max_events` timestamps. Idle keys are dropped by [`RateLimiter::sweep_idle`].

use crate::clock::Clock;
use crate::identity::Identity;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Longest accepted sliding window
pub const MAX_WINDOW_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_events: u32,
    pub window_seconds: u64,
    /// How often idle keys are swept; 0 disables the background sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: 5,
            window_seconds: 60,
            sweep_interval_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    /// The window length, capped at [`MAX_WINDOW_SECONDS`]
    pub fn window(&self) -> Duration {
        i64::try_from(self.window_seconds.min(MAX_WINDOW_SECONDS))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::days(1))
    }
}

/// Class of write-heavy operation being throttled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    PostMessage,
}

impl ActionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionClass::PostMessage => "post_message",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

type WindowKey = (Identity, ActionClass);

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<WindowKey, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            max_events = config.max_events,
            window_seconds = config.window_seconds,
            "Initializing rate limiter"
        );
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny one event at `now`.
    ///
    /// Returns false without recording the attempt when the key already holds
    /// `max_events` timestamps inside the window.
    pub fn allow(&self, identity: Identity, action: ActionClass, now: DateTime<Utc>) -> bool {
        self.check(identity, action, now).is_allowed()
    }

    /// Same as [`allow`](Self::allow) but reports how long until a slot frees up.
    ///
    /// Eviction, counting and recording happen under the key's shard lock, so
    /// two concurrent callers can never both take the last slot.
    pub fn check(&self, identity: Identity, action: ActionClass, now: DateTime<Utc>) -> RateDecision {
        let window = self.config.window();
        let limit = self.config.max_events as usize;

        let mut entry = self.windows.entry((identity, action)).or_default();
        let hits = entry.value_mut();
        evict_before(hits, now - window);

        if hits.len() >= limit {
            let retry_after = hits
                .front()
                .map(|oldest| (*oldest + window) - now)
                .unwrap_or(window);
            debug!(
                identity = %identity,
                action = %action,
                in_window = hits.len(),
                "Rate limit reached"
            );
            return RateDecision::Limited { retry_after };
        }

        hits.push_back(now);
        RateDecision::Allowed
    }

    /// Time until the key could admit another event, None if it can now.
    /// Does not record anything.
    pub fn retry_after(
        &self,
        identity: Identity,
        action: ActionClass,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let window = self.config.window();
        let cutoff = now - window;
        let hits = self.windows.get(&(identity, action))?;
        let live: Vec<_> = hits.iter().filter(|ts| **ts >= cutoff).collect();
        if live.len() < self.config.max_events as usize {
            return None;
        }
        live.first().map(|oldest| (**oldest + window) - now)
    }

    /// Events currently counted against the key (after eviction at `now`)
    pub fn in_window(&self, identity: Identity, action: ActionClass, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.window();
        self.windows
            .get(&(identity, action))
            .map(|hits| hits.iter().filter(|ts| **ts >= cutoff).count())
            .unwrap_or(0)
    }

    /// Drop keys whose newest event has left the window.
    ///
    /// # Returns
    /// Number of keys removed
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.window();
        let before = self.windows.len();

        self.windows.retain(|_, hits| {
            evict_before(hits, cutoff);
            !hits.is_empty()
        });

        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            info!(
                removed = removed,
                remaining = self.windows.len(),
                "Swept idle rate limit keys"
            );
        }
        removed
    }

    /// Number of keys currently tracked (for monitoring)
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Periodically sweep idle keys on the current tokio runtime.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        every: std::time::Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.sweep_idle(clock.now());
            }
        })
    }
}

fn evict_before(hits: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while hits.front().is_some_and(|ts| *ts < cutoff) {
        hits.pop_front();
    }
}
