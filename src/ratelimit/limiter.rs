//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::{RateLimitEntry, RateLimitStats};
use super::rules::RateLimitConfig;
use crate::error::{Result, TurnstileError};

/// Name used in logs for limiters built outside a registry.
const DEFAULT_NAME: &str = "custom";

/// Outcome of a single [`RateLimiter::check`].
///
/// A denial is an ordinary value and must always be inspected by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// When a denied identifier may try again (ms since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<u64>,
    /// Denial text from the limiter's config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reset_time: None,
            message: None,
        }
    }

    fn deny(reset_time: u64, message: Option<String>) -> Self {
        Self {
            allowed: false,
            reset_time: Some(reset_time),
            message,
        }
    }

    /// How long a denied caller should wait, measured from `now_ms`.
    ///
    /// Suitable for a `Retry-After` style response. Returns `None` for
    /// allowed decisions.
    pub fn retry_after(&self, now_ms: u64) -> Option<Duration> {
        self.reset_time
            .map(|reset| Duration::from_millis(reset.saturating_sub(now_ms)))
    }
}

/// A fixed-window counter with a trailing block, tracked per identifier.
///
/// Each identifier gets `max_requests` checks per window. The check that
/// would exceed the budget blocks the identifier until the window would
/// have ended anyway; after that a fresh window starts.
///
/// The limiter is thread-safe. Each check's read-modify-write happens under
/// the store's lock for that identifier, so concurrent checks never admit
/// more than the budget.
pub struct RateLimiter {
    /// Label used in log output
    name: String,
    /// The budget enforced for every identifier
    config: RateLimitConfig,
    /// Entries indexed by identifier
    store: DashMap<String, RateLimitEntry>,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create a rate limiter using wall clock time.
    ///
    /// Fails with [`TurnstileError::Config`] when the window or the budget is
    /// zero.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    /// Create a limiter with a zero budget.
    ///
    /// Every check for every identifier is denied from the first call on.
    /// Each denial blocks the identifier until the end of the window that
    /// check opened, so `reset_time` still advances window by window.
    pub fn closed(
        window_ms: u64,
        message: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than 0".to_string(),
            ));
        }
        let config = RateLimitConfig {
            window_ms,
            max_requests: 0,
            message,
        };
        Ok(Self::build(config, clock))
    }

    fn build(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            config,
            store: DashMap::new(),
            clock,
        }
    }

    /// Set the label used in log output.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The label used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The budget this limiter enforces.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a check for `identifier` and decide whether it may proceed.
    ///
    /// The identifier is used as-is; it is not validated or normalized.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now_ms();

        trace!(
            limiter = %self.name,
            identifier = identifier,
            now = now,
            "Checking rate limit"
        );

        // Fast path without allocating a key for identifiers we already track.
        if let Some(mut entry) = self.store.get_mut(identifier) {
            return self.advance(identifier, entry.value_mut(), now);
        }

        match self.store.entry(identifier.to_owned()) {
            Entry::Occupied(mut occupied) => self.advance(identifier, occupied.get_mut(), now),
            Entry::Vacant(vacant) => {
                debug!(
                    limiter = %self.name,
                    identifier = identifier,
                    window_ms = self.config.window_ms,
                    max_requests = self.config.max_requests,
                    "Creating new rate limit entry"
                );
                let mut entry = RateLimitEntry::open(now, self.config.window_ms);
                let decision = self.admit(identifier, &mut entry);
                vacant.insert(entry);
                decision
            }
        }
    }

    /// Apply one check to an existing entry.
    fn advance(
        &self,
        identifier: &str,
        entry: &mut RateLimitEntry,
        now: u64,
    ) -> RateLimitDecision {
        if entry.is_blocked(now) {
            let until = entry.blocked_until.unwrap_or(entry.window_reset_at);
            return RateLimitDecision::deny(until, self.config.message.clone());
        }

        if entry.window_elapsed(now) {
            debug!(
                limiter = %self.name,
                identifier = identifier,
                "Rate limit window rolled over"
            );
            *entry = RateLimitEntry::open(now, self.config.window_ms);
        }

        self.admit(identifier, entry)
    }

    /// Spend one unit of budget from the current window, or block.
    fn admit(&self, identifier: &str, entry: &mut RateLimitEntry) -> RateLimitDecision {
        if entry.count < self.config.max_requests {
            entry.count += 1;
            return RateLimitDecision::allow();
        }

        // The block never outlasts the window it was raised in.
        entry.blocked_until = Some(entry.window_reset_at);

        debug!(
            limiter = %self.name,
            identifier = identifier,
            blocked_until = entry.window_reset_at,
            "Rate limit exceeded"
        );

        RateLimitDecision::deny(entry.window_reset_at, self.config.message.clone())
    }

    /// Forget everything about `identifier`.
    pub fn reset(&self, identifier: &str) {
        if self.store.remove(identifier).is_some() {
            debug!(limiter = %self.name, identifier = identifier, "Rate limit entry reset");
        }
    }

    /// Get the current counter for `identifier`.
    ///
    /// Returns `None` if the identifier has no entry. Never mutates state.
    pub fn get_stats(&self, identifier: &str) -> Option<RateLimitStats> {
        self.store.get(identifier).map(|entry| entry.stats())
    }

    /// Drop every entry whose window and block period have both elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;

        self.store.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        trace!(
            limiter = %self.name,
            removed = removed,
            remaining = self.store.len(),
            "Rate limit cleanup finished"
        );

        removed
    }

    /// Get the number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no identifier is tracked.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}
