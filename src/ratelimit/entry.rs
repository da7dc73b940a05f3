//! Per-identifier rate limit state.

use serde::Serialize;

/// Counter state tracked for one identifier within one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimitEntry {
    /// Checks allowed so far in the current window
    pub count: u64,
    /// When the current window ends (ms since epoch)
    pub window_reset_at: u64,
    /// When set and in the future, every check is denied
    pub blocked_until: Option<u64>,
}

impl RateLimitEntry {
    /// Start a fresh window at `now_ms` with nothing counted yet.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            window_reset_at: now_ms.saturating_add(window_ms),
            blocked_until: None,
        }
    }

    /// Whether the entry is blocked at `now_ms`.
    pub fn is_blocked(&self, now_ms: u64) -> bool {
        matches!(self.blocked_until, Some(until) if now_ms < until)
    }

    /// Whether the counting window has rolled over at `now_ms`.
    pub fn window_elapsed(&self, now_ms: u64) -> bool {
        now_ms > self.window_reset_at
    }

    /// Whether both the window and any block period are over, so the entry
    /// carries no information and can be dropped.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.window_elapsed(now_ms) && !self.is_blocked(now_ms)
    }

    /// Snapshot used by `get_stats`.
    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            count: self.count,
            reset_time: self.window_reset_at,
        }
    }
}

/// Read-only view of an identifier's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    /// Checks allowed so far in the current window
    pub count: u64,
    /// When the current window ends (ms since epoch)
    pub reset_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_entry() {
        let entry = RateLimitEntry::open(1_000, 500);

        assert_eq!(entry.count, 0);
        assert_eq!(entry.window_reset_at, 1_500);
        assert_eq!(entry.blocked_until, None);
        assert!(!entry.is_blocked(1_000));
    }

    #[test]
    fn test_window_elapsed_is_strict() {
        let entry = RateLimitEntry::open(0, 1_000);

        assert!(!entry.window_elapsed(999));
        assert!(!entry.window_elapsed(1_000));
        assert!(entry.window_elapsed(1_001));
    }

    #[test]
    fn test_block_ends_at_blocked_until() {
        let mut entry = RateLimitEntry::open(0, 1_000);
        entry.blocked_until = Some(entry.window_reset_at);

        assert!(entry.is_blocked(999));
        assert!(!entry.is_blocked(1_000));
    }

    #[test]
    fn test_expiry_requires_window_and_block_over() {
        let mut entry = RateLimitEntry::open(0, 1_000);
        assert!(!entry.is_expired(500));
        assert!(entry.is_expired(1_001));

        entry.blocked_until = Some(2_000);
        assert!(!entry.is_expired(1_500));
        assert!(entry.is_expired(2_000));
    }

    #[test]
    fn test_open_saturates() {
        let entry = RateLimitEntry::open(u64::MAX - 1, 10);
        assert_eq!(entry.window_reset_at, u64::MAX);
    }
}
