//! Rate limiting logic and state management.

mod cleanup;
mod clock;
mod entry;
mod identifier;
mod limiter;
mod registry;
mod rules;

pub use cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitStats;
pub use identifier::{resolve_identifier, ANONYMOUS_IDENTIFIER};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use registry::{LimiterKind, LimiterRegistry, LimitersConfig};
pub use rules::RateLimitConfig;
