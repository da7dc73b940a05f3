//! Named limiters for each protected operation class.
//!
//! The registry is a fixed table: one [`RateLimiter`] per [`LimiterKind`],
//! each with its own budget and its own store. The same identifier checked
//! against `login` and `search` draws on two unrelated budgets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::limiter::RateLimiter;
use super::rules::RateLimitConfig;
use crate::error::{Result, TurnstileError};

/// Operation classes guarded by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterKind {
    /// Generic API calls
    Api,
    /// Login attempts
    Login,
    /// Outgoing emails
    Email,
    /// Search queries
    Search,
    /// File uploads
    Upload,
}

impl LimiterKind {
    /// Every kind, in table order.
    pub const ALL: [LimiterKind; 5] = [
        LimiterKind::Api,
        LimiterKind::Login,
        LimiterKind::Email,
        LimiterKind::Search,
        LimiterKind::Upload,
    ];

    /// The name used for lookup and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKind::Api => "api",
            LimiterKind::Login => "login",
            LimiterKind::Email => "email",
            LimiterKind::Search => "search",
            LimiterKind::Upload => "upload",
        }
    }

    fn index(&self) -> usize {
        match self {
            LimiterKind::Api => 0,
            LimiterKind::Login => 1,
            LimiterKind::Email => 2,
            LimiterKind::Search => 3,
            LimiterKind::Upload => 4,
        }
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimiterKind {
    type Err = TurnstileError;

    fn from_str(name: &str) -> Result<Self> {
        LimiterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| TurnstileError::UnknownLimiter(name.to_string()))
    }
}

/// Budgets for every limiter in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitersConfig {
    #[serde(default = "default_api")]
    pub api: RateLimitConfig,
    #[serde(default = "default_login")]
    pub login: RateLimitConfig,
    #[serde(default = "default_email")]
    pub email: RateLimitConfig,
    #[serde(default = "default_search")]
    pub search: RateLimitConfig,
    #[serde(default = "default_upload")]
    pub upload: RateLimitConfig,
}

impl Default for LimitersConfig {
    fn default() -> Self {
        Self {
            api: default_api(),
            login: default_login(),
            email: default_email(),
            search: default_search(),
            upload: default_upload(),
        }
    }
}

fn default_api() -> RateLimitConfig {
    RateLimitConfig::per(100, Duration::from_secs(60))
        .with_message("Too many requests, please try again later.")
}

fn default_login() -> RateLimitConfig {
    RateLimitConfig::per(5, Duration::from_secs(15 * 60))
        .with_message("Too many login attempts, please try again later.")
}

fn default_email() -> RateLimitConfig {
    RateLimitConfig::per(10, Duration::from_secs(3600))
        .with_message("Too many emails sent, please try again later.")
}

fn default_search() -> RateLimitConfig {
    RateLimitConfig::per(50, Duration::from_secs(60))
        .with_message("Too many searches, please slow down.")
}

fn default_upload() -> RateLimitConfig {
    RateLimitConfig::per(20, Duration::from_secs(3600))
        .with_message("Upload limit reached, please try again later.")
}

impl LimitersConfig {
    /// The config for one kind.
    pub fn get(&self, kind: LimiterKind) -> &RateLimitConfig {
        match kind {
            LimiterKind::Api => &self.api,
            LimiterKind::Login => &self.login,
            LimiterKind::Email => &self.email,
            LimiterKind::Search => &self.search,
            LimiterKind::Upload => &self.upload,
        }
    }
}

/// A fixed set of independently configured limiters.
#[derive(Debug)]
pub struct LimiterRegistry {
    /// Limiters indexed by `LimiterKind::index`
    limiters: [RateLimiter; 5],
}

impl LimiterRegistry {
    /// Build every limiter from `config` using wall clock time.
    pub fn new(config: &LimitersConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build every limiter from `config`, sharing one clock.
    ///
    /// Fails on the first invalid budget, naming the offending limiter.
    pub fn with_clock(config: &LimitersConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let build = |kind: LimiterKind| -> Result<RateLimiter> {
            let limit = config.get(kind);
            let limiter = RateLimiter::with_clock(limit.clone(), clock.clone())
                .map_err(|e| match e {
                    TurnstileError::Config(reason) => {
                        TurnstileError::Config(format!("limiter '{}': {}", kind, reason))
                    }
                    other => other,
                })?
                .named(kind.as_str());
            debug!(
                limiter = %kind,
                window_ms = limit.window_ms,
                max_requests = limit.max_requests,
                "Limiter configured"
            );
            Ok(limiter)
        };

        let limiters = [
            build(LimiterKind::Api)?,
            build(LimiterKind::Login)?,
            build(LimiterKind::Email)?,
            build(LimiterKind::Search)?,
            build(LimiterKind::Upload)?,
        ];

        info!(limiters = limiters.len(), "Limiter registry initialized");

        Ok(Self { limiters })
    }

    /// Get the limiter for `kind`.
    pub fn get(&self, kind: LimiterKind) -> &RateLimiter {
        &self.limiters[kind.index()]
    }

    /// Look a limiter up by name (`"api"`, `"login"`, ...).
    pub fn get_by_name(&self, name: &str) -> Option<&RateLimiter> {
        name.parse::<LimiterKind>().ok().map(|kind| self.get(kind))
    }

    /// Iterate over every limiter with its kind.
    pub fn iter(&self) -> impl Iterator<Item = (LimiterKind, &RateLimiter)> + '_ {
        LimiterKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Run a cleanup sweep on every limiter.
    ///
    /// Returns the total number of entries removed.
    pub fn cleanup_all(&self) -> usize {
        self.limiters.iter().map(RateLimiter::cleanup).sum()
    }

    /// Total number of tracked identifiers across all limiters.
    pub fn entry_count(&self) -> usize {
        self.limiters.iter().map(RateLimiter::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn registry() -> (LimiterRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let registry = LimiterRegistry::with_clock(&LimitersConfig::default(), clock.clone())
            .unwrap();
        (registry, clock)
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in LimiterKind::ALL {
            assert_eq!(kind.as_str().parse::<LimiterKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = "download".parse::<LimiterKind>().unwrap_err();
        assert!(matches!(err, TurnstileError::UnknownLimiter(ref name) if name == "download"));
    }

    #[test]
    fn test_default_budgets() {
        let (registry, _clock) = registry();

        let expected = [
            (LimiterKind::Api, 60_000, 100),
            (LimiterKind::Login, 900_000, 5),
            (LimiterKind::Email, 3_600_000, 10),
            (LimiterKind::Search, 60_000, 50),
            (LimiterKind::Upload, 3_600_000, 20),
        ];

        for (kind, window_ms, max_requests) in expected {
            let config = registry.get(kind).config();
            assert_eq!(config.window_ms, window_ms, "{} window", kind);
            assert_eq!(config.max_requests, max_requests, "{} budget", kind);
            assert!(config.message.is_some());
            assert_eq!(registry.get(kind).name(), kind.as_str());
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let (registry, _clock) = registry();

        assert_eq!(registry.get_by_name("login").unwrap().config().max_requests, 5);
        assert!(registry.get_by_name("LOGIN").is_none());
        assert!(registry.get_by_name("").is_none());
    }

    #[test]
    fn test_limiters_are_isolated() {
        let (registry, _clock) = registry();
        let login = registry.get(LimiterKind::Login);

        for _ in 0..5 {
            assert!(login.check("user-7").allowed);
        }
        assert!(!login.check("user-7").allowed);

        let search = registry.get(LimiterKind::Search);
        assert!(search.check("user-7").allowed);
        assert_eq!(search.get_stats("user-7").unwrap().count, 1);
        assert_eq!(registry.get(LimiterKind::Api).get_stats("user-7"), None);
    }

    #[test]
    fn test_cleanup_all() {
        let (registry, clock) = registry();

        registry.get(LimiterKind::Api).check("a");
        registry.get(LimiterKind::Search).check("a");
        registry.get(LimiterKind::Upload).check("a");
        assert_eq!(registry.entry_count(), 3);

        // Api and search windows are one minute, upload is one hour.
        clock.set(60_001);
        assert_eq!(registry.cleanup_all(), 2);
        assert_eq!(registry.entry_count(), 1);
        assert!(registry.get(LimiterKind::Upload).get_stats("a").is_some());
    }

    #[test]
    fn test_invalid_budget_names_limiter() {
        let mut config = LimitersConfig::default();
        config.email.max_requests = 0;

        let err = LimiterRegistry::new(&config).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("email"), "unexpected error: {}", text);
        assert!(text.contains("max_requests"), "unexpected error: {}", text);
    }

    #[test]
    fn test_iter_covers_every_kind() {
        let (registry, _clock) = registry();
        let kinds: Vec<LimiterKind> = registry.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, LimiterKind::ALL.to_vec());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
login:
  window_ms: 1000
  max_requests: 2
"#;
        let config: LimitersConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.login.max_requests, 2);
        assert_eq!(config.login.message, None);
        assert_eq!(config.api, LimitersConfig::default().api);
    }
}
