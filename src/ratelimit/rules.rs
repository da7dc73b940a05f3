//! Rate limit rule configuration and validation.
//!
//! A [`RateLimitConfig`] describes one fixed-window budget: how long a window
//! lasts, how many checks it admits and what to tell a caller who is turned
//! away. Configs are usually built in code but also deserialize from YAML:
//!
//! ```yaml
//! window_ms: 900000
//! max_requests: 5
//! message: Too many login attempts, please try again later.
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// A fixed-window budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Length of one counting window in milliseconds
    pub window_ms: u64,
    /// Checks allowed per window
    pub max_requests: u64,
    /// Text returned with every denial
    #[serde(default)]
    pub message: Option<String>,
}

impl RateLimitConfig {
    /// Create a config allowing `max_requests` checks per `window_ms`.
    pub fn new(window_ms: u64, max_requests: u64) -> Self {
        Self {
            window_ms,
            max_requests,
            message: None,
        }
    }

    /// Create a config allowing `max_requests` checks per `window`.
    ///
    /// Windows longer than `u64::MAX` milliseconds saturate.
    pub fn per(max_requests: u64, window: Duration) -> Self {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Self::new(window_ms, max_requests)
    }

    /// Attach a denial message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject configs that would silently allow or deny everything.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TurnstileError::Config(
                "max_requests must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a single rule from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RateLimitConfig = serde_yaml::from_str(yaml).map_err(|e| {
            TurnstileError::Config(format!("Failed to parse rate limit config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        let yaml = r#"
window_ms: 900000
max_requests: 5
message: Too many login attempts
"#;
        let config = RateLimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.window_ms, 900_000);
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.message.as_deref(), Some("Too many login attempts"));
    }

    #[test]
    fn test_parse_rule_without_message() {
        let yaml = r#"
window_ms: 1000
max_requests: 2
"#;
        let config = RateLimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.message, None);
    }

    #[test]
    fn test_parse_rejects_zero_window() {
        let yaml = r#"
window_ms: 0
max_requests: 2
"#;
        let err = RateLimitConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = RateLimitConfig::from_yaml("window_ms: soon").unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_validate_zero_budget() {
        let err = RateLimitConfig::new(1000, 0).validate().unwrap_err();
        assert!(err.to_string().contains("max_requests"));
    }

    #[test]
    fn test_per_duration() {
        let config = RateLimitConfig::per(20, Duration::from_secs(3600))
            .with_message("Upload limit reached");

        assert_eq!(config.window_ms, 3_600_000);
        assert_eq!(config.window(), Duration::from_secs(3600));
        assert_eq!(config.max_requests, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_saturates_huge_window() {
        let config = RateLimitConfig::per(1, Duration::MAX);
        assert_eq!(config.window_ms, u64::MAX);
    }
}
