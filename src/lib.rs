//! Turnstile - In-process admission control
//!
//! This crate tracks a fixed-window request budget per identifier and uses it
//! to protect sensitive operations such as logins, email sends, searches and
//! uploads. A [`LimiterRegistry`](ratelimit::LimiterRegistry) holds one
//! independently configured limiter per operation class, and a
//! [`CleanupScheduler`](ratelimit::CleanupScheduler) keeps their stores
//! bounded.

pub mod config;
pub mod error;
pub mod ratelimit;
