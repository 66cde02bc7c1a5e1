//! Common utilities shared across exchange clients

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
