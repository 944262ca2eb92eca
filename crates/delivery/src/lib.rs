//! Per-recipient rate limiting applied before any channel call.

pub mod rate_limit;

pub use rate_limit::{RateLimitDecision, RecipientRateLimiter};
