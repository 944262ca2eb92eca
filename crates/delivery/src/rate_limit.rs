//! Per-recipient sliding-window rate limiter backed by DashMap.
//!
//! Each recipient keeps a log of accepted send timestamps. A send is accepted
//! while fewer than `limit` timestamps fall inside the trailing window; the
//! retry-after of a rejection is the time until the oldest one ages out.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use notify_core::config::{RateLimitPolicy, MAX_RATE_LIMIT_WINDOW_SECS};
use std::collections::VecDeque;
use tracing::debug;

/// Outcome of consuming one unit for a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Accepted { remaining: u32 },
    Rejected { retry_after: std::time::Duration },
}

impl RateLimitDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Whole seconds to wait before the next unit becomes available, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Accepted { .. } => 0,
            Self::Rejected { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
        }
    }
}

/// Independent limiter for one channel, keyed by recipient address.
pub struct RecipientRateLimiter {
    channel: &'static str,
    policy: RateLimitPolicy,
    history: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl RecipientRateLimiter {
    pub fn new(channel: &'static str, policy: RateLimitPolicy) -> Self {
        Self {
            channel,
            policy,
            history: DashMap::new(),
        }
    }

    /// Consume one unit for `recipient` now. Never blocks.
    pub fn consume(&self, recipient: &str) -> RateLimitDecision {
        self.consume_at(recipient, Utc::now())
    }

    pub fn consume_at(&self, recipient: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window = self.window();
        let mut log = self.history.entry(recipient.to_string()).or_default();

        while log.front().is_some_and(|ts| *ts <= now - window) {
            log.pop_front();
        }

        let used = log.len() as u32;
        if used < self.policy.limit {
            log.push_back(now);
            return RateLimitDecision::Accepted {
                remaining: self.policy.limit - used - 1,
            };
        }

        let reopens_at = log.front().map(|oldest| *oldest + window).unwrap_or(now + window);
        let retry_after = (reopens_at - now).to_std().unwrap_or_default();

        debug!(
            channel = self.channel,
            recipient = %recipient,
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit rejected send"
        );
        metrics::counter!("rate_limit.rejected", "channel" => self.channel).increment(1);

        RateLimitDecision::Rejected { retry_after }
    }

    /// Drop recipients with no send inside the window. Call periodically.
    pub fn evict_idle(&self) -> usize {
        let cutoff = Utc::now() - self.window();
        let before = self.history.len();
        self.history
            .retain(|_, log| log.back().is_some_and(|last| *last > cutoff));
        before - self.history.len()
    }

    pub fn tracked_recipients(&self) -> usize {
        self.history.len()
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.policy.window_secs.min(MAX_RATE_LIMIT_WINDOW_SECS) as i64)
    }
}
