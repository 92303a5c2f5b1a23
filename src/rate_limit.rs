//! Rate limiting for outgoing calls.
//!
//! - [`RateLimiter`]: the decision interface.
//! - [`TokenBucket`](strategies::TokenBucket): the in-process bucket shared by every endpoint of
//!   one remote instance.
//! - [`RateLimitLayer`]: tower middleware that asks the limiter before each call and fails fast
//!   with [`CallError::RateLimited`](crate::CallError::RateLimited) instead of queuing.

use std::time::Duration;

pub mod middleware;
pub mod strategies;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use strategies::TokenBucket;

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The call may proceed.
    Allowed {
        /// Whole permits left after this acquisition.
        remaining: u32,
    },
    /// The call must not proceed.
    Denied {
        /// How long until enough permits are available.
        wait: Duration,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Core interface for rate limiting logic.
///
/// Implementations must be safe to share between concurrent callers and must never block
/// waiting for permits: an exhausted limiter answers [`Decision::Denied`] right away.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Attempt to acquire the specified number of permits.
    async fn acquire(&self, permits: u32) -> Decision;
}
