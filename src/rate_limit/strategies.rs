use crate::rate_limit::{Decision, RateLimiter};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A Token Bucket rate limiter.
///
/// Starts full with `capacity` tokens and regains one token every `refill_interval`, never
/// exceeding `capacity`. The mutex guards only the refill/consume arithmetic.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    refill_interval: Duration,
    capacity: u32,
}

impl TokenBucket {
    /// Create a full bucket. A zero `refill_interval` is treated as one nanosecond.
    pub fn new(refill_interval: Duration, capacity: u32) -> Self {
        Self {
            state: Mutex::new(BucketState { tokens: capacity as f64, last_refill: Instant::now() }),
            refill_interval: refill_interval.max(Duration::from_nanos(1)),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Whole tokens currently available.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, Instant::now());
        state.tokens as u32
    }

    /// Non-async acquisition used by the [`RateLimiter`] impl.
    pub fn try_acquire(&self, permits: u32) -> Decision {
        let cost = permits as f64;
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);

        if state.tokens >= cost {
            state.tokens -= cost;
            return Decision::Allowed { remaining: state.tokens as u32 };
        }

        let missing = cost - state.tokens;
        let wait = self.refill_interval.mul_f64(missing);
        Decision::Denied { wait }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let earned = elapsed.as_secs_f64() / self.refill_interval.as_secs_f64();
        state.tokens = (state.tokens + earned).min(self.capacity as f64);
        state.last_refill = now;
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self, permits: u32) -> Decision {
        self.try_acquire(permits)
    }
}
