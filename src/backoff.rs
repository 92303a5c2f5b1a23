//! Backoff strategies for retry loops.
//!
//! Attempt semantics: attempt index `0` is the initial call (no delay); the delay before retry
//! `n` is `delay(n)`. Exponential backoff computes `base × multiplier^(n-1)`, optionally capped,
//! and saturates at [`MAX_BACKOFF`] instead of overflowing.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use kfdeploy::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_secs(3))
//!     .with_multiplier(1.5)
//!     .unwrap()
//!     .with_max(Duration::from_secs(10))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_secs(3));
//! assert_eq!(backoff.delay(2), Duration::from_millis(4500));
//! assert_eq!(backoff.delay(4), Duration::from_secs(10)); // capped
//! ```

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    ConstantDoesNotSupportMultiplier,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
    InvalidMultiplier(f64),
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for exponential backoff")
            }
            BackoffError::ConstantDoesNotSupportMultiplier => {
                write!(f, "with_multiplier is only valid for exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
            BackoffError::InvalidMultiplier(m) => {
                write!(f, "multiplier must be finite and >= 1.0 (got {})", m)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Exponential { base: Duration, multiplier: f64, max: Option<Duration> },
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// Doubling delay starting at `base`.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, multiplier: 2.0, max: None } }
    }

    /// Growth factor applied per retry. Must be finite and at least 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        match &mut self.kind {
            BackoffKind::Exponential { multiplier: existing, .. } => {
                *existing = multiplier;
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMultiplier),
        }
    }

    /// Cap individual delays at `max`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before attempt `attempt` (0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            BackoffKind::Constant { delay } => *delay,
            BackoffKind::Exponential { base, multiplier, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let nanos = base.as_nanos() as f64 * multiplier.powi(exponent);
                let exp_delay = if !nanos.is_finite() || nanos >= MAX_BACKOFF.as_nanos() as f64 {
                    MAX_BACKOFF
                } else {
                    Duration::from_nanos(nanos as u64)
                };
                let capped = max.map(|m| exp_delay.min(m)).unwrap_or(exp_delay);
                capped.min(MAX_BACKOFF)
            }
        }
    }
}
