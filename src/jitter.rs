//! Jitter strategies applied to backoff delays.
//!
//! - `None`: exact backoff delays. The default for the deployment client, so consecutive delays
//!   grow strictly until the cap.
//! - `Proportional(f)`: uniform in `[delay × (1 - f), delay × (1 + f)]`, the classic
//!   "randomization factor" used by exponential backoff clients.
//!
//! RNG: `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//! `apply_with_rng`. Millisecond conversions saturate to `u64::MAX`.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay
    #[default]
    None,
    /// Randomization factor in `(0, 1]` applied symmetrically around the delay
    Proportional(f64),
}

impl Jitter {
    /// Create a proportional jitter strategy. A factor of zero disables jitter.
    pub fn proportional(factor: f64) -> Result<Self, &'static str> {
        if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
            return Err("proportional jitter: factor must be within [0, 1]");
        }
        if factor == 0.0 {
            return Ok(Jitter::None);
        }
        Ok(Jitter::Proportional(factor))
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_internal(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        self.apply_internal(delay, rng)
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn apply_internal<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = Self::as_millis_saturated(delay);
        if millis == 0 {
            return delay;
        }
        match self {
            Jitter::None => delay,
            Jitter::Proportional(factor) => {
                let spread = (millis as f64 * factor) as u64;
                let lower = millis.saturating_sub(spread);
                let upper = millis.saturating_add(spread);
                Duration::from_millis(rng.random_range(lower..=upper))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_jitter_returns_exact_delay() {
        let delay = Duration::from_secs(1);
        assert_eq!(Jitter::None.apply(delay), delay);
        assert_eq!(Jitter::default(), Jitter::None);
    }

    #[test]
    fn proportional_jitter_stays_within_factor() {
        let jitter = Jitter::proportional(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let jittered = jitter.apply_with_rng(Duration::from_secs(4), &mut rng);
            assert!(jittered >= Duration::from_secs(2));
            assert!(jittered <= Duration::from_secs(6));
        }
    }

    #[test]
    fn proportional_constructor_validates_factor() {
        assert!(Jitter::proportional(1.5).is_err());
        assert!(Jitter::proportional(-0.1).is_err());
        assert!(Jitter::proportional(f64::NAN).is_err());
        assert_eq!(Jitter::proportional(0.0).unwrap(), Jitter::None);
    }

    #[test]
    fn jitter_handles_zero_delay() {
        assert_eq!(Jitter::None.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(Jitter::Proportional(0.5).apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn saturates_large_durations_without_panicking() {
        let huge = Duration::from_millis(u64::MAX);
        let mut rng = StdRng::seed_from_u64(999);
        let jittered = Jitter::Proportional(0.5).apply_with_rng(huge, &mut rng);
        assert!(jittered >= Duration::from_millis(u64::MAX / 2));
    }
}
