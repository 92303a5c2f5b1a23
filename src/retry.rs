//! Deadline-bounded retry loop.
//!
//! Semantics:
//! - There is no attempt limit; a loop is bounded by elapsed time only.
//! - The budget is computed once per [`RetryPolicy::execute`] call: the caller's remaining
//!   deadline when the context has one, otherwise the policy's default ceiling.
//! - `should_retry` decides whether a failure is transient. Permanent failures return
//!   immediately as [`RetryError::Permanent`].
//! - The delay before retry `n` is `backoff.delay(n)` with jitter applied, clamped to the budget
//!   left, so a loop never sleeps past its deadline.
//! - Sleeps and attempts race the context's cancellation token.
//!
//! Invariants:
//! - The operation is never invoked after the budget is spent; the final attempt may start
//!   exactly at the deadline, since the last sleep is clamped to end there.
//! - Every `execute` call starts a fresh schedule.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use kfdeploy::{Backoff, CallContext, InstantSleeper, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct Flaky;
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "flaky") }
//! }
//! impl std::error::Error for Flaky {}
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<Flaky>::builder()
//!     .backoff(Backoff::exponential(Duration::from_millis(10)))
//!     .max_elapsed(Duration::from_secs(1))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let mut calls = 0;
//! let result = policy
//!     .execute(&CallContext::new(), || {
//!         calls += 1;
//!         let n = calls;
//!         async move { if n == 3 { Ok(n) } else { Err(Flaky) } }
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), 3);
//! # });
//! ```

use crate::context::CallContext;
use crate::error::RetryError;
use crate::{Backoff, Jitter, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Ceiling on a retry loop's elapsed time when the caller supplies no deadline.
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(30 * 60);

/// Retry policy combining backoff, jitter, time budget, predicate and sleeper.
pub struct RetryPolicy<E> {
    backoff: Backoff,
    jitter: Jitter,
    max_elapsed: Duration,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            backoff: self.backoff.clone(),
            jitter: self.jitter.clone(),
            max_elapsed: self.max_elapsed,
            should_retry: self.should_retry.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("max_elapsed", &self.max_elapsed)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Ceiling used when the context has no deadline.
    pub fn default_max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Budget for a loop entered now under `ctx`. `None` once the deadline has passed.
    pub fn max_elapsed_for(&self, ctx: &CallContext) -> Option<Duration> {
        match ctx.remaining() {
            Some(remaining) if remaining.is_zero() => None,
            Some(remaining) => Some(remaining),
            None => Some(self.max_elapsed),
        }
    }

    /// Execute an async operation with retry semantics.
    pub async fn execute<T, Fut, Op>(
        &self,
        ctx: &CallContext,
        mut operation: Op,
    ) -> Result<T, RetryError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let start = Instant::now();
        if ctx.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: 0, last: None });
        }
        let Some(budget) = self.max_elapsed_for(ctx) else {
            return Err(RetryError::DeadlineExceeded {
                attempts: 0,
                elapsed: Duration::ZERO,
                budget: Duration::ZERO,
                last: None,
            });
        };

        let mut last: Option<E> = None;
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt - 1, last });
                }
                outcome = operation() => outcome,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, elapsed = ?start.elapsed(), "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !(self.should_retry)(&err) {
                return Err(RetryError::Permanent(err));
            }

            let elapsed = start.elapsed();
            if elapsed >= budget {
                tracing::warn!(attempt, ?elapsed, ?budget, error = %err, "retry budget exhausted");
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    elapsed,
                    budget,
                    last: Some(err),
                });
            }

            let delay = self.jitter.apply(self.backoff.delay(attempt)).min(budget - elapsed);
            tracing::warn!(attempt, ?delay, error = %err, "retryable failure; backing off");
            last = Some(err);

            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<E> {
    backoff: Backoff,
    jitter: Jitter,
    max_elapsed: Duration,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The default elapsed-time ceiling must be > 0.
    InvalidMaxElapsed(Duration),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxElapsed(d) => {
                write!(f, "max_elapsed must be > 0 (got {:?})", d)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Defaults: 3s initial interval, x1.5 growth capped at 60s, no jitter, 30 minute ceiling,
    /// every error retryable.
    pub fn new() -> Self {
        let backoff = Backoff::exponential(Duration::from_secs(3))
            .with_multiplier(1.5)
            .and_then(|b| b.with_max(Duration::from_secs(60)))
            .unwrap_or_else(|_| Backoff::exponential(Duration::from_secs(3)));
        Self {
            backoff,
            jitter: Jitter::None,
            max_elapsed: DEFAULT_MAX_ELAPSED,
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Ceiling used when the caller's context carries no deadline.
    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Predicate deciding whether an error is transient.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.max_elapsed.is_zero() {
            return Err(BuildError::InvalidMaxElapsed(self.max_elapsed));
        }
        Ok(RetryPolicy {
            backoff: self.backoff,
            jitter: self.jitter,
            max_elapsed: self.max_elapsed,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        })
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn policy(sleeper: impl Sleeper + 'static) -> RetryPolicy<TestError> {
        RetryPolicy::builder()
            .backoff(Backoff::exponential(Duration::from_millis(100)))
            .with_jitter(Jitter::None)
            .max_elapsed(Duration::from_secs(10))
            .should_retry(|e: &TestError| !e.0.contains("fatal"))
            .with_sleeper(sleeper)
            .build()
            .expect("builder")
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy(InstantSleeper)
            .execute(&CallContext::new(), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only execute once");
    }

    #[tokio::test]
    async fn test_success_after_retries_with_growing_delays() {
        let sleeper = TrackingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy(sleeper.clone())
            .execute(&CallContext::new(), || {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(TestError(format!("attempt {}", attempt)))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy(InstantSleeper)
            .execute(&CallContext::new(), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError("fatal error".into()))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Permanent(TestError(ref m))) if m == "fatal error"
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should not retry permanent error");
    }

    #[tokio::test(start_paused = true)]
    async fn default_ceiling_bounds_elapsed_time() {
        let sleeper = TrackingSleeper::advancing();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let start = Instant::now();

        let result = policy(sleeper.clone())
            .execute(&CallContext::new(), || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError("unavailable".into()))
                }
            })
            .await;

        let elapsed = start.elapsed();
        match result {
            Err(RetryError::DeadlineExceeded { attempts, budget, last, .. }) => {
                assert_eq!(budget, Duration::from_secs(10));
                assert_eq!(attempts, counter.load(Ordering::SeqCst));
                assert_eq!(last, Some(TestError("unavailable".into())));
            }
            other => panic!("expected deadline exceeded, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
        assert!(sleeper.calls().iter().all(|d| *d <= Duration::from_millis(6400)));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_overrides_ceiling() {
        let ctx = CallContext::with_timeout(Duration::from_secs(2));
        let p = policy(TokioSleeper);
        assert_eq!(p.max_elapsed_for(&ctx), Some(Duration::from_secs(2)));

        let start = Instant::now();
        let result = p
            .execute(&ctx, || async { Err::<(), _>(TestError("unavailable".into())) })
            .await;

        assert!(result.unwrap_err().is_deadline_exceeded());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn final_attempt_may_start_at_the_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(2));
        let p = RetryPolicy::builder()
            .backoff(Backoff::constant(Duration::from_secs(600)))
            .build()
            .expect("builder");
        let start = Instant::now();
        let attempts_at = std::sync::Mutex::new(Vec::new());

        let result = p
            .execute(&ctx, || {
                attempts_at.lock().unwrap().push(start.elapsed());
                async { Err::<(), _>(TestError("unavailable".into())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::DeadlineExceeded { attempts: 2, .. })));
        assert_eq!(*attempts_at.lock().unwrap(), vec![Duration::ZERO, Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_recomputed_per_loop() {
        let ctx = CallContext::with_timeout(Duration::from_secs(60));
        let p = policy(TokioSleeper);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(p.max_elapsed_for(&ctx), Some(Duration::from_secs(15)));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(p.max_elapsed_for(&ctx), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_never_invokes_operation() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        let counter = AtomicUsize::new(0);

        let result = policy(TokioSleeper)
            .execute(&ctx, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(()) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::DeadlineExceeded { attempts: 0, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff_sleep() {
        let ctx = CallContext::new();
        let p = RetryPolicy::builder()
            .backoff(Backoff::constant(Duration::from_secs(600)))
            .build()
            .expect("builder");

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = p
            .execute(&ctx, || async { Err::<(), _>(TestError("unavailable".into())) })
            .await;

        match result {
            Err(RetryError::Cancelled { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert!(last.is_some());
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn cancelled_context_never_invokes_operation() {
        let ctx = CallContext::new();
        ctx.cancel();
        let result =
            policy(InstantSleeper).execute(&ctx, || async { Ok::<_, TestError>(()) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0, last: None })));
    }

    #[test]
    fn builder_rejects_zero_ceiling() {
        let err = RetryPolicy::<TestError>::builder().max_elapsed(Duration::ZERO).build();
        assert!(matches!(err, Err(BuildError::InvalidMaxElapsed(_))));
    }

    #[test]
    fn default_builder_uses_thirty_minute_ceiling() {
        let p = RetryPolicy::<TestError>::builder().build().expect("builder");
        assert_eq!(p.default_max_elapsed(), DEFAULT_MAX_ELAPSED);
    }
}
