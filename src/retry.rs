//! Retry loop, backoff policy, and retry predicates.
//!
//! [`Retrier`] owns the attempt loop: it runs an async operation, asks a
//! [`RetryPredicate`] whether a failure is worth another attempt, waits out
//! the backoff computed by a [`RetryStrategy`], and honors a caller deadline
//! between attempts. The strategy and predicate are immutable once built, so
//! one `Retrier` can serve any number of concurrent calls.

use crate::rate_limit::RateLimitConfig;
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Defines how long to wait between attempts, and how many to make.
///
/// # Examples
///
/// ```
/// use trackline::RetryStrategy;
/// use std::time::Duration;
///
/// // Try exactly once, for non-idempotent writes.
/// let once = RetryStrategy::None;
///
/// // Exponential backoff: ~100ms, ~200ms, ~400ms... capped at 10s.
/// let backoff = RetryStrategy::ExponentialBackoff {
///     min_wait: Duration::from_millis(100),
///     max_wait: Duration::from_secs(10),
///     max_retries: 5,
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Execute the operation exactly once; never retry.
    #[default]
    None,

    /// Retry with exponentially increasing, jittered delays.
    ///
    /// The delay before retry `n` is `min_wait * 2^n` clamped to
    /// `max_wait`, then spread uniformly within ±25% of that value so
    /// concurrent callers do not retry in lockstep.
    ExponentialBackoff {
        /// Base delay before the first retry.
        min_wait: Duration,
        /// Upper clamp on the un-jittered delay.
        max_wait: Duration,
        /// Number of retries after the initial attempt. Zero means the
        /// operation runs once and exhaustion is reported on first failure.
        max_retries: usize,
    },
}

impl RetryStrategy {
    /// Returns the delay to wait after failed attempt `attempt` (1-indexed,
    /// so 1 is the initial try), or `None` when attempts are exhausted.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                min_wait,
                max_wait,
                max_retries,
            } => {
                if attempt > *max_retries {
                    return None;
                }

                // min_wait * 2^(attempt - 1), clamped before jittering.
                let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1) as u32);
                let base = min_wait
                    .saturating_mul(multiplier.try_into().unwrap_or(u32::MAX))
                    .min(*max_wait);

                // Uniform in [0.75 * base, 1.25 * base).
                let jitter = rand::thread_rng().gen_range(0.75..1.25);
                Some(base.mul_f64(jitter))
            }
        }
    }

    /// Returns the number of retries this strategy allows.
    pub fn max_retries(&self) -> usize {
        match self {
            RetryStrategy::None => 0,
            RetryStrategy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }
}

/// Decides whether a failed attempt should be retried.
///
/// Which failures are safe to retry depends on the call site: idempotent
/// reads tolerate much more than work-item mutations. The predicate is
/// injected rather than derived from the error alone.
///
/// # Examples
///
/// ```
/// use trackline::{Error, RetryPredicate};
///
/// struct RetryOnConflict;
///
/// impl RetryPredicate for RetryOnConflict {
///     fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
///         matches!(error, Error::Api { status, .. } if status.as_u16() == 409)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` when `error`, raised on 1-indexed `attempt`, should
    /// be retried.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retry everything [`Error::is_retryable`] allows: network failures,
/// timeouts, 5xx, and 429 responses. The default predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransient;

impl RetryPredicate for RetryOnTransient {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        error.is_retryable()
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnServerError;

impl RetryPredicate for RetryOnServerError {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::Api { status, .. } if status.is_server_error())
    }
}

/// Retry only on timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::Timeout)
    }
}

/// Combines predicates with OR logic: retries if any member votes yes.
pub struct AnyOf {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AnyOf {
    /// Creates an `AnyOf` over the given predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AnyOf {
    fn should_retry(&self, error: &Error, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(error, attempt))
    }
}

/// Runs operations with retries, backoff, and deadline handling.
///
/// Attempts within one [`run`](Retrier::run) call are strictly sequential;
/// the only suspension points are the operation itself and the inter-attempt
/// wait. The wait is preempted by the deadline, and no attempt starts after
/// the deadline has fired. An in-flight operation is never aborted here;
/// bounding the individual network call is the transport's job.
#[derive(Clone)]
pub struct Retrier {
    strategy: RetryStrategy,
    predicate: Arc<dyn RetryPredicate>,
    rate_limit: RateLimitConfig,
}

impl Retrier {
    /// Creates a retrier from a strategy and predicate.
    pub fn new(strategy: RetryStrategy, predicate: Arc<dyn RetryPredicate>) -> Self {
        Self {
            strategy,
            predicate,
            rate_limit: RateLimitConfig::disabled(),
        }
    }

    /// A retrier that executes the operation exactly once.
    ///
    /// For call sites that must not retry, such as non-idempotent writes.
    pub fn once() -> Self {
        Self::new(RetryStrategy::None, Arc::new(RetryOnTransient))
    }

    /// Enables server rate-limit hints: when a failure carries a
    /// `Retry-After` or reset header, that wait replaces the computed
    /// backoff (capped by the config's `max_wait`).
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Executes `op` until it succeeds, the predicate declines a failure,
    /// attempts run out, or `deadline` fires.
    ///
    /// `op` receives the 1-indexed attempt number. A deadline that has
    /// already passed fails with [`Error::Cancelled`] without invoking `op`;
    /// a deadline firing during an inter-attempt wait cuts the wait short
    /// and fails the same way. Exhaustion is reported as
    /// [`Error::RetriesExhausted`] wrapping the final failure, except under
    /// [`RetryStrategy::None`], which surfaces the failure unwrapped.
    pub async fn run<T, F, Fut>(&self, deadline: Option<Instant>, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::Cancelled);
                }
            }

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            tracing::warn!(error = %err, attempt, "attempt failed");

            if !self.predicate.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = match self.strategy.delay_for_attempt(attempt) {
                Some(backoff) if self.rate_limit.enabled => err
                    .rate_limit_delay(self.rate_limit.max_wait)
                    .unwrap_or(backoff),
                Some(backoff) => backoff,
                None => {
                    if matches!(self.strategy, RetryStrategy::None) {
                        return Err(err);
                    }
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last_error: Box::new(err),
                    });
                }
            };

            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt,
                "retrying after delay"
            );

            match deadline {
                Some(deadline) if Instant::now() + delay >= deadline => {
                    tokio::time::sleep_until(deadline).await;
                    return Err(Error::Cancelled);
                }
                _ => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient_error() -> Error {
        Error::Timeout
    }

    fn backoff(min_ms: u64, max_ms: u64, retries: usize) -> RetryStrategy {
        RetryStrategy::ExponentialBackoff {
            min_wait: Duration::from_millis(min_ms),
            max_wait: Duration::from_millis(max_ms),
            max_retries: retries,
        }
    }

    #[test]
    fn backoff_stays_within_jitter_band() {
        let strategy = backoff(100, 10_000, 6);

        for attempt in 1..=6 {
            let clamped = Duration::from_millis(100 * 2u64.pow(attempt as u32 - 1))
                .min(Duration::from_millis(10_000));
            for _ in 0..50 {
                let delay = strategy.delay_for_attempt(attempt).unwrap();
                assert!(
                    delay >= clamped.mul_f64(0.75) && delay <= clamped.mul_f64(1.25),
                    "attempt {attempt}: {delay:?} outside ±25% of {clamped:?}"
                );
            }
        }
    }

    #[test]
    fn backoff_clamps_to_max_wait() {
        let strategy = backoff(100, 400, 10);

        // 2^9 * 100ms would be 51.2s without the clamp.
        let delay = strategy.delay_for_attempt(10).unwrap();
        assert!(delay <= Duration::from_millis(500));
    }

    #[test]
    fn backoff_exhausts_after_max_retries() {
        let strategy = backoff(100, 1_000, 3);
        assert!(strategy.delay_for_attempt(3).is_some());
        assert!(strategy.delay_for_attempt(4).is_none());
        assert!(RetryStrategy::None.delay_for_attempt(1).is_none());
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let calls = AtomicUsize::new(0);
        let retrier = Retrier::new(backoff(10, 100, 5), Arc::new(RetryOnTransient));

        let result: Result<u32> = retrier
            .run(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_invokes_exactly_once() {
        let calls = AtomicUsize::new(0);
        let retrier = Retrier::new(backoff(10, 100, 0), Arc::new(RetryOnTransient));

        let result: Result<()> = retrier
            .run(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient_error()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(Error::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn once_surfaces_error_unwrapped() {
        let retrier = Retrier::once();

        let result: Result<()> = retrier.run(None, |_| async { Err(transient_error()) }).await;

        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn predicate_refusal_stops_immediately() {
        struct Never;
        impl RetryPredicate for Never {
            fn should_retry(&self, _: &Error, _: usize) -> bool {
                false
            }
        }

        let calls = AtomicUsize::new(0);
        let retrier = Retrier::new(backoff(10, 100, 5), Arc::new(Never));

        let result: Result<()> = retrier
            .run(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient_error()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let retrier = Retrier::new(backoff(10, 100, 2), Arc::new(RetryOnTransient));

        let result: Result<()> = retrier.run(None, |_| async { Err(transient_error()) }).await;

        match result {
            Err(Error::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, Error::Timeout));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_prevents_first_attempt() {
        let calls = AtomicUsize::new(0);
        let retrier = Retrier::new(backoff(10, 100, 5), Arc::new(RetryOnTransient));
        let deadline = Instant::now() - Duration::from_millis(1);

        let result: Result<()> = retrier
            .run(Some(deadline), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_wait_cancels_before_next_attempt() {
        let calls = AtomicUsize::new(0);
        // Backoff of ~1s (±25%), deadline at 100ms: the wait must be cut short.
        let retrier = Retrier::new(backoff(1_000, 1_000, 5), Arc::new(RetryOnTransient));
        let deadline = Instant::now() + Duration::from_millis(100);

        let result: Result<()> = retrier
            .run(Some(deadline), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient_error()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hint_replaces_backoff() {
        use crate::rate_limit::RateLimitInfo;

        let calls = AtomicUsize::new(0);
        let retrier = Retrier::new(backoff(10, 50, 1), Arc::new(RetryOnTransient))
            .with_rate_limit(RateLimitConfig::default());

        let started = Instant::now();
        let result: Result<()> = retrier
            .run(None, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(Error::Api {
                            status: http::StatusCode::TOO_MANY_REQUESTS,
                            message: "slow down".into(),
                            details: Vec::new(),
                            headers: Box::new(http::HeaderMap::new()),
                            rate_limit: Some(RateLimitInfo {
                                reset_at: None,
                                retry_after: Some(Duration::from_secs(7)),
                                remaining: Some(0),
                            }),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The 7s Retry-After was honored instead of the ~10ms backoff.
        assert!(started.elapsed() >= Duration::from_secs(7));
    }
}
