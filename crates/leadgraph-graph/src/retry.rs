//! Exponential backoff with jitter
//!
//! [`BackoffRetrier`] runs an async operation until it succeeds, the
//! [`RetryPolicy`] predicate rejects the error, or `max_attempts` total tries
//! have been made. The final error is returned unchanged.
//!
//! Before attempt `k >= 2` the retrier sleeps
//! `min(initial * factor^(k-2), max_delay)` plus a uniform jitter of up to a
//! quarter of that delay. Sleeping uses `tokio::time::sleep`, so only the
//! calling task is suspended.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use leadgraph_core::config::RetryConfig;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::GraphError;

/// Upper bound of the jitter, as a fraction of the base delay
pub const JITTER_FRACTION: f64 = 0.25;

/// Decides whether a failed attempt should be retried
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Observes a retry before the backoff sleep: `(error, next_attempt)`
pub type RetryObserver<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Errors that know whether another attempt could succeed
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for GraphError {
    fn is_retriable(&self) -> bool {
        self.transient
    }
}

/// Rejected policy parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("initial_delay must be greater than zero")]
    ZeroInitialDelay,
    #[error("max_delay ({max:?}) must be >= initial_delay ({initial:?})")]
    MaxBelowInitial { initial: Duration, max: Duration },
    #[error("backoff_factor must be a finite number >= 1, got {0}")]
    InvalidFactor(f64),
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// How many times to try, how long to wait, and which errors qualify.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    predicate: RetryPredicate<E>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_factor: self.backoff_factor,
            predicate: Arc::clone(&self.predicate),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E: Retriable + 'static> Default for RetryPolicy<E> {
    /// 3 attempts, 1s initial delay, 10s cap, factor 2, retrying whatever
    /// [`Retriable::is_retriable`] accepts.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
            predicate: Arc::new(|err: &E| err.is_retriable()),
            on_retry: None,
        }
    }
}

impl<E: Retriable + 'static> RetryPolicy<E> {
    /// Builds a validated policy using [`Retriable`] as the predicate.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Result<Self, RetryPolicyError> {
        if max_attempts == 0 {
            return Err(RetryPolicyError::NoAttempts);
        }
        if initial_delay.is_zero() {
            return Err(RetryPolicyError::ZeroInitialDelay);
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError::MaxBelowInitial {
                initial: initial_delay,
                max: max_delay,
            });
        }
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(RetryPolicyError::InvalidFactor(backoff_factor));
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_factor,
            ..Self::default()
        })
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, RetryPolicyError> {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_factor,
        )
    }
}

impl<E> RetryPolicy<E> {
    /// Replaces the retry predicate for this call site.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Sets an observer called before each backoff sleep.
    pub fn with_on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn should_retry(&self, err: &E) -> bool {
        (self.predicate)(err)
    }

    /// Delay before `attempt` without jitter. Zero for the first attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        base_delay(
            attempt,
            self.initial_delay,
            self.max_delay,
            self.backoff_factor,
        )
    }

    /// Delay before `attempt` including jitter drawn from `rng`.
    pub fn delay_with_jitter<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        delay_with_jitter(self.base_delay(attempt), rng)
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, &mut rand::thread_rng())
    }
}

/// `min(initial * factor^(attempt-2), max)` for `attempt >= 2`, zero before.
pub fn base_delay(attempt: u32, initial: Duration, max: Duration, factor: f64) -> Duration {
    if attempt < 2 {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
    let millis = initial.as_millis() as f64 * factor.powi(exponent);
    let capped = millis.min(max.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

/// Adds uniform jitter in `[0, JITTER_FRACTION * base]` to `base`.
pub fn delay_with_jitter<R: Rng>(base: Duration, rng: &mut R) -> Duration {
    if base.is_zero() {
        return base;
    }
    let jitter_ms = base.as_millis() as f64 * rng.gen_range(0.0..=JITTER_FRACTION);
    base + Duration::from_millis(jitter_ms as u64)
}

// ============================================================================
// BackoffRetrier
// ============================================================================

/// Stateless driver for [`RetryPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffRetrier;

impl BackoffRetrier {
    /// Runs `operation` under `policy`.
    ///
    /// The operation receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(policy: &RetryPolicy<E>, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Self::run(policy, None, operation).await
    }

    /// Like [`execute`](Self::execute), but stops waiting when `cancel` fires
    /// during a backoff sleep and returns the last error.
    pub async fn execute_with_cancel<T, E, F, Fut>(
        policy: &RetryPolicy<E>,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Self::run(policy, Some(cancel), operation).await
    }

    async fn run<T, E, F, Fut>(
        policy: &RetryPolicy<E>,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= policy.max_attempts || !policy.should_retry(&err) {
                return Err(err);
            }

            let next = attempt + 1;
            let delay = policy.next_delay(next);
            if let Some(observer) = &policy.on_retry {
                observer(&err, next);
            }
            debug!(
                attempt,
                next_attempt = next,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, backing off"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(attempt, "Retry cancelled during backoff");
                            return Err(err);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            attempt = next;
        }
    }
}
