//! Retry decorator for the conversion pipeline
//!
//! [`RetryPolicy`] is a `tower` retry policy parameterised by a maximum number
//! of attempts and a [`Backoff`] schedule. It knows nothing about the service
//! it wraps: every error is retried until attempts run out.

use std::fmt;
use std::time::Duration;
use tower::retry::Policy;
use tracing::warn;

/// Delay to wait after the zero-based `attempt` has failed
pub trait Backoff: Clone + Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Clone + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `base * 2^attempt`: 1s, 2s, 4s, ... for a one second base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }
}

/// Retry every failure up to `max_attempts` total attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy<B = ExponentialBackoff> {
    max_attempts: u32,
    failed: u32,
    backoff: B,
}

impl<B: Backoff> RetryPolicy<B> {
    pub fn new(max_attempts: u32, backoff: B) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            failed: 0,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, ExponentialBackoff::default())
    }
}

impl<B, Req, Res, E> Policy<Req, Res, E> for RetryPolicy<B>
where
    B: Backoff,
    Req: Clone,
    E: fmt::Display,
{
    type Future = tokio::time::Sleep;

    fn retry(&mut self, _req: &mut Req, result: &mut Result<Res, E>) -> Option<Self::Future> {
        let error = result.as_ref().err()?;

        let attempt = self.failed;
        self.failed += 1;

        if self.failed >= self.max_attempts {
            return None;
        }

        let delay = self.backoff.delay(attempt);
        warn!(
            attempt = self.failed,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );

        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, req: &Req) -> Option<Req> {
        Some(req.clone())
    }
}
