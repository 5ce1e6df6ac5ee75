//! Exponential backoff for rate-limited completion calls.
//!
//! Only HTTP 429 is retried. Every other upstream failure is definitive and
//! propagates on the first attempt. The retry loop is driven by [`Backoff`],
//! an explicit attempt counter, and sleeps through a [`Sleeper`] so tests can
//! observe the schedule without waiting on a real clock.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (must be at least 1).
    pub max_attempts: u32,
    /// Delay after the first rate-limited attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of attempts. Uses the defaults
    /// for everything else.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }

    /// Start a fresh backoff schedule.
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            attempts: 0,
        }
    }
}

/// Attempt counter for one logical request.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    attempts: u32,
}

impl Backoff<'_> {
    /// Record a rate-limited attempt and return the delay to sleep before
    /// the next one (or before giving up, once exhausted).
    pub fn rate_limited(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.attempts);
        self.attempts += 1;
        delay
    }

    /// Attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget is spent.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts.max(1)
    }
}

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Suspends the calling task between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> SleepFuture;
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(delay))
    }
}
