//! Polling until externally owned state settles.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// How a convergence loop polls.
///
/// Without `max_attempts` or `max_elapsed` the loop polls until the
/// condition holds; dropping the returned future is the only way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300),
            max_attempts: None,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }

    /// Poll `probe` until it returns `true`.
    pub async fn await_condition<F, Fut>(&self, what: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.await_value(what, || {
            let fut = probe();
            async move { Ok(fut.await?.then_some(())) }
        })
        .await
    }

    /// Poll `probe` until it yields a value.
    ///
    /// `Ok(None)` means "not yet" and is retried; an `Err` ends the loop.
    pub async fn await_value<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = next_attempt(attempts);
            if let Some(value) = probe().await? {
                if attempts > 1 {
                    tracing::debug!(what, attempts, "condition met");
                }
                return Ok(value);
            }

            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            let out_of_time = self
                .max_elapsed
                .is_some_and(|max| started.elapsed() + self.interval > max);
            if out_of_attempts || out_of_time {
                return Err(Error::Timeout {
                    what: what.to_string(),
                    attempts,
                });
            }

            tracing::debug!(what, attempts, "still waiting");
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Unbounded loops with a zero interval can run long enough to exhaust the
/// counter, so it sticks at `u32::MAX`.
fn next_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}
