//! Bounded retry for transient source failures.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{FailureSignature, Result};

/// Default pause between attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Retry configuration for a single source's fetches.
///
/// Only failures whose [`FailureSignature`] is in `retryable` are retried;
/// everything else propagates on the first attempt. Sources without known
/// transient failure modes use [`RetryPolicy::none`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Failure signatures worth retrying.
    pub retryable: HashSet<FailureSignature>,
    /// Pause between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Creates a policy allowing up to `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retryable: HashSet::new(),
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retryable: HashSet::new(),
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    /// Sets the retryable failure signatures.
    pub fn with_signatures(mut self, signatures: Vec<impl Into<FailureSignature>>) -> Self {
        self.retryable = signatures.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the pause between attempts.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Pause between attempts as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Returns true if a failure with this signature should be retried.
    pub fn is_retryable(&self, signature: &FailureSignature) -> bool {
        self.retryable.contains(signature)
    }

    /// Runs `op` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with(op, |_| {}).await
    }

    /// Runs `op` like [`run`](Self::run), reporting each retry as it starts.
    ///
    /// `on_retry` receives the number of retries performed so far (1 for the
    /// first retry) before the pause, so callers can show a live "retrying"
    /// state while the policy sleeps.
    pub async fn run_with<T, F, Fut, C>(&self, mut op: F, mut on_retry: C) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnMut(u32),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Attempt {} succeeded after {} retries", attempt, attempt - 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let transient = err
                        .signature()
                        .map(|sig| self.is_retryable(sig))
                        .unwrap_or(false);
                    if !transient || attempt >= max_attempts {
                        return Err(err);
                    }
                    warn!(
                        "Transient failure on attempt {}/{}, retrying in {}ms: {}",
                        attempt, max_attempts, self.delay_ms, err
                    );
                    on_retry(attempt);
                    tokio::time::sleep(self.delay()).await;
                    attempt += 1;
                }
            }
        }
    }
}
