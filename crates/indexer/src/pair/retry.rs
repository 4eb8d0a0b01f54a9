// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that may go away when the failed call is issued again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// An external call did not complete within [RetryPolicy::call_timeout].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("call timed out after {0:?}")]
pub struct CallTimeout(pub Duration);

/// Retry and timeout behavior for calls to external services.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt before giving up.
    pub retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Maximum delay between retries, regardless of backoff.
    pub max_delay: Duration,
    /// Upper bound on the duration of a single call.
    pub call_timeout: Duration,
    /// Whether a timed out call is retried or fails immediately.
    pub retry_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(120),
            call_timeout: Duration::from_secs(30),
            retry_timeouts: true,
        }
    }
}

impl RetryPolicy {
    /// No retries and a generous timeout.
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        delay: Duration::ZERO,
        backoff_multiplier: 1.0,
        max_delay: Duration::ZERO,
        call_timeout: Duration::from_secs(300),
        retry_timeouts: false,
    };

    /// Calculate the delay for a specific retry attempt
    pub fn calculate_retry_delay(&self, retry_count: u32) -> Duration {
        let backoff = self.delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry_count.min(i32::MAX as u32) as i32);
        let backoff_ms = backoff.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(backoff_ms)
    }
}

/// Runs `call` under the policy's timeout, retrying transient failures with
/// exponential backoff. Returns the last error once retries are exhausted, or as soon
/// as `cancel` fires while waiting to retry.
pub async fn retry_call<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: impl Display,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + From<CallTimeout> + Display,
{
    let mut attempt = 0;
    loop {
        let (err, retryable) = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    tracing::info!("{} succeeded after {} retries", what, attempt);
                }
                return Ok(value);
            }
            Ok(Err(err)) => {
                let retryable = err.is_transient();
                (err, retryable)
            }
            Err(_) => (E::from(CallTimeout(policy.call_timeout)), policy.retry_timeouts),
        };

        if !retryable || attempt >= policy.retries || cancel.is_cancelled() {
            return Err(err);
        }

        let delay = policy.calculate_retry_delay(attempt);
        attempt += 1;
        tracing::warn!(
            "{} failed (attempt {}/{}): {}. Retrying in {:?}",
            what,
            attempt,
            policy.retries + 1,
            err,
            delay
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("{} not retried: cancelled", what);
                return Err(err);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
