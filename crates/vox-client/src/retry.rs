//! Bounded retry with exponential backoff.
//!
//! Transcription uploads are the most failure-prone step of the pipeline, so
//! every network call runs under the same policy: a fixed maximum attempt
//! count with a delay that doubles after each failed attempt.

use std::future::Future;
use std::time::Duration;

use vox_core::error::{Result, VoxError};

/// Retry policy shared by all client network calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per subsequent attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted.
    ///
    /// The operation receives the 1-based attempt number. No delay is slept
    /// after the final failed attempt; the last error is returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        let delay = self.base_delay * 2u32.pow(attempt - 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| VoxError::Transcription("no attempts were made".to_string())))
    }
}

// =============================================================================
// Tests
// =============================================================================
