//! Exponential backoff around a single fallible async operation.

use backon::{ExponentialBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to retry and how long to wait between attempts.
///
/// Every failure is treated as transient; there is no notion of a fatal
/// error that skips the remaining attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Attempts beyond the first
  pub retries: u32,
  /// Delay before the first retry; doubles on each subsequent retry
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retries: 3,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  pub fn new(retries: u32, base_delay: Duration) -> Self {
    Self {
      retries,
      base_delay,
    }
  }

  /// Total attempts this policy allows.
  pub fn max_attempts(&self) -> u32 {
    self.retries.saturating_add(1)
  }

  /// `base_delay`, then doubling, with no jitter and no cap.
  fn backoff(&self) -> ExponentialBuilder {
    ExponentialBuilder::default()
      .with_min_delay(self.base_delay)
      .with_factor(2.0)
      .without_max_delay()
      .with_max_times(self.retries as usize)
  }

  /// Run `operation` until it succeeds or attempts run out.
  ///
  /// The last error is returned unchanged.
  pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
  where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let max_attempts = self.max_attempts();
    let mut attempt = 0u32;
    operation
      .retry(self.backoff())
      .notify(|err: &E, delay: Duration| {
        attempt += 1;
        warn!(
          "Attempt {}/{} failed, retrying in {:?}: {}",
          attempt, max_attempts, delay, err
        );
      })
      .await
  }
}
