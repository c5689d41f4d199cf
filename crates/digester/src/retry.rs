//! Timeout and backoff wrapper around a single external call.
//!
//! [`call_with_retry`] runs an async call up to [`RetryPolicy::max_attempts`] times. Each attempt is
//! bounded by [`RetryPolicy::timeout`]; an attempt that times out, fails transiently or returns only
//! whitespace is retried after the policy's backoff delay. Malformed and fatal errors are returned at
//! once since repeating the same call cannot fix them.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use digester::{error::CallError, retry::{call_with_retry, RetryPolicy}};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
//! let answer = call_with_retry(&policy, |attempt| async move {
//!   if attempt < 2 { Err(CallError::transient("busy")) } else { Ok("done".to_string()) }
//! })
//! .await;
//! assert_eq!(answer.unwrap(), "done");
//! # }
//! ```

use super::*;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
  /// The same delay before every retry
  #[default]
  Fixed,
  /// The delay doubles after every failed attempt
  Exponential,
}

/// Attempt budget, per-attempt deadline and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub max_attempts:  u32,
  /// Delay before the first retry, in milliseconds
  pub base_delay_ms: u64,
  /// Upper bound on any single delay, in milliseconds
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_delay_ms:  Option<u64>,
  /// Growth of the delay
  pub backoff:       Backoff,
  /// Deadline for a single attempt, in seconds
  pub timeout_secs:  u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:  3,
      base_delay_ms: 2000,
      max_delay_ms:  None,
      backoff:       Backoff::Fixed,
      timeout_secs:  90,
    }
  }
}

impl RetryPolicy {
  /// A policy waiting `delay` between each of `max_attempts` attempts.
  pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
    Self { max_attempts, base_delay_ms: millis(delay), backoff: Backoff::Fixed, ..Self::default() }
  }

  /// A policy whose delay starts at `base_delay` and doubles after each failure.
  pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay_ms: millis(base_delay),
      backoff: Backoff::Exponential,
      ..Self::default()
    }
  }

  /// Sets the per-attempt deadline.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout_secs = timeout.as_secs().max(1);
    self
  }

  /// Caps every delay at `max_delay`.
  pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay_ms = Some(millis(max_delay));
    self
  }

  /// The per-attempt deadline.
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  /// The wait after the failed attempt numbered `attempt` (starting at 1).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let base = self.base_delay_ms;
    let delay = match self.backoff {
      Backoff::Fixed => base,
      Backoff::Exponential => {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        base.saturating_mul(factor)
      },
    };
    Duration::from_millis(self.max_delay_ms.map_or(delay, |cap| delay.min(cap)))
  }
}

/// Converts a duration to whole milliseconds, saturating.
fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }

/// Runs `call` under `policy`, returning the first non-empty response or the last error.
///
/// `call` receives the 1-based attempt number. At least one attempt is always made.
pub async fn call_with_retry<F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<String, CallError>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<String, CallError>>, {
  let attempts = policy.max_attempts.max(1);
  let mut attempt = 1;
  loop {
    let error = match tokio::time::timeout(policy.timeout(), call(attempt)).await {
      Ok(Ok(response)) if !response.trim().is_empty() => {
        if attempt > 1 {
          debug!("Call succeeded on attempt {attempt}/{attempts}");
        }
        return Ok(response);
      },
      Ok(Ok(_)) => CallError::empty(),
      Ok(Err(e)) => e,
      Err(_) => CallError::timeout(policy.timeout_secs),
    };

    if !error.is_retryable() {
      debug!("Not retrying {error}");
      return Err(error);
    }
    if attempt >= attempts {
      error!("Giving up after {attempts} attempts: {error}");
      return Err(error);
    }

    let delay = policy.delay_after(attempt);
    warn!("Attempt {attempt}/{attempts} failed ({error}), retrying in {:.1}s", delay.as_secs_f64());
    tokio::time::sleep(delay).await;
    attempt += 1;
  }
}
