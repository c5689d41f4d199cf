//! Batch counters.
//!
//! Workers update a [`BatchStats`] behind a mutex; everyone else reads snapshots as
//! [`BatchSummary`] values. The counters satisfy `skipped + succeeded + failed <= total` at all
//! times, with equality once every item has been accounted for. Cache hits are counted as skipped
//! and additionally in `cache_hits`.

use std::sync::MutexGuard;

use super::*;

/// Mutable counters of a running batch.
#[derive(Debug, Clone)]
pub struct BatchStats {
  /// Unique items in the batch
  pub total:      usize,
  /// Items not computed, either already in the ledger or served from the cache
  pub skipped:    usize,
  /// The subset of `skipped` served from the cache
  pub cache_hits: usize,
  /// Items computed and recorded
  pub succeeded:  usize,
  /// Items that failed after exhausting their attempts
  pub failed:     usize,
  /// When the batch started
  started_at:     Instant,
}

impl BatchStats {
  /// Fresh counters for a batch of `total` items.
  pub fn new(total: usize) -> Self {
    Self { total, skipped: 0, cache_hits: 0, succeeded: 0, failed: 0, started_at: Instant::now() }
  }

  /// Items accounted for so far.
  pub fn done(&self) -> usize { self.skipped + self.succeeded + self.failed }

  /// Copies the counters together with timing information.
  pub fn summary(&self) -> BatchSummary {
    BatchSummary {
      total:           self.total,
      skipped:         self.skipped,
      cache_hits:      self.cache_hits,
      succeeded:       self.succeeded,
      failed:          self.failed,
      elapsed_seconds: self.started_at.elapsed().as_secs_f64(),
    }
  }
}

/// Counters shared between a batch's workers.
pub type SharedStats = Arc<Mutex<BatchStats>>;

/// Locks shared counters, recovering them if a holder panicked.
pub fn lock(stats: &SharedStats) -> MutexGuard<'_, BatchStats> {
  stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A point-in-time copy of a batch's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
  /// Unique items in the batch
  pub total:           usize,
  /// Items not computed
  pub skipped:         usize,
  /// The subset of `skipped` served from the cache
  pub cache_hits:      usize,
  /// Items computed and recorded
  pub succeeded:       usize,
  /// Items that failed
  pub failed:          usize,
  /// Seconds since the batch started
  pub elapsed_seconds: f64,
}

impl BatchSummary {
  /// Items accounted for.
  pub fn done(&self) -> usize { self.skipped + self.succeeded + self.failed }

  /// Items not yet accounted for.
  pub fn remaining(&self) -> usize { self.total.saturating_sub(self.done()) }

  /// Items that needed a model call.
  pub fn processed(&self) -> usize { self.succeeded + self.failed }

  /// Share of the batch accounted for, from 0 to 100.
  pub fn percent_complete(&self) -> f64 {
    if self.total == 0 {
      100.0
    } else {
      self.done() as f64 * 100.0 / self.total as f64
    }
  }

  /// Share of processed items that succeeded, from 0 to 100.
  pub fn success_rate(&self) -> f64 {
    match self.processed() {
      0 => 0.0,
      n => self.succeeded as f64 * 100.0 / n as f64,
    }
  }

  /// Estimated seconds until the batch finishes, from the average time per processed item.
  ///
  /// Skipped items cost next to nothing and are left out of the average.
  pub fn eta_seconds(&self) -> Option<f64> {
    match self.processed() {
      0 => None,
      n => Some(self.elapsed_seconds / n as f64 * self.remaining() as f64),
    }
  }
}

impl Display for BatchSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} total, {} succeeded, {} failed, {} skipped ({} from cache) in {:.1}s",
      self.total, self.succeeded, self.failed, self.skipped, self.cache_hits, self.elapsed_seconds
    )
  }
}
