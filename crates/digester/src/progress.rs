//! Batch events and periodic progress rendering.
//!
//! The runner tells a [`Reporter`] about every state change of every item as a [`BatchEvent`]. On
//! top of that a [`Ticker`] can be spawned to hand the reporter a fresh [`BatchSummary`] at a fixed
//! period, independent of item completion, so long-running calls still show signs of life.
//!
//! Reporters only observe. Nothing they do, including panicking inside the ticker task, changes
//! which items are processed or what gets persisted.

use tokio::{sync::oneshot, task::JoinHandle};

use super::{stats::{lock, BatchSummary, SharedStats}, *};

/// Why an item was not computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// The ledger already held a record for the id
  Ledger,
  /// The result store held a valid record for the fingerprint
  Cache,
}

/// Something that happened during a batch.
#[derive(Debug, Clone)]
pub enum BatchEvent {
  /// The batch is about to process `pending` of its `total` items.
  Started {
    /// Ledger key, e.g. `analyze/2024-01-02`
    key:     String,
    /// Unique items in the batch
    total:   usize,
    /// Items not already in the ledger
    pending: usize,
  },
  /// An item needed no model call.
  Skipped {
    /// Item id
    id:     String,
    /// Where the record came from
    reason: SkipReason,
  },
  /// An item is being sent to the model.
  Processing {
    /// Item id
    id:       String,
    /// Title shown to the user
    title:    String,
    /// 1-based position among pending items
    position: usize,
    /// Number of pending items
    pending:  usize,
  },
  /// An item was computed and recorded.
  Succeeded {
    /// Item id
    id: String,
  },
  /// An item failed after its final attempt.
  Failed {
    /// Item id
    id:    String,
    /// The last error
    error: CallError,
  },
  /// A computed record could not be written to the ledger.
  PersistFailed {
    /// Item id
    id:     String,
    /// What went wrong
    reason: String,
  },
  /// The batch stopped before every item was started.
  Stopped {
    /// Items never started
    not_started: usize,
  },
  /// The batch is over.
  Finished(BatchSummary),
}

/// Receives batch events. Implementations must be cheap; they run on the batch's own task.
pub trait Reporter: Send + Sync {
  /// Called once per event, in the order the runner observed them.
  fn event(&self, event: &BatchEvent);

  /// Called by a [`Ticker`] at its period.
  fn tick(&self, _summary: &BatchSummary) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Reporter for Silent {
  fn event(&self, _event: &BatchEvent) {}
}

/// Writes events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
  fn event(&self, event: &BatchEvent) {
    match event {
      BatchEvent::Started { key, total, pending } =>
        info!("Starting {key}: {pending} of {total} items pending"),
      BatchEvent::Skipped { id, reason } => debug!("Skipped {id} ({reason:?})"),
      BatchEvent::Processing { id, position, pending, .. } =>
        debug!("Processing {id} ({position}/{pending})"),
      BatchEvent::Succeeded { id } => debug!("Recorded {id}"),
      BatchEvent::Failed { id, error } => warn!("Failed {id}: {error}"),
      BatchEvent::PersistFailed { id, reason } =>
        warn!("Result for {id} may be lost on restart: {reason}"),
      BatchEvent::Stopped { not_started } => warn!("Stopped with {not_started} items not started"),
      BatchEvent::Finished(summary) => info!("Finished: {summary}"),
    }
  }

  fn tick(&self, summary: &BatchSummary) { info!("{}", render(summary, 30)) }
}

/// Renders a one-line progress bar, e.g.
/// `[██████░░░░] 6/10 60.0% | ok 4 | failed 0 | skipped 2 | 00:12 elapsed | eta 00:08`.
pub fn render(summary: &BatchSummary, width: usize) -> String {
  let filled = if summary.total == 0 {
    width
  } else {
    (summary.done() * width / summary.total).min(width)
  };
  let eta = summary.eta_seconds().map_or_else(|| "--:--".to_string(), format_clock);
  format!(
    "[{}{}] {}/{} {:.1}% | ok {} | failed {} | skipped {} | {} elapsed | eta {}",
    "█".repeat(filled),
    "░".repeat(width - filled),
    summary.done(),
    summary.total,
    summary.percent_complete(),
    summary.succeeded,
    summary.failed,
    summary.skipped,
    format_clock(summary.elapsed_seconds),
    eta
  )
}

/// Formats seconds as `mm:ss`, or `h:mm:ss` past an hour.
pub fn format_clock(seconds: f64) -> String {
  let total = seconds.max(0.0).round() as u64;
  let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
  if h > 0 {
    format!("{h}:{m:02}:{s:02}")
  } else {
    format!("{m:02}:{s:02}")
  }
}

/// A background task feeding periodic summaries to a reporter.
pub struct Ticker {
  /// Tells the task to exit
  done:   oneshot::Sender<()>,
  /// The task itself
  handle: JoinHandle<()>,
}

impl Ticker {
  /// Starts ticking every `period` until [`Ticker::stop`] is called.
  pub fn spawn(stats: SharedStats, reporter: Arc<dyn Reporter>, period: Duration) -> Self {
    let (done, mut done_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      // The first tick completes immediately; skip it so nothing renders before work starts.
      interval.tick().await;
      loop {
        tokio::select! {
          _ = &mut done_rx => break,
          _ = interval.tick() => {
            let summary = lock(&stats).summary();
            reporter.tick(&summary);
          },
        }
      }
    });
    Self { done, handle }
  }

  /// Stops the task and waits for it to exit.
  pub async fn stop(self) {
    let _ = self.done.send(());
    if let Err(e) = self.handle.await {
      debug!("Progress ticker ended abnormally: {e}");
    }
  }
}
