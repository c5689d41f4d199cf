//! The batch state machine.
//!
//! A [`BatchRunner`] takes a list of work items and a [`LedgerKey`] and drives every item to exactly
//! one of three outcomes:
//!
//! - **skipped**: the ledger already holds a record for the id, or the result store holds a valid
//!   record for the fingerprint (which is then written to the ledger)
//! - **succeeded**: the model answered, the answer parsed, and the record was cached and upserted
//! - **failed**: every attempt failed, or the answer could not be parsed
//!
//! One item's failure never stops the others. Only a [`ErrorKind::Fatal`] call error (an
//! authentication failure, say) stops the batch; items already running are allowed to finish and
//! everything they persisted remains valid. The same applies to an external [`StopSignal`].
//!
//! Re-running a batch after a crash or interruption repeats no finished work: finished ids are read
//! back from the ledger before anything starts.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::{future, stream, StreamExt};

use super::{
  chat::Chat,
  ledger::{Ledger, LedgerKey},
  progress::{BatchEvent, LogReporter, Reporter, SkipReason, Ticker},
  retry::{call_with_retry, RetryPolicy},
  stage::Stage,
  stats::{lock, BatchStats, BatchSummary, SharedStats},
  store::ResultStore,
  *,
};

/// How pending items are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
  /// One item at a time, pausing between items that needed a model call
  Sequential {
    /// The pause
    delay: Duration,
  },
  /// Up to this many items in flight at once
  Bounded(usize),
}

impl Default for ExecutionMode {
  fn default() -> Self { Self::Sequential { delay: Duration::from_millis(1000) } }
}

/// A cloneable flag asking a batch to stop starting new items.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  /// A signal that has not fired.
  pub fn new() -> Self { Self::default() }

  /// Fires the signal.
  pub fn stop(&self) { self.0.store(true, Ordering::SeqCst) }

  /// Whether the signal has fired.
  pub fn is_stopped(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// An item that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
  /// Item id
  pub id:    String,
  /// The final error
  pub error: CallError,
}

/// What a finished batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport<R> {
  /// Every record in the ledger after the batch, including those from earlier runs
  pub records:  Vec<R>,
  /// Final counters
  pub summary:  BatchSummary,
  /// Items that failed in this run
  pub failures: Vec<FailedItem>,
  /// Whether the batch stopped before starting every item
  pub stopped:  bool,
}

/// The outcome of one pending item.
enum Outcome {
  /// Served from the result store
  CacheHit,
  /// Computed now
  Succeeded,
  /// Failed for good
  Failed(CallError),
}

/// Runs one [`Stage`] over batches of work items.
pub struct BatchRunner<S: Stage> {
  /// Prompting and parsing
  stage:    S,
  /// The model
  chat:     Arc<dyn Chat>,
  /// Cache of computed records
  store:    ResultStore,
  /// Durable output
  ledger:   Ledger,
  /// Retry behaviour of each model call
  retry:    RetryPolicy,
  /// Scheduling of pending items
  mode:     ExecutionMode,
  /// Whether to call the model at all
  use_ai:   bool,
  /// Event sink
  reporter: Arc<dyn Reporter>,
  /// Period of progress ticks, if any
  tick:     Option<Duration>,
  /// External stop request
  stop:     StopSignal,
}

impl<S: Stage> BatchRunner<S> {
  /// Creates a runner with default retry policy, sequential mode and log reporting.
  pub fn new(stage: S, chat: Arc<dyn Chat>, store: ResultStore, ledger: Ledger) -> Self {
    Self {
      stage,
      chat,
      store,
      ledger,
      retry: RetryPolicy::default(),
      mode: ExecutionMode::default(),
      use_ai: true,
      reporter: Arc::new(LogReporter),
      tick: None,
      stop: StopSignal::new(),
    }
  }

  /// Sets the retry policy of model calls.
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Sets the execution mode.
  pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
    self.mode = mode;
    self
  }

  /// When disabled, every pending item gets the stage's fallback record and nothing is cached.
  pub fn with_ai(mut self, use_ai: bool) -> Self {
    self.use_ai = use_ai;
    self
  }

  /// Sets where events go.
  pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = reporter;
    self
  }

  /// Enables periodic progress ticks.
  pub fn with_progress_interval(mut self, period: Duration) -> Self {
    self.tick = Some(period);
    self
  }

  /// Uses `stop` as the external stop request.
  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = stop;
    self
  }

  /// A handle that stops this runner's batches when fired.
  pub fn stop_signal(&self) -> StopSignal { self.stop.clone() }

  /// The stage being run.
  pub fn stage(&self) -> &S { &self.stage }

  /// Processes `items` into the ledger under `key`.
  ///
  /// Duplicate ids after the first are dropped with a warning.
  ///
  /// # Errors
  ///
  /// - [`DigesterError::CorruptLedger`] if the existing ledger cannot be read; nothing is processed
  /// - [`DigesterError::Aborted`] if a model call failed fatally; records persisted before the abort
  ///   are kept
  pub async fn run(
    &self,
    items: Vec<WorkItem>,
    key: &LedgerKey,
  ) -> Result<BatchReport<S::Output>> {
    let items = dedupe(items);
    let finished = self.ledger.ids::<S::Output>(key).await?;
    let (done, pending): (Vec<_>, Vec<_>) =
      items.into_iter().partition(|item| finished.contains(&item.id));

    let stats: SharedStats = Arc::new(Mutex::new(BatchStats::new(done.len() + pending.len())));
    self.reporter.event(&BatchEvent::Started {
      key:     key.to_string(),
      total:   done.len() + pending.len(),
      pending: pending.len(),
    });

    for item in &done {
      lock(&stats).skipped += 1;
      self.reporter.event(&BatchEvent::Skipped { id: item.id.clone(), reason: SkipReason::Ledger });
    }

    let ticker = self.tick.map(|period| Ticker::spawn(stats.clone(), self.reporter.clone(), period));
    let halt = StopSignal::new();
    let failures = Mutex::new(Vec::new());
    let fatal = Mutex::new(None);
    let pending_count = pending.len();

    let record_outcome = |item: &WorkItem, outcome: Outcome| {
      if let Outcome::Failed(error) = outcome {
        if error.is_fatal() {
          error!("Stopping {key}: {error}");
          halt.stop();
          fatal.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get_or_insert(error.clone());
        }
        failures
          .lock()
          .unwrap_or_else(std::sync::PoisonError::into_inner)
          .push(FailedItem { id: item.id.clone(), error });
      }
    };

    match self.mode {
      ExecutionMode::Sequential { delay } => {
        for (index, item) in pending.iter().enumerate() {
          if self.stop.is_stopped() || halt.is_stopped() {
            break;
          }
          let outcome = self.process(item, key, &stats, index + 1, pending_count).await;
          let called_model = !matches!(outcome, Outcome::CacheHit);
          record_outcome(item, outcome);
          let more = index + 1 < pending_count;
          if called_model && self.use_ai && more && !delay.is_zero() && !halt.is_stopped() {
            tokio::time::sleep(delay).await;
          }
        }
      },
      ExecutionMode::Bounded(workers) => {
        let stats = &stats;
        stream::iter(pending.iter().enumerate())
          .take_while(|_| future::ready(!self.stop.is_stopped() && !halt.is_stopped()))
          .map(|(index, item)| async move {
            let outcome = self.process(item, key, stats, index + 1, pending_count).await;
            (item, outcome)
          })
          .buffer_unordered(workers.max(1))
          .for_each(|(item, outcome)| {
            record_outcome(item, outcome);
            future::ready(())
          })
          .await;
      },
    }

    if let Some(ticker) = ticker {
      ticker.stop().await;
    }

    let summary = lock(&stats).summary();
    let not_started = summary.remaining();
    if not_started > 0 {
      self.reporter.event(&BatchEvent::Stopped { not_started });
    }
    self.reporter.event(&BatchEvent::Finished(summary));

    if let Some(error) = fatal.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner) {
      return Err(DigesterError::Aborted(error));
    }

    Ok(BatchReport {
      records: self.ledger.load(key).await?,
      summary,
      failures: failures.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner),
      stopped: not_started > 0,
    })
  }

  /// Drives one pending item to an outcome, updating counters and emitting events.
  async fn process(
    &self,
    item: &WorkItem,
    key: &LedgerKey,
    stats: &SharedStats,
    position: usize,
    pending: usize,
  ) -> Outcome {
    if self.use_ai {
      if let Some(record) = self.store.get::<S::Output>(item).await {
        self.persist(item, key, &record).await;
        {
          let mut stats = lock(stats);
          stats.skipped += 1;
          stats.cache_hits += 1;
        }
        self.reporter.event(&BatchEvent::Skipped { id: item.id.clone(), reason: SkipReason::Cache });
        return Outcome::CacheHit;
      }
    }

    self.reporter.event(&BatchEvent::Processing {
      id: item.id.clone(),
      title: item.display_title().to_string(),
      position,
      pending,
    });

    let record = if self.use_ai {
      match self.compute(item).await {
        Ok(record) => {
          if !self.store.put(item, &record).await {
            debug!("Result for {} was not cached", item.id);
          }
          record
        },
        Err(error) => {
          lock(stats).failed += 1;
          self.reporter.event(&BatchEvent::Failed { id: item.id.clone(), error: error.clone() });
          return Outcome::Failed(error);
        },
      }
    } else {
      self.stage.fallback(item)
    };

    self.persist(item, key, &record).await;
    lock(stats).succeeded += 1;
    self.reporter.event(&BatchEvent::Succeeded { id: item.id.clone() });
    Outcome::Succeeded
  }

  /// Calls the model under the retry policy and parses its answer.
  async fn compute(&self, item: &WorkItem) -> Result<S::Output, CallError> {
    let messages = self.stage.messages(item);
    let chat = &self.chat;
    let messages = messages.as_slice();
    let response = call_with_retry(&self.retry, move |attempt| {
      trace!("Calling {} for {} (attempt {attempt})", self.stage.name(), item.id);
      chat.chat(messages)
    })
    .await?;
    self.stage.parse(item, &response)
  }

  /// Upserts `record`, reporting rather than propagating a failure.
  async fn persist(&self, item: &WorkItem, key: &LedgerKey, record: &S::Output) {
    if let Err(e) = self.ledger.upsert(key, record).await {
      warn!("Could not record {} in {key}: {e}", item.id);
      self
        .reporter
        .event(&BatchEvent::PersistFailed { id: item.id.clone(), reason: e.to_string() });
    }
  }
}

/// Drops items whose id already appeared earlier in the list.
fn dedupe(items: Vec<WorkItem>) -> Vec<WorkItem> {
  let mut seen = HashSet::new();
  items
    .into_iter()
    .filter(|item| {
      let first = seen.insert(item.id.clone());
      if !first {
        warn!("Ignoring duplicate work item {}", item.id);
      }
      first
    })
    .collect()
}
