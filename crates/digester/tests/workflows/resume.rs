use digester::runner::StopSignal;

use super::*;

#[traced_test]
#[tokio::test]
async fn test_resume_skips_recorded_items() -> TestResult<()> {
  let harness = Harness::new();

  // A first run that got through A before being killed.
  let first = Arc::new(ScriptedChat::analyzing(&["A"]));
  harness.runner(first, SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;
  harness.store.clear_all().await;

  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B", "C"]));
  let report =
    harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A", "B", "C"]), &analyze_key()).await?;

  assert_eq!(chat.calls("A"), 0);
  assert_eq!(chat.calls("B"), 1);
  assert_eq!(chat.calls("C"), 1);
  assert_eq!(report.summary.skipped, 1);
  assert_eq!(report.summary.cache_hits, 0);
  assert_eq!(report.summary.succeeded, 2);
  assert_eq!(harness.ledger_ids().await, ["A", "B", "C"]);
  Ok(())
}

#[tokio::test]
async fn test_rerun_after_completion_does_nothing() -> TestResult<()> {
  let harness = Harness::new();
  let ids = ["A", "B", "C"];
  harness.runner(Arc::new(ScriptedChat::analyzing(&ids)), ExecutionMode::Bounded(2)).run(items(&ids), &analyze_key()).await?;
  let before = std::fs::read_to_string(harness.ledger.path(&analyze_key()))?;

  let chat = Arc::new(ScriptedChat::analyzing(&ids));
  let report = harness.runner(chat.clone(), ExecutionMode::Bounded(2)).run(items(&ids), &analyze_key()).await?;

  assert_eq!(chat.total_calls(), 0);
  assert_eq!(report.summary.skipped, 3);
  assert_eq!(report.records.len(), 3);
  assert_eq!(std::fs::read_to_string(harness.ledger.path(&analyze_key()))?, before);
  Ok(())
}

#[tokio::test]
async fn test_stop_signal_leaves_valid_ledger() -> TestResult<()> {
  let harness = Harness::new();
  let stop = StopSignal::new();
  stop.stop();

  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B"]));
  for mode in [SEQUENTIAL, ExecutionMode::Bounded(2)] {
    let report = harness
      .runner(chat.clone(), mode)
      .with_stop_signal(stop.clone())
      .run(items(&["A", "B"]), &analyze_key())
      .await?;
    assert!(report.stopped);
    assert_eq!(report.summary.remaining(), 2);
  }
  assert_eq!(chat.total_calls(), 0);

  // The next unstopped run picks everything up.
  let report = harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A", "B"]), &analyze_key()).await?;
  assert_eq!(report.summary.succeeded, 2);
  Ok(())
}

#[tokio::test]
async fn test_stopping_mid_batch() -> TestResult<()> {
  /// Fires the stop signal as soon as the first item succeeds.
  struct StopAfterFirst(StopSignal);

  impl Reporter for StopAfterFirst {
    fn event(&self, event: &BatchEvent) {
      if matches!(event, BatchEvent::Succeeded { .. }) {
        self.0.stop();
      }
    }
  }

  let harness = Harness::new();
  let stop = StopSignal::new();
  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B", "C"]));
  let report = harness
    .runner(chat.clone(), SEQUENTIAL)
    .with_stop_signal(stop.clone())
    .with_reporter(Arc::new(StopAfterFirst(stop)))
    .run(items(&["A", "B", "C"]), &analyze_key())
    .await?;

  assert!(report.stopped);
  assert_eq!(report.summary.succeeded, 1);
  assert_eq!(report.summary.remaining(), 2);
  assert_eq!(harness.ledger_ids().await, ["A"]);
  Ok(())
}

#[tokio::test]
async fn test_duplicate_ids_are_processed_once() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::analyzing(&["A"]));
  let report = harness
    .runner(chat.clone(), ExecutionMode::Bounded(4))
    .run(items(&["A", "A", "A"]), &analyze_key())
    .await?;

  assert_eq!(report.summary.total, 1);
  assert_eq!(chat.calls("A"), 1);
  Ok(())
}

#[tokio::test]
async fn test_corrupt_ledger_refuses_to_start() -> TestResult<()> {
  let harness = Harness::new();
  let path = harness.ledger.path(&analyze_key());
  std::fs::create_dir_all(path.parent().unwrap())?;
  std::fs::write(&path, "{ this is not a list")?;

  let chat = Arc::new(ScriptedChat::analyzing(&["A"]));
  let err = harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A"]), &analyze_key()).await.unwrap_err();

  assert!(matches!(err, DigesterError::CorruptLedger { .. }));
  assert_eq!(chat.total_calls(), 0);
  assert_eq!(std::fs::read_to_string(&path)?, "{ this is not a list");
  Ok(())
}
