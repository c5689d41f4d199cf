use super::*;

#[tokio::test]
async fn test_one_failure_does_not_sink_the_batch() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(
    ScriptedChat::analyzing(&["B"]).with("A", Behavior::Fail(CallError::transient("HTTP 503"))),
  );
  let reporter = Arc::new(RecordingReporter::default());

  let report = harness
    .runner(chat.clone(), SEQUENTIAL)
    .with_reporter(reporter.clone())
    .run(items(&["A", "B"]), &analyze_key())
    .await?;

  assert_eq!(report.summary.failed, 1);
  assert_eq!(report.summary.succeeded, 1);
  assert_eq!(chat.calls("A"), 3);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].id, "A");
  assert_eq!(harness.ledger_ids().await, ["B"]);
  // The last attempt's error is the one reported.
  assert_eq!(report.failures[0].error, CallError::transient("HTTP 503"));

  let events = reporter.events.lock().unwrap();
  let failed: Vec<_> = events
    .iter()
    .filter_map(|e| match e {
      BatchEvent::Failed { id, .. } => Some(id.as_str()),
      _ => None,
    })
    .collect();
  assert_eq!(failed, ["A"]);
  assert!(events.iter().any(|e| matches!(e, BatchEvent::Succeeded { id } if id == "B")));
  Ok(())
}

#[tokio::test]
async fn test_transient_failures_recover() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::new().with("A", Behavior::FailThenReply(2, analysis_reply("A"))));

  let report = harness.runner(chat.clone(), ExecutionMode::Bounded(2)).run(items(&["A"]), &analyze_key()).await?;

  assert_eq!(report.summary.succeeded, 1);
  assert_eq!(chat.calls("A"), 3);
  Ok(())
}

#[tokio::test]
async fn test_empty_replies_exhaust_attempts() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::new().with("A", Behavior::Reply("   ".into())));

  let report = harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;

  assert_eq!(report.summary.failed, 1);
  assert_eq!(chat.calls("A"), 3);
  assert_eq!(report.failures[0].error, CallError::empty());
  Ok(())
}

#[tokio::test]
async fn test_malformed_reply_is_not_retried() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::new().with("A", Behavior::Reply("Sorry, I can't browse.".into())));

  let report = harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;

  assert_eq!(report.summary.failed, 1);
  assert_eq!(chat.calls("A"), 1);
  assert_eq!(report.failures[0].error.kind(), ErrorKind::Malformed);
  Ok(())
}

#[tokio::test]
async fn test_fatal_error_aborts_but_keeps_progress() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(
    ScriptedChat::analyzing(&["A", "C"]).with("B", Behavior::Fail(CallError::fatal("HTTP 401"))),
  );
  let reporter = Arc::new(RecordingReporter::default());

  let err = harness
    .runner(chat.clone(), SEQUENTIAL)
    .with_reporter(reporter.clone())
    .run(items(&["A", "B", "C"]), &analyze_key())
    .await
    .unwrap_err();

  assert!(matches!(err, DigesterError::Aborted(ref e) if e.is_fatal()));
  assert_eq!(chat.calls("B"), 1);
  assert_eq!(chat.calls("C"), 0);
  assert_eq!(harness.ledger_ids().await, ["A"]);

  let events = reporter.events.lock().unwrap();
  assert!(events.iter().any(|e| matches!(e, BatchEvent::Stopped { not_started: 1 })));
  let finished = events.iter().find_map(|e| match e {
    BatchEvent::Finished(summary) => Some(*summary),
    _ => None,
  });
  let finished = finished.ok_or("no Finished event")?;
  assert_eq!((finished.succeeded, finished.failed, finished.remaining()), (1, 1, 1));
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out() -> TestResult<()> {
  /// Never answers.
  struct Hung;

  #[async_trait]
  impl Chat for Hung {
    async fn chat(&self, _messages: &[Message]) -> Result<String, CallError> {
      std::future::pending().await
    }

    fn name(&self) -> String { "hung".to_string() }
  }

  let harness = Harness::new();
  let report = BatchRunner::new(Analyze::new(), Arc::new(Hung), harness.store.clone(), harness.ledger.clone())
    .with_retry(RetryPolicy::fixed(2, Duration::from_secs(1)).with_timeout(Duration::from_secs(90)))
    .with_mode(SEQUENTIAL)
    .run(items(&["A"]), &analyze_key())
    .await?;

  assert_eq!(report.summary.failed, 1);
  assert_eq!(report.failures[0].error.kind(), ErrorKind::Timeout);
  Ok(())
}
