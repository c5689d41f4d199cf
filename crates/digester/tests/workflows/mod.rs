use super::*;

mod caching;
mod failures;
mod resume;
mod stages;

#[traced_test]
#[tokio::test]
async fn test_two_item_batch() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B"]));

  let report = harness.runner(chat.clone(), SEQUENTIAL).run(items(&["A", "B"]), &analyze_key()).await?;

  assert_eq!(report.summary.total, 2);
  assert_eq!(report.summary.succeeded, 2);
  assert_eq!(report.summary.failed, 0);
  assert_eq!(report.records.len(), 2);
  assert_eq!(harness.ledger_ids().await, ["A", "B"]);
  assert_eq!(harness.store.stats().await.valid, 2);
  assert_eq!(chat.total_calls(), 2);
  assert!(!report.stopped);

  let a = report.records.iter().find(|r| r.paper_id == "A").unwrap();
  assert_eq!(a.authors, "Team A");
  assert_eq!(a.model_function, "model A does things");
  Ok(())
}

#[tokio::test]
async fn test_results_land_in_ledger() -> TestResult<()> {
  for mode in [SEQUENTIAL, ExecutionMode::Bounded(5)] {
    let harness = Harness::new();
    let chat = Arc::new(ScriptedChat::echoing(&["A", "B"]));

    let report = harness.echo_runner(chat.clone(), mode).run(items(&["A", "B"]), &echo_key()).await?;

    let s = report.summary;
    assert_eq!((s.total, s.skipped, s.succeeded, s.failed), (2, 0, 2, 0));
    assert_eq!(chat.total_calls(), 2);
    let mut records = harness.ledger.load::<Echoed>(&echo_key()).await?;
    records.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(records, [Echoed::new("A", "result-for-A"), Echoed::new("B", "result-for-B")]);
  }
  Ok(())
}

#[tokio::test]
async fn test_cached_result_is_reused() -> TestResult<()> {
  for mode in [SEQUENTIAL, ExecutionMode::Bounded(5)] {
    let harness = Harness::new();
    assert!(harness.store.put(&item("A"), &Echoed::new("A", "result-for-A")).await);
    let chat = Arc::new(ScriptedChat::echoing(&["A", "B"]));

    let report = harness.echo_runner(chat.clone(), mode).run(items(&["A", "B"]), &echo_key()).await?;

    let s = report.summary;
    assert_eq!((s.skipped, s.cache_hits, s.succeeded, s.failed), (1, 1, 1, 0));
    assert_eq!(chat.calls("A"), 0);
    assert_eq!(chat.calls("B"), 1);
    let mut records = report.records;
    records.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(records, [Echoed::new("A", "result-for-A"), Echoed::new("B", "result-for-B")]);
  }
  Ok(())
}

#[tokio::test]
async fn test_modes_agree() -> TestResult<()> {
  let ids: Vec<String> = (0..12).map(|i| format!("2401.{i:05}")).collect();
  let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

  let mut outcomes = Vec::new();
  for mode in [SEQUENTIAL, ExecutionMode::Bounded(1), ExecutionMode::Bounded(4)] {
    let harness = Harness::new();
    let chat = Arc::new(
      ScriptedChat::analyzing(&ids).with(ids[3], Behavior::Fail(CallError::transient("down"))),
    );
    let report = harness.runner(chat, mode).run(items(&ids), &analyze_key()).await?;
    outcomes.push((report.summary.succeeded, report.summary.failed, harness.ledger_ids().await));
  }

  assert_eq!(outcomes[0].0, 11);
  assert_eq!(outcomes[0].1, 1);
  assert!(outcomes.iter().all(|o| o == &outcomes[0]));
  Ok(())
}

#[tokio::test]
async fn test_counters_add_up() -> TestResult<()> {
  let harness = Harness::new();
  harness.store.put(&item("C"), &Analyze.fallback(&item("C"))).await;
  harness.runner(Arc::new(ScriptedChat::analyzing(&["A"])), SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;

  let chat = Arc::new(
    ScriptedChat::analyzing(&["B", "D"]).with("E", Behavior::Fail(CallError::transient("down"))),
  );
  let report = harness
    .runner(chat, ExecutionMode::Bounded(3))
    .run(items(&["A", "B", "C", "D", "E"]), &analyze_key())
    .await?;

  let s = report.summary;
  assert_eq!((s.skipped, s.cache_hits, s.succeeded, s.failed), (2, 1, 2, 1));
  assert_eq!(s.skipped + s.succeeded + s.failed, s.total);
  assert_eq!(harness.ledger_ids().await, ["A", "B", "C", "D"]);
  Ok(())
}
