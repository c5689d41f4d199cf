use digester::stage::{Classification, Classify};

use super::*;

#[tokio::test]
async fn test_analysis_then_classification() -> TestResult<()> {
  let harness = Harness::new();
  let analyses = harness
    .runner(Arc::new(ScriptedChat::analyzing(&["A", "B"])), SEQUENTIAL)
    .run(items(&["A", "B"]), &analyze_key())
    .await?
    .records;

  let chat = Arc::new(
    ScriptedChat::new()
      .with("A", Behavior::Reply("## Video Generation\n\nA makes videos.".into()))
      .with("B", Behavior::Reply("Speech".into())),
  );
  let store = ResultStore::open(harness.dir.path().join("cache").join("classify"), chrono::Duration::days(30))?;
  let key = LedgerKey::new("classify", "2024-01-02");
  let report = BatchRunner::new(Classify::new(), chat, store, harness.ledger.clone())
    .with_mode(ExecutionMode::Bounded(2))
    .run(analyses.iter().map(WorkItem::from).collect(), &key)
    .await?;

  assert_eq!(report.summary.succeeded, 2);
  let tally = Classification::tally(&report.records);
  assert_eq!(tally.get("Video Generation"), Some(&1));
  assert_eq!(tally.get("Speech"), Some(&1));

  let b = report.records.iter().find(|r| r.paper_id == "B").unwrap();
  assert!(b.markdown.contains("model B does things"));
  assert_eq!(harness.ledger.dates("classify").await?, ["2024-01-02"]);
  Ok(())
}

#[tokio::test]
async fn test_disabled_ai_uses_raw_input() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B"]));

  let report = harness
    .runner(chat.clone(), ExecutionMode::Bounded(2))
    .with_ai(false)
    .run(items(&["A", "B"]), &analyze_key())
    .await?;

  assert_eq!(chat.total_calls(), 0);
  assert_eq!(report.summary.succeeded, 2);
  assert_eq!(harness.store.stats().await.file_count, 0);
  let a = report.records.iter().find(|r| r.paper_id == "A").unwrap();
  assert_eq!(a.model_function, "Abstract of A");
  assert_eq!(a.authors, digester::stage::NOT_MENTIONED);
  Ok(())
}

#[tokio::test]
async fn test_retries_replace_ledger_records() -> TestResult<()> {
  let harness = Harness::new();
  let key = analyze_key();
  let stale = Analyze.fallback(&item("A"));
  harness.ledger.upsert(&key, &stale).await?;
  let fresh = Analyze.parse(&item("A"), &analysis_reply("A"))?;
  harness.ledger.upsert(&key, &fresh).await?;

  let records: Vec<Analysis> = harness.ledger.load(&key).await?;
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].authors, "Team A");
  Ok(())
}
