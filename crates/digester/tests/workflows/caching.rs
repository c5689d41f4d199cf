use chrono::Utc;
use digester::{progress::SkipReason, store::CacheEntry};

use super::*;

#[traced_test]
#[tokio::test]
async fn test_cache_hit_skips_call_but_fills_ledger() -> TestResult<()> {
  let harness = Harness::new();
  let cached = Analyze.parse(&item("A"), &analysis_reply("A"))?;
  assert!(harness.store.put(&item("A"), &cached).await);

  let chat = Arc::new(ScriptedChat::analyzing(&["A", "B"]));
  let reporter = Arc::new(RecordingReporter::default());
  let report = harness
    .runner(chat.clone(), SEQUENTIAL)
    .with_reporter(reporter.clone())
    .run(items(&["A", "B"]), &analyze_key())
    .await?;

  assert_eq!(report.summary.skipped, 1);
  assert_eq!(report.summary.cache_hits, 1);
  assert_eq!(report.summary.succeeded, 1);
  assert_eq!(chat.calls("A"), 0);
  assert_eq!(chat.calls("B"), 1);
  assert_eq!(harness.ledger_ids().await, ["A", "B"]);

  let events = reporter.events.lock().unwrap();
  assert!(events.iter().any(|e| matches!(
    e,
    BatchEvent::Skipped { id, reason: SkipReason::Cache } if id == "A"
  )));
  Ok(())
}

#[tokio::test]
async fn test_cache_survives_a_new_store() -> TestResult<()> {
  let harness = Harness::new();
  let first = Arc::new(ScriptedChat::analyzing(&["A"]));
  harness.runner(first, SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;

  // Same cache directory, different day and a freshly opened store.
  let store = ResultStore::open(harness.store.dir(), chrono::Duration::days(30))?;
  let chat = Arc::new(ScriptedChat::analyzing(&["A"]));
  let report = BatchRunner::new(Analyze::new(), chat.clone(), store, harness.ledger.clone())
    .with_mode(SEQUENTIAL)
    .run(items(&["A"]), &LedgerKey::new("analyze", "2024-01-03"))
    .await?;

  assert_eq!(report.summary.cache_hits, 1);
  assert_eq!(chat.total_calls(), 0);
  Ok(())
}

#[tokio::test]
async fn test_expired_entry_is_recomputed() -> TestResult<()> {
  let harness = Harness::new();
  let a = item("A");
  let stale = CacheEntry {
    fingerprint:     harness.store.fingerprint(&a),
    work_item_id:    a.id.clone(),
    work_item_title: a.title.clone(),
    cached_at:       Utc::now() - chrono::Duration::days(45),
    result:          Analyze.fallback(&a),
  };
  let path = harness.store.entry_path(&stale.fingerprint);
  std::fs::write(&path, serde_json::to_vec(&stale)?)?;

  let chat = Arc::new(ScriptedChat::analyzing(&["A"]));
  let report = harness.runner(chat.clone(), SEQUENTIAL).run(vec![a.clone()], &analyze_key()).await?;

  assert_eq!(report.summary.cache_hits, 0);
  assert_eq!(chat.calls("A"), 1);
  assert_eq!(report.records[0].authors, "Team A");

  // The fresh result replaced the stale entry.
  let fresh: Option<Analysis> = harness.store.get(&a).await;
  assert_eq!(fresh.unwrap().authors, "Team A");
  Ok(())
}

#[tokio::test]
async fn test_failures_are_not_cached() -> TestResult<()> {
  let harness = Harness::new();
  let chat = Arc::new(ScriptedChat::new().with("A", Behavior::Reply("no structure here".into())));
  let report = harness.runner(chat, SEQUENTIAL).run(items(&["A"]), &analyze_key()).await?;

  assert_eq!(report.summary.failed, 1);
  assert_eq!(harness.store.stats().await.file_count, 0);
  assert!(harness.ledger_ids().await.is_empty());
  Ok(())
}
