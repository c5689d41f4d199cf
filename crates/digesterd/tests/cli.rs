//! Integration tests for the digester CLI commands.
//!
//! Every test writes its own configuration into a temporary directory and runs without a model, so
//! nothing leaves the machine. Tests run in serial because they share the binary's log output.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::{tempdir, TempDir};

// Helper function to create a clean command instance
fn digester() -> Command { Command::cargo_bin("digester").unwrap() }

// Helper that initialises a model-free configuration and returns its path
fn setup() -> (TempDir, PathBuf) {
  let dir = tempdir().unwrap();
  let config = dir.path().join("config.toml");
  digester()
    .arg("init")
    .arg("--config")
    .arg(&config)
    .arg("--no-ai")
    .arg("--cache-dir")
    .arg(dir.path().join("cache"))
    .arg("--ledger-dir")
    .arg(dir.path().join("ledgers"))
    .arg("--accept-defaults")
    .assert()
    .success()
    .stdout(predicate::str::contains("Created configuration at"));
  assert!(config.exists());
  (dir, config)
}

// Helper that writes a two paper input file
fn write_items(dir: &Path) -> PathBuf {
  let path = dir.join("items.json");
  std::fs::write(
    &path,
    r#"[
      {"id": "2401.00001", "title": "Attention", "abstract": "We study attention."},
      {"id": "2401.00002", "title": "Diffusion", "abstract": "We study diffusion.", "translation": "扩散"}
    ]"#,
  )
  .unwrap();
  path
}

fn analyze(config: &Path, items: &Path) -> Command {
  let mut cmd = digester();
  cmd
    .arg("analyze")
    .arg("--config")
    .arg(config)
    .arg("--items")
    .arg(items)
    .arg("--date")
    .arg("2024-01-02")
    .arg("--silent");
  cmd
}

#[test]
#[serial]
fn test_init_writes_config() {
  let (dir, config) = setup();
  let content = std::fs::read_to_string(&config).unwrap();
  assert!(content.contains("use_ai = false"));
  assert!(content.contains(&dir.path().join("ledgers").display().to_string()));

  // An existing file is only replaced after confirmation, which --accept-defaults gives
  digester()
    .arg("init")
    .arg("--config")
    .arg(&config)
    .arg("--provider")
    .arg("ollama")
    .arg("--accept-defaults")
    .assert()
    .success()
    .stdout(predicate::str::contains("ollama/llama3.2:3b"));
  let content = std::fs::read_to_string(&config).unwrap();
  assert!(content.contains("kind = \"ollama\""));
}

#[test]
#[serial]
fn test_unknown_provider_is_rejected() {
  let dir = tempdir().unwrap();
  digester()
    .arg("init")
    .arg("--config")
    .arg(dir.path().join("config.toml"))
    .arg("--provider")
    .arg("claude")
    .arg("--accept-defaults")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown provider"));
}

#[test]
#[serial]
fn test_missing_config() {
  let dir = tempdir().unwrap();
  digester()
    .arg("ledger")
    .arg("list")
    .arg("--config")
    .arg(dir.path().join("absent.toml"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("digester init"));
}

#[test]
#[serial]
fn test_analyze_then_resume() {
  let (dir, config) = setup();
  let items = write_items(dir.path());

  analyze(&config, &items)
    .assert()
    .success()
    .stdout(predicate::str::contains("succeeded: 2"))
    .stdout(predicate::str::contains("Batch finished"));
  assert!(dir.path().join("ledgers").join("analyze").join("2024-01-02.json").exists());

  // A second run for the same day has nothing left to do
  analyze(&config, &items)
    .assert()
    .success()
    .stdout(predicate::str::contains("succeeded: 0"))
    .stdout(predicate::str::contains("skipped:   2 (0 from cache)"));

  // Without a model nothing is cached
  digester()
    .arg("cache")
    .arg("stats")
    .arg("--stage")
    .arg("analyze")
    .arg("--config")
    .arg(&config)
    .assert()
    .success()
    .stdout(predicate::str::contains("entries: 0"));
}

#[test]
#[serial]
fn test_ledger_commands() {
  let (dir, config) = setup();
  let items = write_items(dir.path());
  analyze(&config, &items).assert().success();

  digester()
    .arg("ledger")
    .arg("list")
    .arg("--config")
    .arg(&config)
    .assert()
    .success()
    .stdout(predicate::str::contains("analyze: 1 days"))
    .stdout(predicate::str::contains("2024-01-02"))
    .stdout(predicate::str::contains("classify: nothing recorded"));

  digester()
    .arg("ledger")
    .arg("show")
    .arg("2024-01-02")
    .arg("--config")
    .arg(&config)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"paper_id\": \"2401.00002\""))
    .stdout(predicate::str::contains("We study attention."));

  digester()
    .arg("ledger")
    .arg("show")
    .arg("2024-01-02")
    .arg("--stage")
    .arg("summaries")
    .arg("--config")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown stage"));
}

#[test]
#[serial]
fn test_classify_writes_overview() {
  let (dir, config) = setup();
  let items = write_items(dir.path());
  let overview = dir.path().join("digest.md");

  // Nothing analysed yet
  digester()
    .arg("classify")
    .arg("--config")
    .arg(&config)
    .arg("--date")
    .arg("2024-01-02")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing has been analysed for 2024-01-02"));

  analyze(&config, &items).assert().success();
  digester()
    .arg("classify")
    .arg("--config")
    .arg(&config)
    .arg("--date")
    .arg("2024-01-02")
    .arg("--summary")
    .arg(&overview)
    .arg("--silent")
    .assert()
    .success()
    .stdout(predicate::str::contains("Uncategorized: 2"));

  let markdown = std::fs::read_to_string(&overview).unwrap();
  assert!(markdown.contains("# Paper digest for 2024-01-02"));
  assert!(markdown.contains("## Uncategorized (2)"));
}

#[test]
#[serial]
fn test_cache_clear_all_stages() {
  let (_dir, config) = setup();
  digester()
    .arg("cache")
    .arg("clear")
    .arg("--config")
    .arg(&config)
    .arg("--accept-defaults")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 0 analyze entries"))
    .stdout(predicate::str::contains("Removed 0 classify entries"));
}
