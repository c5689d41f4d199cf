//! Cached, resumable LLM batch processing for daily research paper digests.
//!
//! `digester` drives a day's worth of papers through expensive language model stages
//! (analysis, classification) while making sure that work is never paid for twice:
//!
//! - Every paper is fingerprinted from its identity and a bounded prefix of its content
//! - A [`store::ResultStore`] caches each computed record by fingerprint, with expiration
//! - A [`ledger::Ledger`] persists results for a `(stage, date)` after every single success, so a
//!   crash or kill mid-batch loses at most the in-flight item
//! - A [`retry`] executor wraps every model call with attempt timeouts and backoff
//! - A [`runner::BatchRunner`] ties it together in sequential or bounded-concurrency mode
//!
//! # Getting Started
//!
//! ```no_run
//! use digester::{
//!   chat,
//!   config::Config,
//!   ledger::{Ledger, LedgerKey},
//!   runner::{BatchRunner, ExecutionMode},
//!   stage::Analyze,
//!   store::ResultStore,
//!   WorkItem,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::load(Config::default_path())?;
//!   let credentials = config.resolve_credentials()?;
//!   let chat = chat::build(&config.provider, &credentials)?;
//!
//!   let store = ResultStore::open(config.cache_dir.join("analyze"), config.cache_ttl())?;
//!   let ledger = Ledger::open(&config.ledger_dir)?;
//!   let runner = BatchRunner::new(Analyze::new(), chat, store, ledger)
//!     .with_retry(config.analysis_retry.clone())
//!     .with_mode(ExecutionMode::Bounded(config.concurrency));
//!
//!   let items = vec![WorkItem::new("2401.00001", "A paper", "An abstract")];
//!   let key = LedgerKey::new("analyze", "2024-01-02");
//!   let report = runner.run(items, &key).await?;
//!   println!("{} succeeded, {} failed", report.summary.succeeded, report.summary.failed);
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`fingerprint`]: Stable cache keys for work items
//! - [`store`]: Fingerprint keyed result cache with lazy expiration
//! - [`ledger`]: Incremental, upsert-by-id output artifacts
//! - [`retry`]: Timeout and backoff wrapper around a single external call
//! - [`chat`]: The language model capability and its vendor implementations
//! - [`stage`]: Prompting and response parsing for each pipeline stage
//! - [`runner`]: The batch state machine
//! - [`stats`] and [`progress`]: Counters and their periodic rendering
//! - [`config`]: The immutable configuration built once at startup
//! - [`error`]: Error types

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  fmt::Display,
  future::Future,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

mod atomic;
pub mod chat;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod item;
pub mod ledger;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod stage;
pub mod stats;
pub mod store;

pub use item::WorkItem;

use crate::error::*;

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use digester::prelude::*;
///
/// fn first_id(records: &[impl Record]) -> Option<&str> { records.first().map(|r| r.id()) }
/// ```
pub mod prelude {
  pub use crate::{
    chat::Chat,
    error::{CallError, DigesterError, ErrorKind},
    progress::Reporter,
    stage::{Record, Stage},
  };
}
