//! Prompting and response parsing for each pipeline stage.
//!
//! A [`Stage`] knows how to turn a [`WorkItem`] into a conversation, how to turn the model's reply
//! into a typed [`Record`], and what record to produce when model calls are disabled. Everything
//! else (caching, retries, ledgers, concurrency) is the batch runner's job and identical for all
//! stages.

use crate::chat::Message;

use super::*;

pub mod analyze;
pub mod classify;

pub use analyze::{Analysis, Analyze};
pub use classify::{Classification, Classify};

/// Placeholder for fields the model did not provide.
pub const NOT_MENTIONED: &str = "not mentioned";

/// A persisted stage output.
///
/// Records are what ledgers store and result stores cache. The id ties a record back to the work
/// item it was computed for and is the key ledgers upsert on.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
  /// Id of the work item this record belongs to.
  fn id(&self) -> &str;
}

/// One model-backed transformation of work items into records.
pub trait Stage: Send + Sync {
  /// The record this stage produces.
  type Output: Record;

  /// Name used in ledger keys, cache directories and logs.
  fn name(&self) -> &'static str;

  /// The conversation sent to the model for `item`.
  fn messages(&self, item: &WorkItem) -> Vec<Message>;

  /// Turns a non-empty model reply into a record.
  ///
  /// # Errors
  ///
  /// Returns a [`ErrorKind::Malformed`] error when the reply has none of the expected structure.
  fn parse(&self, item: &WorkItem, response: &str) -> Result<Self::Output, CallError>;

  /// The record produced from the raw input alone when model calls are disabled.
  fn fallback(&self, item: &WorkItem) -> Self::Output;
}

/// Strips markdown emphasis and surrounding whitespace from an extracted field.
pub(crate) fn clean_field(value: &str) -> String {
  value.trim().trim_matches('*').trim().to_string()
}
