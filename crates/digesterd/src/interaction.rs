//! Everything the CLI shows the user or asks them.

use std::collections::BTreeMap;

use console::Term;
use dialoguer::Confirm;
use digester::{
  progress::{self, BatchEvent, SkipReason},
  runner::FailedItem,
  stats::BatchSummary,
  store::StoreStats,
};

use super::*;

/// Prefix for information messages
pub static INFO_PREFIX: &str = "ℹ ";
/// Prefix for an item being worked on
pub static WORKING_PREFIX: &str = "» ";
/// Prefix for success messages
pub static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for error messages
pub static ERROR_PREFIX: &str = "✗ ";
/// Prefix for warning messages
pub static WARNING_PREFIX: &str = "! ";
/// Prefix for skipped items
pub static SKIP_PREFIX: &str = "↷ ";
/// Branch of a tree listing
pub static ITEM_PREFIX: &str = "├─";
/// Last branch of a tree listing
pub static LAST_ITEM_PREFIX: &str = "└─";

/// Something to show the user.
#[derive(Debug)]
pub enum ResponseContent<'a> {
  /// An operation completed
  Success(&'a str),
  /// Neutral information
  Info(&'a str),
  /// Something the user should look at
  Warning(&'a str),
  /// Final counters of a batch
  Summary(&'a BatchSummary),
  /// Items that failed in a batch
  Failures(&'a [FailedItem]),
  /// Papers per category
  Tally(&'a BTreeMap<String, usize>),
  /// Contents of one stage's result store
  Store {
    /// Stage name
    stage: &'a str,
    /// Counters
    stats: &'a StoreStats,
  },
  /// A tree of labelled lines
  List(&'a [String]),
}

/// How commands talk to the user.
pub trait UserInteraction {
  /// Asks a yes/no question.
  fn confirm(&self, message: &str) -> Result<bool>;

  /// Shows something.
  fn reply(&self, content: ResponseContent) -> Result<()>;
}

/// The interactive terminal.
pub struct Terminal {
  /// Answer yes to every question without asking
  accept_defaults: bool,
}

impl Terminal {
  /// Creates a terminal interaction, optionally answering every prompt with yes.
  pub fn new(accept_defaults: bool) -> Self { Self { accept_defaults } }
}

impl UserInteraction for Terminal {
  fn confirm(&self, message: &str) -> Result<bool> {
    if self.accept_defaults {
      return Ok(true);
    }
    Ok(Confirm::new().with_prompt(message).default(false).interact()?)
  }

  fn reply(&self, content: ResponseContent) -> Result<()> {
    match content {
      ResponseContent::Success(message) => println!("{} {message}", style(SUCCESS_PREFIX).green()),
      ResponseContent::Info(message) => println!("{} {message}", style(INFO_PREFIX).blue()),
      ResponseContent::Warning(message) => println!("{} {message}", style(WARNING_PREFIX).yellow()),
      ResponseContent::Summary(summary) => {
        let prefix = if summary.failed == 0 {
          style(SUCCESS_PREFIX).green()
        } else {
          style(WARNING_PREFIX).yellow()
        };
        println!("{prefix} {}", style("Batch finished").bold());
        println!("   {ITEM_PREFIX} total:     {}", summary.total);
        println!("   {ITEM_PREFIX} succeeded: {}", style(summary.succeeded).green());
        println!("   {ITEM_PREFIX} failed:    {}", style(summary.failed).red());
        println!(
          "   {ITEM_PREFIX} skipped:   {} ({} from cache)",
          style(summary.skipped).dim(),
          summary.cache_hits
        );
        println!(
          "   {LAST_ITEM_PREFIX} elapsed:   {}",
          progress::format_clock(summary.elapsed_seconds)
        );
      },
      ResponseContent::Failures(failures) =>
        for (i, failure) in failures.iter().enumerate() {
          let branch = if i + 1 == failures.len() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
          println!("   {branch} {} {}", style(&failure.id).red(), style(&failure.error).dim());
        },
      ResponseContent::Tally(tally) => {
        let mut counts: Vec<_> = tally.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (i, (category, count)) in counts.iter().enumerate() {
          let branch = if i + 1 == counts.len() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
          println!("   {branch} {}: {count}", style(category).cyan());
        }
      },
      ResponseContent::Store { stage, stats } => {
        println!("{} {}", style(INFO_PREFIX).blue(), style(stage).bold());
        println!("   {ITEM_PREFIX} entries: {}", stats.file_count);
        println!("   {ITEM_PREFIX} valid:   {}", style(stats.valid).green());
        println!("   {ITEM_PREFIX} expired: {}", style(stats.expired_count).yellow());
        println!("   {LAST_ITEM_PREFIX} size:    {:.2} MiB", stats.size_mib());
      },
      ResponseContent::List(lines) =>
        for (i, line) in lines.iter().enumerate() {
          let branch = if i + 1 == lines.len() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
          println!("   {branch} {line}");
        },
    }
    Ok(())
  }
}

/// Prints batch events as they happen and, on a terminal, a live progress line.
pub struct ConsoleReporter {
  /// Where output goes
  term: Term,
}

impl ConsoleReporter {
  /// Reports to stdout.
  pub fn new() -> Self { Self { term: Term::stdout() } }

  /// Whether stdout is an interactive terminal that can redraw a progress line.
  pub fn is_interactive(&self) -> bool { self.term.is_term() }

  /// Writes a full line, first erasing any progress line.
  fn line(&self, text: String) {
    if self.term.is_term() {
      let _ = self.term.clear_line();
    }
    let _ = self.term.write_line(&text);
  }
}

impl Default for ConsoleReporter {
  fn default() -> Self { Self::new() }
}

impl Reporter for ConsoleReporter {
  fn event(&self, event: &BatchEvent) {
    match event {
      BatchEvent::Started { key, total, pending } => self.line(format!(
        "{} {key}: {pending} of {total} papers to process",
        style(INFO_PREFIX).blue()
      )),
      BatchEvent::Skipped { id, reason } => {
        let source = match reason {
          SkipReason::Ledger => "already recorded",
          SkipReason::Cache => "cached",
        };
        self.line(format!("{} {id} ({source})", style(SKIP_PREFIX).dim()))
      },
      BatchEvent::Processing { title, position, pending, .. } => self.line(format!(
        "{} [{position}/{pending}] {}",
        style(WORKING_PREFIX).cyan(),
        title.chars().take(70).collect::<String>()
      )),
      BatchEvent::Succeeded { id } => self.line(format!("{} {id}", style(SUCCESS_PREFIX).green())),
      BatchEvent::Failed { id, error } =>
        self.line(format!("{} {id}: {}", style(ERROR_PREFIX).red(), style(error).dim())),
      BatchEvent::PersistFailed { id, reason } => self.line(format!(
        "{} {id} was processed but not recorded, it may be redone next run: {reason}",
        style(WARNING_PREFIX).yellow()
      )),
      BatchEvent::Stopped { not_started } => self.line(format!(
        "{} Stopped early, {not_started} papers were not started",
        style(WARNING_PREFIX).yellow()
      )),
      BatchEvent::Finished(_) =>
        if self.term.is_term() {
          let _ = self.term.clear_line();
        },
    }
  }

  fn tick(&self, summary: &BatchSummary) {
    let _ = self.term.clear_line();
    let _ = self.term.write_str(&progress::render(summary, 30));
  }
}
