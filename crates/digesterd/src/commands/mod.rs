use chrono::{Local, NaiveDate};
use digester::{
  chat::{self, Disabled},
  progress::Silent,
  retry::RetryPolicy,
  runner::{BatchReport, BatchRunner, ExecutionMode, StopSignal},
  store::ResultStore,
};

use super::*;

pub mod analyze;
pub mod cache;
pub mod classify;
pub mod init;
pub mod ledger;

pub use analyze::{analyze, AnalyzeOptions};
pub use cache::{cache, CacheCommands};
pub use classify::{classify, ClassifyOptions};
pub use init::{init, InitOptions};
pub use ledger::{ledger, LedgerCommands};

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Write a configuration file
  Init(InitOptions),

  /// Extract authors, publication date and model function from each paper
  Analyze(AnalyzeOptions),

  /// Sort a day's analysed papers into research categories
  Classify(ClassifyOptions),

  /// Inspect or clean the per-stage result caches
  Cache {
    /// Only act on this stage's cache (`analyze` or `classify`); all stages otherwise
    #[arg(long, global = true)]
    stage: Option<String>,

    /// What to do with the cache
    #[command(subcommand)]
    cmd: CacheCommands,
  },

  /// Look at what earlier batches recorded
  Ledger {
    /// What to show
    #[command(subcommand)]
    cmd: LedgerCommands,
  },
}

/// Stage names that own a cache and a ledger.
pub const STAGES: [&str; 2] = ["analyze", "classify"];

/// Options shared by every command that runs a batch.
#[derive(Args, Clone, Debug, Default)]
pub struct RunOptions {
  /// Day the batch belongs to, as YYYY-MM-DD; today if omitted
  #[arg(long)]
  pub date: Option<NaiveDate>,

  /// Number of papers processed at once; overrides the configuration
  #[arg(long)]
  pub concurrency: Option<usize>,

  /// Process one paper at a time with the configured delay between papers
  #[arg(long, action = ArgAction::SetTrue, conflicts_with = "concurrency")]
  pub sequential: bool,

  /// Do not call the model; records are built from the raw input
  #[arg(long, action = ArgAction::SetTrue)]
  pub no_ai: bool,

  /// Only print the final summary
  #[arg(long, short, action = ArgAction::SetTrue)]
  pub silent: bool,
}

impl RunOptions {
  /// The batch date as the ledger spells it.
  pub fn date(&self) -> String {
    self.date.unwrap_or_else(|| Local::now().date_naive()).format("%Y-%m-%d").to_string()
  }

  /// Execution mode after applying the command line over the configuration.
  pub fn mode(&self, config: &Config) -> Result<ExecutionMode> {
    if self.sequential {
      return Ok(ExecutionMode::Sequential { delay: config.item_delay() });
    }
    match self.concurrency.unwrap_or(config.concurrency) {
      0 => Err(DigesterdError::Usage("--concurrency must be at least 1".to_string())),
      n => Ok(ExecutionMode::Bounded(n)),
    }
  }
}

/// Builds and runs one stage over `items`, handling Ctrl-C and progress output.
///
/// The batch result is reported to the user; an aborted batch is returned as an error after its
/// partial progress has been shown.
pub(crate) async fn run_stage<I, S>(
  interaction: &I,
  config: &Config,
  options: &RunOptions,
  stage: S,
  retry: RetryPolicy,
  items: Vec<WorkItem>,
) -> Result<BatchReport<S::Output>>
where
  I: UserInteraction,
  S: Stage + 'static,
{
  let use_ai = config.use_ai && !options.no_ai;
  let chat: Arc<dyn Chat> = if use_ai {
    let credentials = config.resolve_credentials()?;
    chat::build(&config.provider, &credentials)?
  } else {
    Arc::new(Disabled)
  };

  let store = ResultStore::open(config.cache_dir.join(stage.name()), config.cache_ttl())?
    .with_prefix_chars(config.fingerprint_prefix_chars);
  let ledger = Ledger::open(&config.ledger_dir)?;
  let key = LedgerKey::new(stage.name(), options.date());

  let stop = StopSignal::new();
  let mut runner = BatchRunner::new(stage, chat, store, ledger)
    .with_retry(retry)
    .with_mode(options.mode(config)?)
    .with_ai(use_ai)
    .with_stop_signal(stop.clone());
  if !options.silent {
    let reporter = ConsoleReporter::new();
    if reporter.is_interactive() {
      runner = runner.with_progress_interval(Duration::from_millis(500));
    }
    runner = runner.with_reporter(Arc::new(reporter));
  } else {
    runner = runner.with_reporter(Arc::new(Silent));
  }

  let ctrl_c = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("Interrupted, letting papers in flight finish");
      stop.stop();
    }
  });
  let outcome = runner.run(items, &key).await;
  ctrl_c.abort();

  let report = outcome?;
  interaction.reply(ResponseContent::Summary(&report.summary))?;
  if !report.failures.is_empty() {
    interaction.reply(ResponseContent::Warning(&format!(
      "{} papers failed and will be retried on the next run for {key}",
      report.failures.len()
    )))?;
    interaction.reply(ResponseContent::Failures(&report.failures))?;
  }
  if report.stopped {
    interaction.reply(ResponseContent::Info(&format!(
      "Run the same command again to continue {key}"
    )))?;
  }
  Ok(report)
}
