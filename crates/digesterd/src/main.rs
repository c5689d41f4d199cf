//! Command line driver for daily research paper digests.
//!
//! This crate wraps the `digester` library in a CLI that runs the analysis and classification
//! stages over a day's papers and manages their caches and ledgers:
//!
//! ```bash
//! # Write a configuration file
//! digester init --provider zhipu
//!
//! # Analyse the papers listed in a JSON file, resuming any earlier run for the same day
//! digester analyze --items papers.json --date 2024-01-02
//!
//! # Classify everything analysed that day
//! digester classify --date 2024-01-02
//!
//! # Inspect and maintain the result cache
//! digester cache stats
//! digester cache clear-expired
//!
//! # Look at what has been recorded
//! digester ledger list
//! digester ledger show 2024-01-02
//! ```
//!
//! Batches can be interrupted with Ctrl-C: items in flight finish, nothing new starts, and the next
//! run for the same day continues where this one stopped.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use digester::{
  config::Config,
  ledger::{Ledger, LedgerKey},
  prelude::*,
  WorkItem,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;
pub mod interaction;

use crate::{commands::*, error::*, interaction::*};

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Cached, resumable LLM digests of daily research papers")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the configuration file. If not specified, uses the default platform-specific config
  /// directory.
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// Also write logs to daily rolling files in this directory
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,

  /// Skip all prompts and accept defaults (mostly for testing)
  #[arg(long, hide = true, global = true)]
  accept_defaults: bool,
}

impl Cli {
  /// The configuration file this invocation reads or writes.
  pub fn config_path(&self) -> PathBuf { self.config.clone().unwrap_or_else(Config::default_path) }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// `RUST_LOG` overrides the level. When `log_dir` is given, logs go to a daily rolling file there
/// instead of stderr; the returned guard flushes it on drop.
fn setup_logging(verbosity: u8, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  match log_dir {
    Some(dir) => {
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "digester.log"));
      builder.with_writer(writer).with_ansi(false).init();
      Some(guard)
    },
    None => {
      builder.with_writer(std::io::stderr).init();
      None
    },
  }
}

/// Runs the parsed command.
async fn run(cli: &Cli) -> Result<()> {
  let interaction = Terminal::new(cli.accept_defaults);
  if let Commands::Init(options) = &cli.command {
    return init(&interaction, &cli.config_path(), options.clone());
  }

  let path = cli.config_path();
  let config = Config::load(&path).map_err(|e| {
    DigesterdError::Usage(format!(
      "Failed to open configuration at {}: {e}. Run `digester init` to create one.",
      path.display()
    ))
  })?;
  debug!("Using configuration {config:?}");

  match &cli.command {
    Commands::Init(_) => Ok(()),
    Commands::Analyze(options) => analyze(&interaction, &config, options).await,
    Commands::Classify(options) => classify(&interaction, &config, options).await,
    Commands::Cache { stage, cmd } => cache(&interaction, &config, stage.as_deref(), cmd).await,
    Commands::Ledger { cmd } => ledger(&interaction, &config, cmd).await,
  }
}

/// Entry point for the digester CLI application
///
/// Parses arguments, sets up logging and runs the requested command. Errors are printed with the
/// error prefix and turn into a non-zero exit code.
#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  let _guard = setup_logging(cli.verbose, cli.log_dir.as_ref());

  match run(&cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("{} {e}", style(ERROR_PREFIX).red());
      ExitCode::FAILURE
    },
  }
}
