//! Module for the classification batch

use digester::stage::{Analysis, Analyze, Classification, Classify};

use super::*;

#[derive(Args, Clone, Debug)]
pub struct ClassifyOptions {
  /// Also write a markdown overview of the day's categories to this file
  #[arg(long)]
  pub summary: Option<PathBuf>,

  #[command(flatten)]
  pub run: RunOptions,
}

/// Function for the [`Commands::Classify`] in the CLI.
///
/// Classifies every paper the analysis stage recorded for the date.
pub async fn classify<I: UserInteraction>(
  interaction: &I,
  config: &Config,
  options: &ClassifyOptions,
) -> Result<()> {
  let date = options.run.date();
  let analyses: Vec<Analysis> =
    Ledger::open(&config.ledger_dir)?.load(&LedgerKey::new(Analyze::NAME, date.as_str())).await?;
  if analyses.is_empty() {
    interaction.reply(ResponseContent::Info(&format!(
      "Nothing has been analysed for {date}, run `digester analyze --date {date}` first"
    )))?;
    return Ok(());
  }
  let items: Vec<WorkItem> = analyses.iter().map(WorkItem::from).collect();

  let stage = Classify::new().with_categories(config.categories.clone());
  let report = run_stage(
    interaction,
    config,
    &options.run,
    stage,
    config.classification_retry.clone(),
    items,
  )
  .await?;

  // Records cover the whole day, including papers classified by earlier runs.
  let records = report.records;
  interaction.reply(ResponseContent::Info(&format!("Categories for {date}")))?;
  interaction.reply(ResponseContent::Tally(&Classification::tally(&records)))?;

  if let Some(path) = &options.summary {
    std::fs::write(path, Classification::summary_markdown(&date, &records))?;
    interaction.reply(ResponseContent::Success(&format!(
      "Wrote overview to {}",
      path.display()
    )))?;
  }
  Ok(())
}
