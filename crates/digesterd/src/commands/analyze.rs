//! Module for the analysis batch

use digester::stage::Analyze;

use super::*;

#[derive(Args, Clone, Debug)]
pub struct AnalyzeOptions {
  /// JSON file with a list of papers (`id`, `title`, `abstract`, optional `url` and `translation`)
  #[arg(long)]
  pub items: PathBuf,

  #[command(flatten)]
  pub run: RunOptions,
}

/// Function for the [`Commands::Analyze`] in the CLI.
pub async fn analyze<I: UserInteraction>(
  interaction: &I,
  config: &Config,
  options: &AnalyzeOptions,
) -> Result<()> {
  let items = WorkItem::load_all(&options.items)?;
  info!("Loaded {} papers from {}", items.len(), options.items.display());
  if items.is_empty() {
    interaction.reply(ResponseContent::Info("No papers to analyse"))?;
    return Ok(());
  }

  run_stage(
    interaction,
    config,
    &options.run,
    Analyze::new(),
    config.analysis_retry.clone(),
    items,
  )
  .await?;
  Ok(())
}
