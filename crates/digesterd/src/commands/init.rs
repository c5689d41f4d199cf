//! Module for writing a digester configuration file

use std::path::Path;

use digester::{chat::ProviderKind, config::ProviderConfig};

use super::*;

#[derive(Args, Clone, Debug, Default)]
pub struct InitOptions {
  /// Model vendor: ollama, zhipu, doubao or openai
  #[arg(long)]
  pub provider:    Option<ProviderKind>,
  /// Model name; the vendor's default if omitted
  #[arg(long)]
  pub model:       Option<String>,
  /// Endpoint root; the vendor's default if omitted
  #[arg(long)]
  pub base_url:    Option<String>,
  /// Directory holding one result cache per stage
  #[arg(long)]
  pub cache_dir:   Option<PathBuf>,
  /// Directory holding the per-day ledgers
  #[arg(long)]
  pub ledger_dir:  Option<PathBuf>,
  /// Papers processed at once
  #[arg(long)]
  pub concurrency: Option<usize>,
  /// Never call a model; records are built from the raw input
  #[arg(long, action = ArgAction::SetTrue)]
  pub no_ai:       bool,
}

/// Function for the [`Commands::Init`] in the CLI.
pub fn init<I: UserInteraction>(interaction: &I, path: &Path, options: InitOptions) -> Result<()> {
  let InitOptions { provider, model, base_url, cache_dir, ledger_dir, concurrency, no_ai } = options;

  if path.exists()
    && !interaction.confirm(&format!(
      "A configuration already exists at {}, do you want to overwrite it?",
      path.display()
    ))?
  {
    interaction.reply(ResponseContent::Info(
      "Keeping the existing configuration. Pass --config to write one elsewhere.",
    ))?;
    return Ok(());
  }

  let mut config = Config::default().with_ai(!no_ai);
  let kind = provider.unwrap_or(config.provider.kind);
  config = config.with_provider(ProviderConfig { model, base_url, ..ProviderConfig::new(kind) });
  if let Some(dir) = cache_dir {
    config = config.with_cache_dir(dir);
  }
  if let Some(dir) = ledger_dir {
    config = config.with_ledger_dir(dir);
  }
  if let Some(n) = concurrency {
    config = config.with_concurrency(n);
  }
  config.validate()?;
  config.save(path)?;

  interaction.reply(ResponseContent::Success(&format!(
    "Created configuration at {}",
    path.display()
  )))?;
  let mut lines = vec![
    format!("cache:  {}", config.cache_dir.display()),
    format!("ledger: {}", config.ledger_dir.display()),
  ];
  if config.use_ai {
    lines.push(format!("model:  {}/{}", config.provider.kind, config.provider.model()));
    if let Some(var) = config.provider.api_key_env() {
      lines.push(format!("key:    read from ${var}"));
    }
  } else {
    lines.push("model:  disabled".to_string());
  }
  interaction.reply(ResponseContent::List(&lines))?;
  Ok(())
}
