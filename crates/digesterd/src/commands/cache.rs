//! Module for inspecting and cleaning result caches

use super::*;

/// What to do with the result caches
#[derive(Subcommand, Clone, Debug)]
pub enum CacheCommands {
  /// Show entry counts and size
  Stats,
  /// Delete entries older than the configured lifetime
  ClearExpired,
  /// Delete every entry
  Clear,
}

/// Function for the [`Commands::Cache`] in the CLI.
pub async fn cache<I: UserInteraction>(
  interaction: &I,
  config: &Config,
  stage: Option<&str>,
  cmd: &CacheCommands,
) -> Result<()> {
  let stages: Vec<&str> = match stage {
    Some(name) if STAGES.contains(&name) => vec![name],
    Some(name) => {
      return Err(DigesterdError::Usage(format!(
        "Unknown stage '{name}', expected one of {}",
        STAGES.join(", ")
      )))
    },
    None => STAGES.to_vec(),
  };

  if matches!(cmd, CacheCommands::Clear)
    && !interaction.confirm(&format!("Delete every cached result for {}?", stages.join(" and ")))?
  {
    return Ok(());
  }

  for name in stages {
    let store = ResultStore::open(config.cache_dir.join(name), config.cache_ttl())?
      .with_prefix_chars(config.fingerprint_prefix_chars);
    match cmd {
      CacheCommands::Stats => {
        let stats = store.stats().await;
        interaction.reply(ResponseContent::Store { stage: name, stats: &stats })?;
      },
      CacheCommands::ClearExpired => {
        let removed = store.clear_expired().await;
        interaction.reply(ResponseContent::Success(&format!(
          "Removed {removed} expired {name} entries"
        )))?;
      },
      CacheCommands::Clear => {
        let removed = store.clear_all().await;
        interaction.reply(ResponseContent::Success(&format!("Removed {removed} {name} entries")))?;
      },
    }
  }
  Ok(())
}
