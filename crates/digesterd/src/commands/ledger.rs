//! Module for looking at recorded batches

use digester::stage::{Analysis, Analyze, Classification, Classify};

use super::*;

/// What to show from the ledgers
#[derive(Subcommand, Clone, Debug)]
pub enum LedgerCommands {
  /// List the dates with records, per stage
  List {
    /// Only list this stage
    stage: Option<String>,
  },
  /// Print the records of one stage and date as JSON
  Show {
    /// Date of the batch, as YYYY-MM-DD
    date:  String,
    /// Stage whose records to print
    #[arg(long, default_value = Analyze::NAME)]
    stage: String,
  },
}

/// Function for the [`Commands::Ledger`] in the CLI.
pub async fn ledger<I: UserInteraction>(
  interaction: &I,
  config: &Config,
  cmd: &LedgerCommands,
) -> Result<()> {
  let ledger = Ledger::open(&config.ledger_dir)?;
  match cmd {
    LedgerCommands::List { stage } => {
      let stages: Vec<&str> = match stage.as_deref() {
        Some(name) => vec![known_stage(name)?],
        None => STAGES.to_vec(),
      };
      for name in stages {
        let dates = ledger.dates(name).await?;
        if dates.is_empty() {
          interaction.reply(ResponseContent::Info(&format!("{name}: nothing recorded")))?;
        } else {
          interaction.reply(ResponseContent::Info(&format!("{name}: {} days", dates.len())))?;
          interaction.reply(ResponseContent::List(&dates))?;
        }
      }
    },
    LedgerCommands::Show { date, stage } => {
      let key = LedgerKey::new(known_stage(stage)?, date.as_str());
      let json = match key.stage() {
        Classify::NAME => serde_json::to_string_pretty(&ledger.load::<Classification>(&key).await?)?,
        _ => serde_json::to_string_pretty(&ledger.load::<Analysis>(&key).await?)?,
      };
      println!("{json}");
    },
  }
  Ok(())
}

/// Rejects stage names that have no ledger.
fn known_stage(name: &str) -> Result<&str> {
  if STAGES.contains(&name) {
    Ok(name)
  } else {
    Err(DigesterdError::Usage(format!(
      "Unknown stage '{name}', expected one of {}",
      STAGES.join(", ")
    )))
  }
}
