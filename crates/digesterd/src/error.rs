//! Error types for the digester CLI.

use thiserror::Error;

use super::*;

/// Error type alias used for the CLI.
pub type Result<T> = core::result::Result<T, DigesterdError>;

/// Everything a command can fail with.
#[derive(Error, Debug)]
pub enum DigesterdError {
  /// The library refused: bad configuration, unreadable ledger, aborted batch and so on.
  #[error(transparent)]
  Digester(#[from] DigesterError),

  /// A file given on the command line could not be read or written.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// An interactive prompt failed.
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// Output could not be rendered as JSON.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The invocation itself is wrong.
  #[error("{0}")]
  Usage(String),
}
