//! Error types for the digester library.
//!
//! Two families of errors live here:
//!
//! - [`DigesterError`]: everything that can go wrong while setting up or persisting a batch
//!   (configuration, file system, serialization). These are returned from fallible constructors and
//!   from [`crate::runner::BatchRunner::run`] when the whole batch cannot proceed.
//! - [`CallError`]: the outcome of a single failed external call, classified by [`ErrorKind`]. These
//!   never escape a batch unless their kind is [`ErrorKind::Fatal`].
//!
//! # Examples
//!
//! ```
//! use digester::error::{CallError, ErrorKind};
//!
//! let err = CallError::timeout(90);
//! assert_eq!(err.kind(), ErrorKind::Timeout);
//! assert!(err.is_retryable());
//! ```

use std::fmt::Display;

use thiserror::Error;

/// Error type alias used for the [`digester`](crate) crate.
pub type Result<T, E = DigesterError> = core::result::Result<T, E>;

/// Errors that stop a batch from starting or from reading its persisted state.
#[derive(Error, Debug)]
pub enum DigesterError {
  /// A file system operation failed.
  ///
  /// This occurs when:
  /// - The cache or ledger directory cannot be created
  /// - A ledger file cannot be read or written
  /// - Permission errors occur
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// JSON (de)serialization of a cache entry or ledger failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// An HTTP client could not be constructed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// The configuration could not be serialized.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// A ledger artifact exists but does not hold a list of records.
  ///
  /// Proceeding would overwrite previously completed work, so the batch refuses to start.
  #[error("Ledger at {path} is unreadable: {reason}")]
  CorruptLedger {
    /// Location of the offending artifact
    path:   String,
    /// Parser message
    reason: String,
  },

  /// The API key for the configured provider is not available.
  #[error("Missing credentials: environment variable {0} is not set")]
  MissingCredentials(String),

  /// A configuration value is invalid.
  #[error("{0}")]
  Config(String),

  /// The model provider rejected the batch outright, e.g. with an authentication failure.
  #[error("Batch aborted: {0}")]
  Aborted(CallError),
}

/// Classification of a failed external call.
///
/// Only [`ErrorKind::Fatal`] aborts a batch; every other kind fails at most the single item that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// The attempt did not finish before its deadline.
  Timeout,
  /// Network errors, rate limits, server errors and empty payloads.
  Transient,
  /// The provider answered but the answer could not be turned into a record.
  Malformed,
  /// Retrying cannot help and neither can moving on to the next item.
  Fatal,
}

impl Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Timeout => write!(f, "timeout"),
      Self::Transient => write!(f, "transient"),
      Self::Malformed => write!(f, "malformed"),
      Self::Fatal => write!(f, "fatal"),
    }
  }
}

/// A single failed external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct CallError {
  /// What went wrong, for retry decisions
  kind:    ErrorKind,
  /// Human readable detail
  message: String,
}

impl CallError {
  /// Creates an error of the given kind.
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self { kind, message: message.into() }
  }

  /// An attempt that exceeded its deadline of `seconds`.
  pub fn timeout(seconds: u64) -> Self {
    Self::new(ErrorKind::Timeout, format!("no response within {seconds}s"))
  }

  /// A failure worth another attempt.
  pub fn transient(message: impl Into<String>) -> Self { Self::new(ErrorKind::Transient, message) }

  /// The provider returned nothing usable.
  pub fn empty() -> Self { Self::new(ErrorKind::Transient, "empty response") }

  /// A response that could not be parsed.
  pub fn malformed(message: impl Into<String>) -> Self { Self::new(ErrorKind::Malformed, message) }

  /// A failure that must stop the batch.
  pub fn fatal(message: impl Into<String>) -> Self { Self::new(ErrorKind::Fatal, message) }

  /// The classification of this error.
  pub fn kind(&self) -> ErrorKind { self.kind }

  /// The human readable detail.
  pub fn message(&self) -> &str { &self.message }

  /// Whether another attempt could succeed.
  pub fn is_retryable(&self) -> bool { matches!(self.kind, ErrorKind::Timeout | ErrorKind::Transient) }

  /// Whether the batch must stop.
  pub fn is_fatal(&self) -> bool { self.kind == ErrorKind::Fatal }
}

impl From<reqwest::Error> for CallError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      Self::new(ErrorKind::Timeout, e.to_string())
    } else {
      Self::transient(e.to_string())
    }
  }
}
