//! The immutable configuration every component is built from.
//!
//! A [`Config`] is read once at startup (from TOML), credentials are resolved from the environment
//! exactly once through [`Config::resolve_credentials`], and both are then passed by reference to
//! whatever needs them. Nothing deeper in the crate reads the process environment.
//!
//! # Examples
//!
//! ```toml
//! cache_dir = "/home/me/.local/share/digester/cache"
//! ledger_dir = "/home/me/.local/share/digester/ledgers"
//! cache_ttl_days = 30
//! concurrency = 5
//!
//! [provider]
//! kind = "zhipu"
//! model = "GLM-4.5-Air"
//!
//! [analysis_retry]
//! max_attempts = 3
//! base_delay_ms = 2000
//! backoff = "fixed"
//! timeout_secs = 90
//! ```

use crate::{chat::ProviderKind, fingerprint::DEFAULT_PREFIX_CHARS, retry::RetryPolicy};

use super::*;

/// Name of the directory used under the platform config and data directories.
pub const APP_DIR: &str = "digester";

/// Days a cached result stays valid.
pub const DEFAULT_CACHE_TTL_DAYS: u32 = 30;

/// Workers used by bounded-concurrency mode, matching typical provider rate limits.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Courtesy pause between items in sequential mode.
pub const DEFAULT_ITEM_DELAY_MS: u64 = 1000;

/// Top level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Root of the result store; each stage gets its own subdirectory
  pub cache_dir:                PathBuf,
  /// Root of the output ledgers; each stage gets its own subdirectory
  pub ledger_dir:               PathBuf,
  /// Days before a cached result expires
  pub cache_ttl_days:           u32,
  /// Characters of the body text that participate in the fingerprint
  pub fingerprint_prefix_chars: usize,
  /// Worker count for bounded-concurrency mode
  pub concurrency:              usize,
  /// Pause between items in sequential mode, in milliseconds
  pub item_delay_ms:            u64,
  /// When false, stages emit records built from the raw input without calling a model
  pub use_ai:                   bool,
  /// Optional label set offered to the classifier
  pub categories:               Vec<String>,
  /// Which model provider to talk to
  pub provider:                 ProviderConfig,
  /// Retry behaviour of the analysis stage
  pub analysis_retry:           RetryPolicy,
  /// Retry behaviour of the classification stage
  pub classification_retry:     RetryPolicy,
}

impl Default for Config {
  fn default() -> Self {
    let data_dir = Self::default_data_path();
    Self {
      cache_dir:                data_dir.join("cache"),
      ledger_dir:               data_dir.join("ledgers"),
      cache_ttl_days:           DEFAULT_CACHE_TTL_DAYS,
      fingerprint_prefix_chars: DEFAULT_PREFIX_CHARS,
      concurrency:              DEFAULT_CONCURRENCY,
      item_delay_ms:            DEFAULT_ITEM_DELAY_MS,
      use_ai:                   true,
      categories:               Vec::new(),
      provider:                 ProviderConfig::default(),
      analysis_retry:           RetryPolicy::default(),
      classification_retry:     RetryPolicy::exponential(3, Duration::from_secs(2))
        .with_timeout(Duration::from_secs(60)),
    }
  }
}

/// Model provider selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
  /// The vendor implementation to build
  pub kind:        ProviderKind,
  /// Model name; the vendor default is used when absent
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model:       Option<String>,
  /// Endpoint root; the vendor default is used when absent
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_url:    Option<String>,
  /// Environment variable holding the API key; the vendor default is used when absent
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key_env: Option<String>,
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self { kind: ProviderKind::Zhipu, model: None, base_url: None, api_key_env: None }
  }
}

impl ProviderConfig {
  /// Creates a provider section for `kind` with all vendor defaults.
  pub fn new(kind: ProviderKind) -> Self { Self { kind, ..Self::default() } }

  /// The model that will be requested.
  pub fn model(&self) -> &str { self.model.as_deref().unwrap_or_else(|| self.kind.default_model()) }

  /// The endpoint root that will be used.
  pub fn base_url(&self) -> &str {
    self.base_url.as_deref().unwrap_or_else(|| self.kind.default_base_url())
  }

  /// The environment variable the API key is read from, if the vendor needs one.
  pub fn api_key_env(&self) -> Option<&str> {
    self.api_key_env.as_deref().or_else(|| self.kind.default_api_key_env())
  }
}

/// Secrets resolved from the environment at startup.
#[derive(Clone, Default)]
pub struct Credentials {
  /// Bearer token for the provider, when it needs one
  pub api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials").field("api_key", &self.api_key.as_ref().map(|_| "***")).finish()
  }
}

impl Credentials {
  /// Credentials carrying the given key.
  pub fn with_api_key(api_key: impl Into<String>) -> Self { Self { api_key: Some(api_key.into()) } }
}

impl Config {
  /// Returns the default location of the configuration file.
  ///
  /// The path is constructed as follows:
  /// - On Unix: `~/.config/digester/config.toml`
  /// - On macOS: `~/Library/Application Support/digester/config.toml`
  /// - On Windows: `%APPDATA%\digester\config.toml`
  /// - Fallback: `./digester/config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR).join("config.toml")
  }

  /// Returns the default root for caches and ledgers.
  pub fn default_data_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
  }

  /// Reads a configuration file.
  ///
  /// # Errors
  ///
  /// Returns an error if the file cannot be read, is not valid TOML, or holds invalid values.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
  }

  /// Writes this configuration, creating parent directories as needed.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;
    info!("Saved configuration to {}", path.display());
    Ok(())
  }

  /// Rejects values no batch could run with.
  pub fn validate(&self) -> Result<()> {
    if self.concurrency == 0 {
      return Err(DigesterError::Config("concurrency must be at least 1".to_string()));
    }
    if self.fingerprint_prefix_chars == 0 {
      return Err(DigesterError::Config("fingerprint_prefix_chars must be at least 1".to_string()));
    }
    for (name, policy) in
      [("analysis_retry", &self.analysis_retry), ("classification_retry", &self.classification_retry)]
    {
      if policy.max_attempts == 0 {
        return Err(DigesterError::Config(format!("{name}.max_attempts must be at least 1")));
      }
      if policy.timeout_secs == 0 {
        return Err(DigesterError::Config(format!("{name}.timeout_secs must be at least 1")));
      }
    }
    Ok(())
  }

  /// Reads the provider API key from the environment.
  ///
  /// This is the only place the crate consults the process environment. Providers that need no key
  /// (a local Ollama) and configurations with `use_ai = false` always succeed.
  ///
  /// # Errors
  ///
  /// Returns [`DigesterError::MissingCredentials`] when the key variable is unset or empty.
  pub fn resolve_credentials(&self) -> Result<Credentials> {
    if !self.use_ai {
      return Ok(Credentials::default());
    }
    match self.provider.api_key_env() {
      None => Ok(Credentials::default()),
      Some(var) => match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(Credentials::with_api_key(key.trim())),
        _ => Err(DigesterError::MissingCredentials(var.to_string())),
      },
    }
  }

  /// Cache expiration as a duration.
  pub fn cache_ttl(&self) -> chrono::Duration { chrono::Duration::days(i64::from(self.cache_ttl_days)) }

  /// Sequential-mode inter-item pause as a duration.
  pub fn item_delay(&self) -> Duration { Duration::from_millis(self.item_delay_ms) }

  /// Sets the result store root.
  pub fn with_cache_dir(mut self, path: impl AsRef<Path>) -> Self {
    self.cache_dir = path.as_ref().to_path_buf();
    self
  }

  /// Sets the ledger root.
  pub fn with_ledger_dir(mut self, path: impl AsRef<Path>) -> Self {
    self.ledger_dir = path.as_ref().to_path_buf();
    self
  }

  /// Sets the provider section.
  pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
    self.provider = provider;
    self
  }

  /// Enables or disables model calls.
  pub fn with_ai(mut self, use_ai: bool) -> Self {
    self.use_ai = use_ai;
    self
  }

  /// Sets the worker count for bounded-concurrency mode.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// Sets the sequential-mode inter-item pause.
  pub fn with_item_delay(mut self, delay: Duration) -> Self {
    self.item_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    self
  }
}
