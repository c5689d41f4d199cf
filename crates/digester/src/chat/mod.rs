//! The language model capability and its vendor implementations.
//!
//! Stages only ever see `Arc<dyn Chat>`; which vendor sits behind it is decided once by [`build`]
//! from the [`ProviderConfig`] and the resolved [`Credentials`]. Adding a vendor means adding a
//! [`ProviderKind`] variant and a match arm there.
//!
//! Implementations classify their failures into [`ErrorKind`]s so the retry executor and the batch
//! runner can decide what to do without knowing the vendor:
//!
//! | Condition                       | Kind        |
//! |---------------------------------|-------------|
//! | 401, 403, 404                   | `Fatal`     |
//! | 408, 429, 5xx, network failures | `Transient` |
//! | Unparseable response body       | `Transient` |
//! | No content in a 200 response    | `Transient` |

use std::str::FromStr;

use reqwest::{StatusCode, Url};

use super::{
  config::{Credentials, ProviderConfig},
  retry::{call_with_retry, RetryPolicy},
  *,
};

pub mod ollama;
pub mod openai;

pub use ollama::Ollama;
pub use openai::OpenAiCompatible;

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  /// `system`, `user` or `assistant`
  pub role:    String,
  /// The text of the turn
  pub content: String,
}

impl Message {
  /// A system prompt.
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: "system".to_string(), content: content.into() }
  }

  /// A user turn.
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".to_string(), content: content.into() }
  }
}

/// Something that answers a conversation with text.
#[async_trait]
pub trait Chat: Send + Sync {
  /// Sends `messages` and returns the assistant's reply.
  async fn chat(&self, messages: &[Message]) -> Result<String, CallError>;

  /// Short description for logs, e.g. `zhipu/GLM-4.5-Air`.
  fn name(&self) -> String;
}

/// Supported model vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  /// A local or remote Ollama server
  Ollama,
  /// Zhipu AI's OpenAI-compatible endpoint
  Zhipu,
  /// Volcengine Ark (Doubao) OpenAI-compatible endpoint
  Doubao,
  /// OpenAI itself
  #[serde(rename = "openai")]
  OpenAi,
}

impl ProviderKind {
  /// Every supported vendor.
  pub const ALL: [ProviderKind; 4] = [Self::Ollama, Self::Zhipu, Self::Doubao, Self::OpenAi];

  /// Model requested when the configuration names none.
  pub fn default_model(&self) -> &'static str {
    match self {
      Self::Ollama => "llama3.2:3b",
      Self::Zhipu => "GLM-4.5-Air",
      Self::Doubao => "doubao-1-5-pro-32k-250115",
      Self::OpenAi => "gpt-4o-mini",
    }
  }

  /// Endpoint root used when the configuration names none.
  pub fn default_base_url(&self) -> &'static str {
    match self {
      Self::Ollama => "http://localhost:11434/",
      Self::Zhipu => "https://open.bigmodel.cn/api/paas/v4/",
      Self::Doubao => "https://ark.cn-beijing.volces.com/api/v3/",
      Self::OpenAi => "https://api.openai.com/v1/",
    }
  }

  /// Environment variable holding the API key, if the vendor needs one.
  pub fn default_api_key_env(&self) -> Option<&'static str> {
    match self {
      Self::Ollama => None,
      Self::Zhipu => Some("ZHIPUAI_API_KEY"),
      Self::Doubao => Some("ARK_API_KEY"),
      Self::OpenAi => Some("OPENAI_API_KEY"),
    }
  }

  /// Lowercase name as used in configuration files.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ollama => "ollama",
      Self::Zhipu => "zhipu",
      Self::Doubao => "doubao",
      Self::OpenAi => "openai",
    }
  }
}

impl Display for ProviderKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProviderKind {
  type Err = DigesterError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL.into_iter().find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| {
      let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
      DigesterError::Config(format!("Unknown provider '{s}', expected one of {}", known.join(", ")))
    })
  }
}

/// Builds the chat implementation selected by `provider`.
///
/// # Errors
///
/// Fails if the base url is invalid or the vendor needs an API key that `credentials` lacks.
pub fn build(provider: &ProviderConfig, credentials: &Credentials) -> Result<Arc<dyn Chat>> {
  let base_url = parse_base_url(provider.base_url())?;
  let chat: Arc<dyn Chat> = match provider.kind {
    ProviderKind::Ollama => Arc::new(Ollama::new(base_url, provider.model())?),
    kind => {
      let api_key = credentials.api_key.clone().ok_or_else(|| {
        DigesterError::MissingCredentials(provider.api_key_env().unwrap_or("API key").to_string())
      })?;
      Arc::new(OpenAiCompatible::new(kind, base_url, api_key, provider.model())?)
    },
  };
  info!("Using model {}", chat.name());
  Ok(chat)
}

/// Parses an endpoint root, making sure relative joins append to it.
fn parse_base_url(raw: &str) -> Result<Url> {
  let mut raw = raw.trim().to_string();
  if !raw.ends_with('/') {
    raw.push('/');
  }
  Url::parse(&raw).map_err(|e| DigesterError::Config(format!("Invalid base url '{raw}': {e}")))
}

/// Maps a non-success HTTP status to a call error.
pub(crate) fn status_error(status: StatusCode, body: &str) -> CallError {
  let detail: String = body.chars().take(200).collect();
  let message = format!("HTTP {status}: {detail}");
  match status.as_u16() {
    401 | 403 | 404 => CallError::fatal(message),
    _ => CallError::transient(message),
  }
}

/// Stands in for a model when calls are disabled; every call fails fatally.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl Chat for Disabled {
  async fn chat(&self, _messages: &[Message]) -> Result<String, CallError> {
    Err(CallError::fatal("model calls are disabled"))
  }

  fn name(&self) -> String { "disabled".to_string() }
}

/// Applies a [`RetryPolicy`] to every call of an inner [`Chat`].
///
/// The batch runner retries on its own; this wrapper is for callers that talk to a model directly.
pub struct Retrying {
  /// The wrapped implementation
  inner:  Arc<dyn Chat>,
  /// How calls are retried
  policy: RetryPolicy,
}

impl Retrying {
  /// Wraps `inner` with `policy`.
  pub fn new(inner: Arc<dyn Chat>, policy: RetryPolicy) -> Self { Self { inner, policy } }
}

#[async_trait]
impl Chat for Retrying {
  async fn chat(&self, messages: &[Message]) -> Result<String, CallError> {
    let inner = &self.inner;
    call_with_retry(&self.policy, move |_| inner.chat(messages)).await
  }

  fn name(&self) -> String { self.inner.name() }
}
