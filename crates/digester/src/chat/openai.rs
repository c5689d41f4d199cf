//! Client for OpenAI-compatible `chat/completions` endpoints (Zhipu, Doubao, OpenAI).

use reqwest::Url;

use super::{status_error, *};

/// Body of a completion request.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
  /// Model to run
  model:       &'a str,
  /// Conversation so far
  messages:    &'a [Message],
  /// Sampling temperature
  temperature: f64,
  /// Always false; the whole reply is awaited
  stream:      bool,
}

/// The parts of a completion response this client reads.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
  /// Alternative replies; only the first is used
  #[serde(default)]
  choices: Vec<Choice>,
}

/// One alternative reply.
#[derive(Debug, Deserialize)]
struct Choice {
  /// The generated turn
  message: ChoiceMessage,
}

/// A generated turn whose content may be null.
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
  /// Reply text
  #[serde(default)]
  content: Option<String>,
}

impl CompletionResponse {
  /// Text of the first choice, treating absence as an empty reply.
  fn into_text(self) -> Result<String, CallError> {
    self.choices.into_iter().next().and_then(|c| c.message.content).ok_or_else(CallError::empty)
  }
}

/// A vendor speaking the OpenAI chat completions protocol.
#[derive(Clone)]
pub struct OpenAiCompatible {
  /// Which vendor this is, for logs
  kind:     ProviderKind,
  /// Shared HTTP connection pool
  client:   reqwest::Client,
  /// Full url of the completions endpoint
  endpoint: Url,
  /// Bearer token
  api_key:  String,
  /// Model to run
  model:    String,
}

impl std::fmt::Debug for OpenAiCompatible {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OpenAiCompatible")
      .field("kind", &self.kind)
      .field("endpoint", &self.endpoint.as_str())
      .field("model", &self.model)
      .finish_non_exhaustive()
  }
}

impl OpenAiCompatible {
  /// Creates a client for `model` at `base_url`.
  ///
  /// # Errors
  ///
  /// Fails if the completions endpoint cannot be derived from `base_url`.
  pub fn new(
    kind: ProviderKind,
    base_url: Url,
    api_key: impl Into<String>,
    model: impl Into<String>,
  ) -> Result<Self> {
    let endpoint = base_url
      .join("chat/completions")
      .map_err(|e| DigesterError::Config(format!("Invalid base url '{base_url}': {e}")))?;
    Ok(Self {
      kind,
      client: reqwest::Client::new(),
      endpoint,
      api_key: api_key.into(),
      model: model.into(),
    })
  }

  /// The completions endpoint requests are sent to.
  pub fn endpoint(&self) -> &Url { &self.endpoint }
}

#[async_trait]
impl Chat for OpenAiCompatible {
  async fn chat(&self, messages: &[Message]) -> Result<String, CallError> {
    let request = CompletionRequest { model: &self.model, messages, temperature: 0.3, stream: false };
    let response = self
      .client
      .post(self.endpoint.clone())
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(status_error(status, &body));
    }

    let body: CompletionResponse = response.json().await?;
    body.into_text()
  }

  fn name(&self) -> String { format!("{}/{}", self.kind, self.model) }
}
