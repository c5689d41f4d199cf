//! Client for Ollama's `/api/chat` endpoint.
//!
//! No API key is needed, which makes a local Ollama server the cheapest way to run a batch end to
//! end.
//!
//! # Examples
//!
//! ```no_run
//! use digester::chat::{Chat, Message, Ollama};
//! use reqwest::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ollama = Ollama::new(Url::parse("http://localhost:11434/")?, "llama3.2:3b")?;
//! let reply = ollama.chat(&[Message::user("What is the capital of France?")]).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use reqwest::Url;

use super::{status_error, *};

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
  /// Maximum number of tokens to generate
  num_predict: u64,
  /// Top-k sampling parameter
  top_k:       u64,
  /// Top-p (nucleus) sampling parameter
  top_p:       f64,
  /// Temperature for controlling randomness in generation
  temperature: f64,
}

// Summaries should be stable between runs, hence the low temperature.
impl Default for Options {
  fn default() -> Self { Self { num_predict: 4096, top_k: 40, top_p: 0.9, temperature: 0.3 } }
}

/// Body of a chat request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  /// Model to run
  model:    &'a str,
  /// Conversation so far
  messages: &'a [Message],
  /// Always false; the whole reply is awaited
  stream:   bool,
  /// Sampling parameters
  options:  &'a Options,
}

/// The parts of a chat response this client reads.
#[derive(Debug, Deserialize)]
struct ChatResponse {
  /// The generated turn
  message:    Message,
  /// Why generation stopped, when reported
  #[serde(default)]
  done_reason: Option<String>,
  /// Number of generated tokens, when reported
  #[serde(default)]
  eval_count: Option<u64>,
}

/// An Ollama server running one model.
#[derive(Debug, Clone)]
pub struct Ollama {
  /// Shared HTTP connection pool
  client:  reqwest::Client,
  /// Full url of the chat endpoint
  url:     Url,
  /// Model to run
  model:   String,
  /// Sampling parameters
  options: Options,
}

impl Ollama {
  /// Creates a client for the server at `host` running `model`.
  ///
  /// # Errors
  ///
  /// Fails if the chat endpoint cannot be derived from `host`.
  pub fn new(host: Url, model: impl Into<String>) -> Result<Self> {
    let url = host
      .join("api/chat")
      .map_err(|e| DigesterError::Config(format!("Invalid Ollama host '{host}': {e}")))?;
    Ok(Self { client: reqwest::Client::new(), url, model: model.into(), options: Options::default() })
  }

  /// Replaces the sampling parameters.
  pub fn with_options(mut self, options: Options) -> Self {
    self.options = options;
    self
  }

  /// The chat endpoint requests are sent to.
  pub fn url(&self) -> &Url { &self.url }
}

#[async_trait]
impl Chat for Ollama {
  async fn chat(&self, messages: &[Message]) -> Result<String, CallError> {
    let request = ChatRequest { model: &self.model, messages, stream: false, options: &self.options };
    let response = self.client.post(self.url.clone()).json(&request).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(status_error(status, &body));
    }

    let body: ChatResponse = response.json().await?;
    trace!(
      "Ollama finished ({}, {} tokens)",
      body.done_reason.as_deref().unwrap_or("unknown"),
      body.eval_count.unwrap_or_default()
    );
    Ok(body.message.content)
  }

  fn name(&self) -> String { format!("ollama/{}", self.model) }
}
