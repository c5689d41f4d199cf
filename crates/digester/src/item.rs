//! The unit of work fed through every stage.

use super::*;

/// One paper awaiting processing.
///
/// A work item is built once from the day's input and never changed afterwards; stages only read
/// it. The `id` is unique within a batch and is what ledgers upsert on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
  /// Stable paper identifier, e.g. an arXiv id
  pub id:          String,
  /// Paper title
  pub title:       String,
  /// Body text; only a bounded prefix participates in the fingerprint
  #[serde(default, alias = "abstract")]
  pub summary:     String,
  /// Link to the paper's landing page
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url:         Option<String>,
  /// Translated title, if the input carried one
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub translation: Option<String>,
}

impl WorkItem {
  /// Creates an item with no url or translation.
  pub fn new(id: impl Into<String>, title: impl Into<String>, summary: impl Into<String>) -> Self {
    Self { id: id.into(), title: title.into(), summary: summary.into(), url: None, translation: None }
  }

  /// Sets the landing page url.
  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  /// Sets the translated title.
  pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
    self.translation = Some(translation.into());
    self
  }

  /// The landing page, falling back to the arXiv abstract page for the id.
  pub fn url(&self) -> String {
    self.url.clone().unwrap_or_else(|| format!("https://arxiv.org/abs/{}", self.id))
  }

  /// The translated title if present, otherwise the original title.
  pub fn display_title(&self) -> &str {
    self.translation.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or(&self.title)
  }

  /// Reads a JSON array of items.
  ///
  /// # Errors
  ///
  /// Fails if the file cannot be read or is not an array of items.
  pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let items: Vec<Self> = serde_json::from_str(&content)?;
    debug!("Read {} work items from {}", items.len(), path.as_ref().display());
    Ok(items)
  }
}
