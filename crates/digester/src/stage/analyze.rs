//! Per-paper analysis: authors, publication date and what the model in the paper does.
//!
//! The model is asked for three labelled lines. Labels are matched in English or Chinese, with or
//! without markdown bold, and with either an ASCII or a full-width colon:
//!
//! ```text
//! **Authors**: Jane Doe, Example University
//! **发表日期**：2024-01-02
//! Model Function: Generates video from text prompts
//! ```

use lazy_static::lazy_static;
use regex::Regex;

use super::{clean_field, Message, Record, Stage, NOT_MENTIONED, *};

lazy_static! {
  /// Matches the authors line.
  static ref AUTHORS: Regex =
    Regex::new(r"(?i)(?:\*\*)?(?:作者团队|authors?)(?:\*\*)?\s*[：:]\s*(?:\*\*)?([^\n\r]+)").unwrap();
  /// Matches the publication date line.
  static ref PUBLISH_DATE: Regex = Regex::new(
    r"(?i)(?:\*\*)?(?:发表日期|发布日期|publication date|publish(?:ed)? date)(?:\*\*)?\s*[：:]\s*(?:\*\*)?([^\n\r]+)"
  )
  .unwrap();
  /// Matches the model function line.
  static ref MODEL_FUNCTION: Regex = Regex::new(
    r"(?i)(?:\*\*)?(?:模型功能|功能描述|model function)(?:\*\*)?\s*[：:]\s*(?:\*\*)?([^\n\r]+)"
  )
  .unwrap();
}

/// The analysis of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
  /// Id of the analysed paper
  pub paper_id:       String,
  /// Landing page of the paper
  pub paper_url:      String,
  /// Original title
  pub title:          String,
  /// Translated title, or the original title when none was supplied
  pub translation:    String,
  /// Author names or affiliations
  pub authors:        String,
  /// Publication date as reported by the model
  pub publish_date:   String,
  /// One line summary of what the paper's model does
  pub model_function: String,
  /// The full reply the fields were extracted from
  #[serde(default)]
  pub page_content:   String,
  /// When the analysis was produced
  pub analyzed_at:    DateTime<Utc>,
}

impl Record for Analysis {
  fn id(&self) -> &str { &self.paper_id }
}

impl From<&Analysis> for WorkItem {
  /// Feeds an analysis into later stages. The body is the model function, which is what
  /// classification is based on.
  fn from(analysis: &Analysis) -> Self {
    WorkItem::new(&analysis.paper_id, &analysis.title, &analysis.model_function)
      .with_url(&analysis.paper_url)
      .with_translation(&analysis.translation)
  }
}

/// The analysis stage.
#[derive(Debug, Clone, Default)]
pub struct Analyze;

impl Analyze {
  /// Stage name used for ledgers and caches.
  pub const NAME: &'static str = "analyze";

  /// Creates the stage.
  pub fn new() -> Self { Self }
}

/// Extracts the first capture of `pattern`, if it has any content.
fn field(pattern: &Regex, text: &str) -> Option<String> {
  pattern.captures(text).map(|c| clean_field(&c[1])).filter(|v| !v.is_empty())
}

impl Stage for Analyze {
  type Output = Analysis;

  fn name(&self) -> &'static str { Self::NAME }

  fn messages(&self, item: &WorkItem) -> Vec<Message> {
    let mut paper = format!("Link: {}\nTitle: {}\n", item.url(), item.title);
    if let Some(translation) = item.translation.as_deref() {
      paper.push_str(&format!("Translated title: {translation}\n"));
    }
    if !item.summary.trim().is_empty() {
      paper.push_str(&format!("Abstract: {}\n", item.summary.trim()));
    }

    vec![
      Message::system(
        "You analyse AI research papers. Answer with exactly these three lines and nothing else:\n\
         **Authors**: <author names or institutions>\n\
         **Publication Date**: <YYYY-MM-DD>\n\
         **Model Function**: <what the proposed model does, in at most 50 words>\n\
         Write \"not mentioned\" for anything the paper does not state. Never leave a field empty.",
      ),
      Message::user(paper),
    ]
  }

  fn parse(&self, item: &WorkItem, response: &str) -> Result<Analysis, CallError> {
    let authors = field(&AUTHORS, response);
    let publish_date = field(&PUBLISH_DATE, response);
    let model_function = field(&MODEL_FUNCTION, response);

    if authors.is_none() && publish_date.is_none() && model_function.is_none() {
      return Err(CallError::malformed(format!(
        "no labelled fields in analysis of {} ({} chars)",
        item.id,
        response.chars().count()
      )));
    }

    let or_missing = |v: Option<String>| v.unwrap_or_else(|| NOT_MENTIONED.to_string());
    Ok(Analysis {
      paper_id:       item.id.clone(),
      paper_url:      item.url(),
      title:          item.title.clone(),
      translation:    item.display_title().to_string(),
      authors:        or_missing(authors),
      publish_date:   or_missing(publish_date),
      model_function: or_missing(model_function),
      page_content:   response.to_string(),
      analyzed_at:    Utc::now(),
    })
  }

  fn fallback(&self, item: &WorkItem) -> Analysis {
    let summary = item.summary.trim();
    Analysis {
      paper_id:       item.id.clone(),
      paper_url:      item.url(),
      title:          item.title.clone(),
      translation:    item.display_title().to_string(),
      authors:        NOT_MENTIONED.to_string(),
      publish_date:   NOT_MENTIONED.to_string(),
      model_function: if summary.is_empty() {
        NOT_MENTIONED.to_string()
      } else {
        summary.chars().take(200).collect()
      },
      page_content:   summary.to_string(),
      analyzed_at:    Utc::now(),
    }
  }
}
