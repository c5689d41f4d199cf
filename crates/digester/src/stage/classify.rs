//! Topic classification of analysed papers.
//!
//! The model answers with the category on its first line followed by a markdown write-up. The
//! category line is accepted with heading marks, bold or a trailing colon, all of which are stripped.

use super::{Message, Record, Stage, NOT_MENTIONED, *};

/// Category used when the model's first line is empty.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Confidence recorded for every model classification.
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// A category line longer than this means the model ignored the answer format.
const MAX_CATEGORY_CHARS: usize = 60;

/// The classification of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
  /// Id of the classified paper
  pub paper_id:      String,
  /// Title of the classified paper
  pub title:         String,
  /// Assigned category
  pub category:      String,
  /// How sure the classifier is, between 0 and 1
  pub confidence:    f32,
  /// Markdown write-up of the paper
  pub markdown:      String,
  /// When the classification was produced
  pub classified_at: DateTime<Utc>,
}

impl Record for Classification {
  fn id(&self) -> &str { &self.paper_id }
}

impl Classification {
  /// Counts papers per category, ordered by category name.
  pub fn tally(records: &[Classification]) -> BTreeMap<String, usize> {
    records.iter().fold(BTreeMap::new(), |mut counts, record| {
      *counts.entry(record.category.clone()).or_insert(0) += 1;
      counts
    })
  }

  /// A markdown overview of a day's classifications, largest category first.
  pub fn summary_markdown(date: &str, records: &[Classification]) -> String {
    let mut counts: Vec<_> = Self::tally(records).into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut out = format!("# Paper digest for {date}\n\n{} papers\n", records.len());
    for (category, count) in counts {
      out.push_str(&format!("\n## {category} ({count})\n\n"));
      for record in records.iter().filter(|r| r.category == category) {
        out.push_str(&format!("- {} ({})\n", record.title, record.paper_id));
      }
    }
    out
  }
}

/// The classification stage.
#[derive(Debug, Clone, Default)]
pub struct Classify {
  /// Labels offered to the model; free-form when empty
  categories: Vec<String>,
}

impl Classify {
  /// Stage name used for ledgers and caches.
  pub const NAME: &'static str = "classify";

  /// Creates a stage that lets the model choose its own labels.
  pub fn new() -> Self { Self::default() }

  /// Restricts the model to `categories`.
  pub fn with_categories(mut self, categories: Vec<String>) -> Self {
    self.categories = categories;
    self
  }

  /// The write-up used when the model gave only a category.
  fn stub_markdown(item: &WorkItem, category: &str) -> String {
    let function = if item.summary.trim().is_empty() { NOT_MENTIONED } else { item.summary.trim() };
    format!(
      "# {}\n\n**Category**: {category}\n\n**Link**: {}\n\n**Model Function**: {function}\n",
      item.display_title(),
      item.url()
    )
  }
}

impl Stage for Classify {
  type Output = Classification;

  fn name(&self) -> &'static str { Self::NAME }

  fn messages(&self, item: &WorkItem) -> Vec<Message> {
    let labels = if self.categories.is_empty() {
      "Choose a short topic label of a few words.".to_string()
    } else {
      format!("Choose exactly one of: {}.", self.categories.join(", "))
    };
    vec![
      Message::system(format!(
        "You classify AI research papers by topic. {labels} Put only the category on the first line, \
         then write a short markdown summary of the paper."
      )),
      Message::user(format!(
        "Title: {}\nTranslated title: {}\nLink: {}\nModel function: {}",
        item.title,
        item.display_title(),
        item.url(),
        item.summary.trim()
      )),
    ]
  }

  fn parse(&self, item: &WorkItem, response: &str) -> Result<Classification, CallError> {
    let response = response.trim();
    let (first, rest) = response.split_once('\n').unwrap_or((response, ""));

    let category: String = first.replace(['#', '*', '：', ':'], "").trim().to_string();
    if category.chars().count() > MAX_CATEGORY_CHARS {
      return Err(CallError::malformed(format!(
        "first line of classification for {} is not a category",
        item.id
      )));
    }
    let category = if category.is_empty() { DEFAULT_CATEGORY.to_string() } else { category };

    let body = rest.trim();
    let markdown =
      if body.is_empty() { Self::stub_markdown(item, &category) } else { body.to_string() };

    Ok(Classification {
      paper_id: item.id.clone(),
      title: item.display_title().to_string(),
      category,
      confidence: DEFAULT_CONFIDENCE,
      markdown,
      classified_at: Utc::now(),
    })
  }

  fn fallback(&self, item: &WorkItem) -> Classification {
    let category = self.categories.first().cloned().unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    Classification {
      paper_id:      item.id.clone(),
      title:         item.display_title().to_string(),
      markdown:      Self::stub_markdown(item, &category),
      category,
      confidence:    0.0,
      classified_at: Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item() -> WorkItem { WorkItem::new("2401.00001", "Video Diffusion", "text to video") }

  #[test]
  fn test_parse_strips_decoration() {
    let reply = "## **Video Generation**：\n\n# Video Diffusion\n\nA model that makes videos.";
    let record = Classify::new().parse(&item(), reply).unwrap();
    assert_eq!(record.category, "Video Generation");
    assert_eq!(record.markdown, "# Video Diffusion\n\nA model that makes videos.");
    assert_eq!(record.confidence, DEFAULT_CONFIDENCE);
  }

  #[test]
  fn test_category_only_reply_gets_stub() {
    let record = Classify::new().parse(&item(), "视频生成").unwrap();
    assert_eq!(record.category, "视频生成");
    assert!(record.markdown.contains("**Category**: 视频生成"));
    assert!(record.markdown.contains("text to video"));
  }

  #[test]
  fn test_empty_first_line_uses_default() {
    let record = Classify::new().parse(&item(), "#\nSome body").unwrap();
    assert_eq!(record.category, DEFAULT_CATEGORY);
    assert_eq!(record.markdown, "Some body");
  }

  #[test]
  fn test_rambling_first_line_is_malformed() {
    let reply = "This paper is about many things and I would like to explain each of them in turn before deciding.";
    let err = Classify::new().parse(&item(), reply).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
  }

  #[test]
  fn test_prompt_lists_categories() {
    let stage = Classify::new().with_categories(vec!["Vision".into(), "Audio".into()]);
    assert!(stage.messages(&item())[0].content.contains("Vision, Audio"));
    assert_eq!(stage.fallback(&item()).category, "Vision");
  }

  #[test]
  fn test_tally_and_summary() {
    let stage = Classify::new();
    let records: Vec<_> = [("1", "Vision"), ("2", "Audio"), ("3", "Vision")]
      .into_iter()
      .map(|(id, category)| stage.parse(&WorkItem::new(id, format!("Paper {id}"), ""), category).unwrap())
      .collect();

    let tally = Classification::tally(&records);
    assert_eq!(tally.get("Vision"), Some(&2));
    assert_eq!(tally.get("Audio"), Some(&1));

    let summary = Classification::summary_markdown("2024-01-02", &records);
    assert!(summary.starts_with("# Paper digest for 2024-01-02"));
    assert!(summary.find("## Vision (2)").unwrap() < summary.find("## Audio (1)").unwrap());
    assert!(summary.contains("- Paper 3 (3)"));
  }
}
