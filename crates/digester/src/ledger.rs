//! Incremental, upsert-by-id output artifacts.
//!
//! A ledger holds one JSON array of records per [`LedgerKey`], stored at
//! `<root>/<stage>/<date>.json`. Every successful item is upserted immediately: the artifact is read,
//! any record with the same id is dropped, the new record is appended, and the whole array is written
//! to a temporary file and renamed into place. A process killed at any moment therefore leaves either
//! the previous artifact or the new one, never a torn file.
//!
//! Upserts to the same artifact are serialized by an async lock keyed by the artifact's canonical
//! path. The lock table is process-wide, so separately opened ledgers over one root cannot lose each
//! other's writes.

use lazy_static::lazy_static;
use tokio::sync::Mutex as AsyncMutex;

use super::{atomic::write_atomic, stage::Record, *};

/// Identifies one ledger artifact: a stage and the batch date it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
  /// Stage name, e.g. `analyze`
  stage: String,
  /// Batch date, e.g. `2024-01-02`
  date:  String,
}

impl LedgerKey {
  /// Creates a key.
  pub fn new(stage: impl Into<String>, date: impl Into<String>) -> Self {
    Self { stage: stage.into(), date: date.into() }
  }

  /// The stage component.
  pub fn stage(&self) -> &str { &self.stage }

  /// The date component.
  pub fn date(&self) -> &str { &self.date }
}

impl Display for LedgerKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.stage, self.date)
  }
}

lazy_static! {
  /// One async lock per artifact written by this process.
  static ref LOCKS: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>> = Mutex::new(HashMap::new());
}

/// Root directory of all ledger artifacts.
#[derive(Debug, Clone)]
pub struct Ledger {
  /// Directory containing one subdirectory per stage
  root:      PathBuf,
  /// `root` with links and relative components resolved, used to key locks
  lock_root: PathBuf,
}

impl Ledger {
  /// Opens (creating if needed) a ledger rooted at `root`.
  ///
  /// # Errors
  ///
  /// Fails if the directory cannot be created or resolved.
  pub fn open(root: impl AsRef<Path>) -> Result<Self> {
    let root = root.as_ref().to_path_buf();
    std::fs::create_dir_all(&root)?;
    let lock_root = std::fs::canonicalize(&root)?;
    debug!("Opened ledger at {}", root.display());
    Ok(Self { root, lock_root })
  }

  /// The root directory.
  pub fn root(&self) -> &Path { &self.root }

  /// Where the artifact for `key` lives.
  pub fn path(&self, key: &LedgerKey) -> PathBuf {
    self.root.join(&key.stage).join(format!("{}.json", key.date))
  }

  /// Reads every record stored under `key`. A missing artifact is an empty ledger.
  ///
  /// # Errors
  ///
  /// Returns [`DigesterError::CorruptLedger`] when the artifact exists but is not a list of records.
  pub async fn load<R: Record>(&self, key: &LedgerKey) -> Result<Vec<R>> {
    let path = self.path(key);
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| DigesterError::CorruptLedger {
      path:   path.display().to_string(),
      reason: e.to_string(),
    })
  }

  /// Ids already present under `key`.
  pub async fn ids<R: Record>(&self, key: &LedgerKey) -> Result<HashSet<String>> {
    Ok(self.load::<R>(key).await?.iter().map(|r| r.id().to_string()).collect())
  }

  /// Inserts `record`, replacing any record with the same id, and persists the result atomically.
  ///
  /// Returns the number of records in the artifact afterwards.
  pub async fn upsert<R: Record>(&self, key: &LedgerKey, record: &R) -> Result<usize> {
    let lock = self.lock_for(key);
    let _guard = lock.lock().await;

    let mut records = self.load::<R>(key).await?;
    let before = records.len();
    records.retain(|r| r.id() != record.id());
    if records.len() != before {
      debug!("Replacing {} in {key}", record.id());
    }
    records.push(record.clone());

    let path = self.path(key);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(&path, &serde_json::to_vec_pretty(&records)?).await?;
    trace!("{key} now holds {} records", records.len());
    Ok(records.len())
  }

  /// Dates with an artifact for `stage`, oldest first.
  pub async fn dates(&self, stage: &str) -> Result<Vec<String>> {
    let dir = self.root.join(stage);
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    let mut dates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        if !stem.starts_with('.') {
          dates.push(stem.to_string());
        }
      }
    }
    dates.sort();
    Ok(dates)
  }

  /// The async lock guarding `key`, created on first use.
  fn lock_for(&self, key: &LedgerKey) -> Arc<AsyncMutex<()>> {
    let path = self.lock_root.join(&key.stage).join(format!("{}.json", key.date));
    let mut locks = LOCKS.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    locks.entry(path).or_default().clone()
  }
}
