//! Fingerprint keyed result cache with lazy expiration.
//!
//! Each cached record lives in its own `<fingerprint>.json` file under the store directory, wrapped
//! in a [`CacheEntry`] carrying the time it was written. Entries older than the store's TTL are
//! removed the next time someone asks for them, or in bulk by [`ResultStore::clear_expired`].
//!
//! The store never fails an operation that a batch depends on: unreadable or corrupt entries are
//! removed and reported as misses, and write failures are logged and reported as `false`.

use glob::{glob, Pattern};

use super::{atomic::write_atomic, fingerprint::Fingerprint, *};

/// A cached record and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<R> {
  /// The key this entry is stored under
  pub fingerprint:     Fingerprint,
  /// Id of the item the record was computed for
  pub work_item_id:    String,
  /// Title of the item the record was computed for
  pub work_item_title: String,
  /// When the record was written
  pub cached_at:       DateTime<Utc>,
  /// The stage output
  pub result:          R,
}

/// Just enough of an entry to judge its age.
#[derive(Deserialize)]
struct EntryHeader {
  /// When the entry was written
  cached_at: DateTime<Utc>,
}

/// Summary of the store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
  /// Entry files present
  pub file_count:    usize,
  /// Entries still within the TTL
  pub valid:         usize,
  /// Entries past the TTL or unreadable
  pub expired_count: usize,
  /// Combined size of all entry files in bytes
  pub total_bytes:   u64,
}

impl StoreStats {
  /// Size in mebibytes, for display.
  pub fn size_mib(&self) -> f64 { self.total_bytes as f64 / (1024.0 * 1024.0) }
}

/// A directory of cached stage results.
#[derive(Debug, Clone)]
pub struct ResultStore {
  /// Directory holding the entry files
  dir:          PathBuf,
  /// Maximum entry age
  ttl:          chrono::Duration,
  /// Body characters hashed into fingerprints
  prefix_chars: usize,
}

impl ResultStore {
  /// Opens (creating if needed) a store rooted at `dir`.
  ///
  /// # Errors
  ///
  /// Fails if the directory cannot be created.
  pub fn open(dir: impl AsRef<Path>, ttl: chrono::Duration) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir)?;
    debug!("Opened result store at {} (ttl {} days)", dir.display(), ttl.num_days());
    Ok(Self { dir, ttl, prefix_chars: crate::fingerprint::DEFAULT_PREFIX_CHARS })
  }

  /// Changes how many body characters participate in fingerprints.
  pub fn with_prefix_chars(mut self, prefix_chars: usize) -> Self {
    self.prefix_chars = prefix_chars;
    self
  }

  /// The store directory.
  pub fn dir(&self) -> &Path { &self.dir }

  /// The key `item` is cached under.
  pub fn fingerprint(&self, item: &WorkItem) -> Fingerprint { Fingerprint::of(item, self.prefix_chars) }

  /// Where the entry for `fingerprint` lives.
  pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
    self.dir.join(format!("{fingerprint}.json"))
  }

  /// Returns the cached record for `item` if one exists and has not expired.
  ///
  /// Expired and corrupt entries are deleted on the way out.
  pub async fn get<R: DeserializeOwned>(&self, item: &WorkItem) -> Option<R> {
    let fingerprint = self.fingerprint(item);
    let path = self.entry_path(&fingerprint);

    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        trace!("Cache miss for {}", item.id);
        return None;
      },
      Err(e) => {
        warn!("Could not read cache entry {}: {e}", path.display());
        return None;
      },
    };

    let entry: CacheEntry<R> = match serde_json::from_slice(&bytes) {
      Ok(entry) => entry,
      Err(e) => {
        warn!("Discarding corrupt cache entry {}: {e}", path.display());
        self.remove(&path).await;
        return None;
      },
    };

    if entry.fingerprint != fingerprint {
      warn!("Discarding cache entry {} stored under the wrong key", path.display());
      self.remove(&path).await;
      return None;
    }

    if self.is_expired(entry.cached_at) {
      info!("Cache entry for {} expired (cached {})", item.id, entry.cached_at);
      self.remove(&path).await;
      return None;
    }

    debug!("Cache hit for {}", item.id);
    Some(entry.result)
  }

  /// Caches `result` for `item`, replacing any earlier entry.
  ///
  /// Returns whether the entry was written.
  pub async fn put<R: Serialize>(&self, item: &WorkItem, result: &R) -> bool {
    self.put_at(item, result, Utc::now()).await
  }

  /// Caches `result` as if it had been written at `cached_at`.
  pub(crate) async fn put_at<R: Serialize>(
    &self,
    item: &WorkItem,
    result: &R,
    cached_at: DateTime<Utc>,
  ) -> bool {
    let fingerprint = self.fingerprint(item);
    let path = self.entry_path(&fingerprint);
    let entry = CacheEntry {
      fingerprint,
      work_item_id: item.id.clone(),
      work_item_title: item.title.clone(),
      cached_at,
      result,
    };

    let bytes = match serde_json::to_vec_pretty(&entry) {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!("Could not serialize cache entry for {}: {e}", item.id);
        return false;
      },
    };
    match write_atomic(&path, &bytes).await {
      Ok(()) => {
        debug!("Cached result for {}", item.id);
        true
      },
      Err(e) => {
        warn!("Could not write cache entry {}: {e}", path.display());
        false
      },
    }
  }

  /// Deletes every expired or unreadable entry, returning how many were removed.
  pub async fn clear_expired(&self) -> usize {
    let mut removed = 0;
    for path in self.entry_files() {
      if !matches!(self.inspect(&path).await, Some((_, true))) {
        continue;
      }
      if self.remove(&path).await {
        removed += 1;
      }
    }
    info!("Removed {removed} expired entries from {}", self.dir.display());
    removed
  }

  /// Deletes every entry, returning how many were removed.
  pub async fn clear_all(&self) -> usize {
    let mut removed = 0;
    for path in self.entry_files() {
      if self.remove(&path).await {
        removed += 1;
      }
    }
    info!("Removed {removed} entries from {}", self.dir.display());
    removed
  }

  /// Counts entries by state and totals their size.
  pub async fn stats(&self) -> StoreStats {
    let mut stats = StoreStats::default();
    for path in self.entry_files() {
      let Some((size, expired)) = self.inspect(&path).await else { continue };
      stats.file_count += 1;
      stats.total_bytes += size;
      if expired {
        stats.expired_count += 1;
      } else {
        stats.valid += 1;
      }
    }
    stats
  }

  /// Size of an entry and whether it counts as expired; `None` if it vanished.
  async fn inspect(&self, path: &Path) -> Option<(u64, bool)> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let expired = match serde_json::from_slice::<EntryHeader>(&bytes) {
      Ok(header) => self.is_expired(header.cached_at),
      Err(_) => true,
    };
    Some((bytes.len() as u64, expired))
  }

  /// Whether an entry written at `cached_at` is past the TTL.
  fn is_expired(&self, cached_at: DateTime<Utc>) -> bool { Utc::now() - cached_at > self.ttl }

  /// All `*.json` files directly under the store directory.
  fn entry_files(&self) -> Vec<PathBuf> {
    let pattern = format!("{}/*.json", Pattern::escape(&self.dir.to_string_lossy()));
    match glob(&pattern) {
      Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
      Err(e) => {
        warn!("Could not list {}: {e}", self.dir.display());
        Vec::new()
      },
    }
  }

  /// Deletes one entry file, tolerating it already being gone.
  async fn remove(&self, path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
      Ok(()) => true,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
      Err(e) => {
        warn!("Could not remove {}: {e}", path.display());
        false
      },
    }
  }
}
