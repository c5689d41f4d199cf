//! Write-then-rename file replacement.

use std::sync::atomic::{AtomicU64, Ordering};

use super::*;

/// Distinguishes temporary files of concurrent writers within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replaces `path` with `contents` so that readers see either the old file or the new one in full.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
  let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
  let temp = path.with_file_name(format!(
    ".{file_name}.{}.{}.tmp",
    std::process::id(),
    TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
  ));

  tokio::fs::write(&temp, contents).await?;
  if let Err(e) = tokio::fs::rename(&temp, path).await {
    let _ = tokio::fs::remove_file(&temp).await;
    return Err(e);
  }
  trace!("Replaced {}", path.display());
  Ok(())
}
