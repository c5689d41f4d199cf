//! Stable content keys for work items.
//!
//! A fingerprint is the lowercase hex SHA-256 of the item's id, its title and the first
//! [`DEFAULT_PREFIX_CHARS`] characters of its body, joined with NUL separators. It depends on nothing
//! but those inputs, so it is identical across processes and restarts.
//!
//! Only a prefix of the body is hashed. Two versions of a paper that differ solely after the prefix
//! share a fingerprint and therefore a cached result; the prefix length is configurable for callers
//! that cannot accept that.
//!
//! # Examples
//!
//! ```
//! use digester::{fingerprint::Fingerprint, WorkItem};
//!
//! let a = WorkItem::new("2401.00001", "Title", "Body");
//! let b = a.clone().with_url("https://example.org");
//! assert_eq!(Fingerprint::of(&a, 100), Fingerprint::of(&b, 100));
//! assert_eq!(Fingerprint::of(&a, 100).as_str().len(), 64);
//! ```

use sha2::{Digest, Sha256};

use super::*;

/// Number of body characters hashed by default.
pub const DEFAULT_PREFIX_CHARS: usize = 100;

/// Hex encoded SHA-256 content key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Fingerprints `item` hashing at most `prefix_chars` characters of its body.
  pub fn of(item: &WorkItem, prefix_chars: usize) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(item.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(item.title.as_bytes());
    hasher.update([0u8]);
    hasher.update(char_prefix(&item.summary, prefix_chars).as_bytes());
    Self(format!("{:x}", hasher.finalize()))
  }

  /// Accepts a string only if it looks like a fingerprint (64 lowercase hex digits).
  pub fn parse(s: &str) -> Option<Self> {
    (s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
      .then(|| Self(s.to_string()))
  }

  /// The hex digest.
  pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// Fingerprints `item` with the default prefix length.
pub fn fingerprint(item: &WorkItem) -> Fingerprint { Fingerprint::of(item, DEFAULT_PREFIX_CHARS) }

/// The first `n` characters of `s`, never splitting a code point.
fn char_prefix(s: &str, n: usize) -> &str {
  match s.char_indices().nth(n) {
    Some((end, _)) => &s[..end],
    None => s,
  }
}
