//! Content hashing for duplicate suppression.
//!
//! Dedup keys are derived from what a node *says*, not from where it came
//! from: two sources delivering the same text produce the same key.
//!
//! # Algorithm
//!
//! 1. Normalize the searchable text: trim and collapse every whitespace run
//!    to a single space.
//! 2. Texts of `min_text_len` characters or fewer are not hashed; they are
//!    too short to identify content reliably.
//! 3. Hash the first `prefix_chars` characters of the normalized text with
//!    SHA-256 and hex-encode the digest.
//!
//! ```rust
//! use sync_harness_core::hash::ContentHasher;
//!
//! let hasher = ContentHasher::default();
//! let a = hasher.hash("Quarterly planning notes.   Budget is approved for the new region.");
//! let b = hasher.hash("Quarterly planning notes. Budget is approved for the new region.");
//! assert_eq!(a, b);
//! assert!(hasher.hash("too short").is_none());
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Node, PreparedNode};

pub const DEFAULT_MIN_TEXT_LEN: usize = 50;
pub const DEFAULT_PREFIX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    pub min_text_len: usize,
    pub prefix_chars: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            min_text_len: DEFAULT_MIN_TEXT_LEN,
            prefix_chars: DEFAULT_PREFIX_CHARS,
        }
    }
}

impl ContentHasher {
    pub fn new(min_text_len: usize, prefix_chars: usize) -> Self {
        Self {
            min_text_len,
            prefix_chars,
        }
    }

    /// Hash `text`, or `None` when it is too short to deduplicate on.
    pub fn hash(&self, text: &str) -> Option<String> {
        let normalized = normalize(text);
        if normalized.chars().count() <= self.min_text_len {
            return None;
        }
        let prefix: String = normalized.chars().take(self.prefix_chars).collect();
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Hash a node's searchable text.
    pub fn hash_node(&self, node: &Node) -> Option<String> {
        node.searchable_text.as_deref().and_then(|t| self.hash(t))
    }

    pub fn prepare(&self, node: Node) -> PreparedNode {
        let content_hash = self.hash_node(&node);
        PreparedNode { node, content_hash }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str =
        "The deployment runbook covers rollback, canary analysis, and the on-call escalation path.";

    #[test]
    fn short_text_is_not_hashed() {
        let hasher = ContentHasher::default();
        assert!(hasher.hash("").is_none());
        assert!(hasher.hash(&"a".repeat(50)).is_none());
        assert!(hasher.hash(&"a".repeat(51)).is_some());
    }

    #[test]
    fn whitespace_is_normalized() {
        let hasher = ContentHasher::default();
        let spaced = LONG.replace(' ', " \n\t ");
        assert_eq!(hasher.hash(LONG), hasher.hash(&spaced));
    }

    #[test]
    fn only_prefix_contributes() {
        let hasher = ContentHasher::new(10, 40);
        let a = format!("{} tail one", LONG);
        let b = format!("{} tail two", LONG);
        assert_eq!(hasher.hash(&a), hasher.hash(&b));

        let full = ContentHasher::new(10, 10_000);
        assert_ne!(full.hash(&a), full.hash(&b));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let hash = ContentHasher::default().hash(LONG).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn threshold_counts_chars_not_bytes() {
        let hasher = ContentHasher::new(5, 500);
        // six multi-byte chars
        assert!(hasher.hash("éééééé").is_some());
        assert!(hasher.hash("ééééé").is_none());
    }

    #[test]
    fn prepare_attaches_hash() {
        let hasher = ContentHasher::default();
        let prepared = hasher.prepare(Node::new("n1", "document").with_text(LONG));
        assert_eq!(prepared.content_hash, hasher.hash(LONG));
        let bare = hasher.prepare(Node::new("p1", "person"));
        assert!(bare.content_hash.is_none());
    }
}
