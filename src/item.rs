//! Knowledge items and their content-addressed identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The normalized form of a piece of knowledge text.
pub fn normalize_text(text: &str) -> &str {
    text.trim()
}

/// Hex SHA-256 of the normalized text. Identical normalized text always maps to the same hash.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A chunk of knowledge as handed back to callers.
///
/// `score` is caller metadata when stored; search results overwrite it with the
/// cosine similarity of that query, which is never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub text: String,
    pub hash: String,
    pub score: f32,
}

impl KnowledgeItem {
    pub fn new(text: &str, score: f32) -> Self {
        let text = normalize_text(text);
        KnowledgeItem {
            text: text.to_string(),
            hash: content_hash(text),
            score,
        }
    }

    pub(crate) fn from_stored(hash: &str, stored: &StoredChunk) -> Self {
        KnowledgeItem {
            text: stored.text.clone(),
            hash: hash.to_string(),
            score: stored.score,
        }
    }

    pub(crate) fn to_stored(&self) -> StoredChunk {
        StoredChunk { text: self.text.clone(), score: self.score }
    }
}

/// Record persisted in the chunk store, keyed by content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub text: String,
    pub score: f32,
}
