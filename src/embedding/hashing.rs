use super::Embedder;
use crate::error::EmbeddingError;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

/// Offline feature-hashing embedder.
///
/// Each lowercased word is hashed into one of `dimension` buckets with a hash-derived
/// sign, so texts sharing words point in similar directions. Deterministic across runs
/// and machines. Text without words embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder { dimension: dimension.max(1) }
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; self.dimension];

        for word in text.unicode_words() {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        Ok(vector)
    }
}
