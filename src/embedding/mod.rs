//! Embedding providers.
//!
//! The engine only sees the [`Embedder`] capability. Providers report failures as
//! [`EmbeddingError`]; whether a failure becomes a zero vector or an error is decided
//! by the knowledge base, not here.

mod hashing;
mod remote;
#[cfg(feature = "bert")]
mod bert;

use crate::error::EmbeddingError;
use std::sync::Arc;

pub use hashing::HashingEmbedder;
pub use remote::{DEFAULT_TIMEOUT, RemoteEmbedder};
#[cfg(feature = "bert")]
pub use bert::BertEmbedder;

/// Turns text into a fixed-length vector.
///
/// Every vector returned by one provider instance has length [`dimension`](Embedder::dimension).
pub trait Embedder: Send + Sync {
    /// Short human readable identifier, used in logs.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text)
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text)
    }
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text)
    }
}

/// Checks that a provider honoured its declared dimension.
pub(crate) fn check_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::Dimension { expected, actual: vector.len() });
    }
    Ok(vector)
}
