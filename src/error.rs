//! Error types shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

/// Failures of the vector math helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error("Cannot normalize an empty vector")]
    Empty,

    #[error("Cannot normalize a zero vector")]
    ZeroNorm,

    #[error("Different dimensions: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Failures reported by an [`Embedder`](crate::embedding::Embedder).
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding has dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("model error: {0}")]
    Model(String),
}

#[derive(Error, Debug)]
pub enum KbError {
    #[error("storage error at '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode or decode store '{}': {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot add an empty knowledge item")]
    EmptyText,

    #[error("config error: {0}")]
    Config(String),
}

impl KbError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KbError::Storage { path: path.into(), source }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, source: bincode::Error) -> Self {
        KbError::Codec { path: path.into(), source }
    }

    /// True when the backing files could not be read or written.
    pub fn is_storage(&self) -> bool {
        matches!(self, KbError::Storage { .. } | KbError::Codec { .. })
    }
}
