//! # knowdb - a small retrieval-augmented knowledge base
//!
//! knowdb stores chunks of text under the SHA-256 of their trimmed content, keeps one
//! embedding per chunk in a paired vector store, and answers free-text queries with the
//! top-k chunks by cosine similarity. Documents are split into sentence-aligned chunks
//! before they are stored.
//!
//! Embeddings come from any [`Embedder`]: the offline [`HashingEmbedder`], a hosted
//! feature-extraction endpoint ([`RemoteEmbedder`]) or, with the `bert` feature, a local
//! BERT model.
//!
//! ## Example
//!
//! ```
//! use knowdb::{HashingEmbedder, KnowledgeBase};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut kb = KnowledgeBase::open(dir.path(), HashingEmbedder::new(128));
//!
//! kb.add_item("Paris is the capital of France.", 0.0).unwrap();
//! kb.add_item("Rust has no garbage collector.", 0.0).unwrap();
//!
//! let results = kb.search("capital of France", 1).unwrap();
//! assert_eq!(results[0].text, "Paris is the capital of France.");
//! ```

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod item;
pub mod knowledge;
pub mod server;
pub mod store;
pub mod vector;

pub use chunker::{Chunker, chunk};
pub use config::Config;
pub use embedding::{Embedder, HashingEmbedder, RemoteEmbedder};
#[cfg(feature = "bert")]
pub use embedding::BertEmbedder;
pub use error::{EmbeddingError, KbError, Result, VectorError};
pub use item::{KnowledgeItem, content_hash};
pub use knowledge::{EmbeddingFallback, KnowledgeBase};
pub use store::{KvStore, StoreState};
