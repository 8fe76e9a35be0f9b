//! The knowledge retrieval engine.
//!
//! A knowledge base is a pair of [`KvStore`]s under one directory: the chunk store
//! (`hash -> {text, score}`) and the vector store (`hash -> embedding`). Every
//! mutation goes through both so they stay paired.

use crate::{
    chunker::Chunker,
    embedding::Embedder,
    error::{KbError, Result},
    item::{KnowledgeItem, StoredChunk, normalize_text},
    store::{KvStore, StoreState},
    vector::{dot_product, l2_norm},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const KNOWLEDGE_FILE: &str = "knowledge.db";
pub const VECTOR_FILE: &str = "vectors.db";

const CONTEXT_PREFIX: &str = "Related knowledge: ";

/// What to do when the embedding provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingFallback {
    /// Surface the error; nothing is written.
    #[default]
    Reject,
    /// Log it and use a zero vector. Zero vectors are stored but never ranked.
    ZeroVector,
}

pub struct KnowledgeBase<E> {
    embedder: E,
    chunks: KvStore<StoredChunk>,
    vectors: KvStore<Vec<f32>>,
    fallback: EmbeddingFallback,
}

impl<E: Embedder> KnowledgeBase<E> {
    /// Knowledge base stored in `dir` (`knowledge.db` + `vectors.db`).
    /// Nothing is read or created until first use.
    ///
    /// # Examples
    ///
    /// ```
    /// use knowdb::{HashingEmbedder, KnowledgeBase};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let embedder = HashingEmbedder::new(64);
    /// let mut kb = KnowledgeBase::open(dir.path(), &embedder);
    ///
    /// let item = kb.add_item("  Ferris is the Rust mascot. ", 0.0).unwrap();
    /// assert_eq!(item.text, "Ferris is the Rust mascot.");
    ///
    /// let results = kb.search("rust mascot", 3).unwrap();
    /// assert_eq!(results[0].hash, item.hash);
    /// ```
    pub fn open(dir: impl AsRef<Path>, embedder: E) -> Self {
        let dir = dir.as_ref();
        Self::with_paths(dir.join(KNOWLEDGE_FILE), dir.join(VECTOR_FILE), embedder)
    }

    pub fn with_paths(
        knowledge_path: impl Into<PathBuf>,
        vector_path: impl Into<PathBuf>,
        embedder: E,
    ) -> Self {
        KnowledgeBase {
            embedder,
            chunks: KvStore::open(knowledge_path),
            vectors: KvStore::open(vector_path),
            fallback: EmbeddingFallback::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: EmbeddingFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn knowledge_state(&self) -> StoreState {
        self.chunks.state()
    }

    pub fn vector_state(&self) -> StoreState {
        self.vectors.state()
    }

    /// Embeds, stores and returns `text` under the hash of its normalized form.
    ///
    /// Adding text that is already present re-embeds it and overwrites both
    /// records, score included.
    pub fn add_item(&mut self, text: &str, score: f32) -> Result<KnowledgeItem> {
        let (item, embedding) = self.prepare(text, score)?;
        self.put(item, embedding)
    }

    pub fn get_item(&mut self, hash: &str) -> Result<Option<KnowledgeItem>> {
        Ok(self.chunks.get(hash)?.map(|stored| KnowledgeItem::from_stored(hash, stored)))
    }

    /// Deletes `hash` then adds `text`. The returned item carries the new hash,
    /// which differs from `hash` whenever the text changed.
    ///
    /// The new text is validated and embedded first: if that fails, the old
    /// item is left untouched.
    pub fn update_item(&mut self, hash: &str, text: &str, score: f32) -> Result<KnowledgeItem> {
        let (item, embedding) = self.prepare(text, score)?;
        self.delete_item(hash)?;
        self.put(item, embedding)
    }

    /// Removes `hash` from both stores. Returns `false` if neither held it.
    pub fn delete_item(&mut self, hash: &str) -> Result<bool> {
        let removed_chunk = self.chunks.delete(hash)?;
        let removed_vector = self.vectors.delete(hash)?;

        if removed_chunk != removed_vector {
            warn!(hash, removed_chunk, removed_vector, "knowledge and vector stores were out of sync");
        }
        Ok(removed_chunk || removed_vector)
    }

    /// The `k` stored items most similar to `query`, best first.
    ///
    /// Each result's `score` is its cosine similarity to the query. Equal
    /// similarities keep insertion order. Zero-norm vectors never rank, and
    /// a query that embeds to a zero vector matches nothing.
    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<KnowledgeItem>> {
        if k == 0 || self.vectors.is_empty()? {
            return Ok(Vec::new());
        }
        let k = k.min(self.vectors.len()?);

        let query_vec = match l2_norm(&self.embed(query)?) {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding is degenerate, returning no results");
                return Ok(Vec::new());
            }
        };

        let mut top: Vec<(String, f32)> = Vec::with_capacity(k + 1);
        let mut unranked = 0usize;
        for (hash, vector) in self.vectors.iter()? {
            if !self.chunks.contains_key(hash)? {
                warn!(hash, "vector has no matching chunk, skipping");
                continue;
            }

            let similarity = match l2_norm(vector).and_then(|v| dot_product(&v, &query_vec)) {
                Ok(sim) => sim.clamp(-1.0, 1.0),
                Err(_) => {
                    unranked += 1;
                    continue;
                }
            };

            // insert after any equal score so earlier items win ties
            let at = top.partition_point(|(_, s)| *s >= similarity);
            if at < k {
                top.insert(at, (hash.to_string(), similarity));
                top.truncate(k);
            }
        }

        let mut results = Vec::with_capacity(top.len());
        for (hash, similarity) in top {
            if let Some(stored) = self.chunks.get(&hash)? {
                let mut item = KnowledgeItem::from_stored(&hash, stored);
                item.score = similarity;
                results.push(item);
            }
        }

        debug!(k, results = results.len(), unranked, "search finished");
        Ok(results)
    }

    /// Top-`k` texts for `query` formatted as a prompt fragment,
    /// or an empty string when nothing matches.
    pub fn related_context(&mut self, query: &str, k: usize) -> Result<String> {
        let items = self.search(query, k)?;
        if items.is_empty() {
            return Ok(String::new());
        }

        let texts: Vec<&str> = items.iter().map(|item| item.text.as_str()).collect();
        Ok(format!("{}{}", CONTEXT_PREFIX, texts.join("; ")))
    }

    /// Chunks `text` and adds every chunk in order. Returns the added items.
    pub fn ingest_document(&mut self, text: &str, window_size: usize) -> Result<Vec<KnowledgeItem>> {
        let mut added = Vec::new();
        for chunk in Chunker::new(window_size).chunks(text) {
            if normalize_text(&chunk).is_empty() {
                continue;
            }
            added.push(self.add_item(&chunk, 0.0)?);
        }

        info!(chunks = added.len(), window_size, "document ingested");
        Ok(added)
    }

    /// Every stored item in insertion order, with its stored score.
    pub fn list(&mut self) -> Result<Vec<KnowledgeItem>> {
        Ok(self.chunks
            .iter()?
            .map(|(hash, stored)| KnowledgeItem::from_stored(hash, stored))
            .collect())
    }

    pub fn len(&mut self) -> Result<usize> {
        self.chunks.len()
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        self.chunks.is_empty()
    }

    /// Wipes the chunk store only. Clearing one store without the other leaves
    /// the pair out of sync; callers normally clear both (see [`clear`](Self::clear)).
    pub fn clear_knowledge_db(&mut self) -> Result<()> {
        self.chunks.clear()?;
        info!(path = %self.chunks.path().display(), "knowledge store cleared");
        Ok(())
    }

    /// Wipes the vector store only. Same caveat as [`clear_knowledge_db`](Self::clear_knowledge_db).
    pub fn clear_vector_db(&mut self) -> Result<()> {
        self.vectors.clear()?;
        info!(path = %self.vectors.path().display(), "vector store cleared");
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.clear_knowledge_db()?;
        self.clear_vector_db()
    }

    /// Normalizes, hashes and embeds `text` without touching the stores.
    fn prepare(&self, text: &str, score: f32) -> Result<(KnowledgeItem, Vec<f32>)> {
        if normalize_text(text).is_empty() {
            return Err(KbError::EmptyText);
        }
        let item = KnowledgeItem::new(text, score);
        let embedding = self.embed(&item.text)?;
        Ok((item, embedding))
    }

    /// Writes the vector, then the chunk.
    fn put(&mut self, item: KnowledgeItem, embedding: Vec<f32>) -> Result<KnowledgeItem> {
        self.vectors.set(item.hash.clone(), embedding)?;
        self.chunks.set(item.hash.clone(), item.to_stored())?;

        debug!(hash = %item.hash, chars = item.text.chars().count(), "knowledge item added");
        Ok(item)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let expected = self.embedder.dimension();
        match self.embedder.embed(text) {
            Ok(vector) if vector.len() == expected => Ok(vector),
            Ok(vector) => Err(KbError::DimensionMismatch { expected, actual: vector.len() }),
            Err(e) => match self.fallback {
                EmbeddingFallback::Reject => Err(e.into()),
                EmbeddingFallback::ZeroVector => {
                    warn!(embedder = self.embedder.name(), error = %e, "embedding failed, using zero vector");
                    Ok(vec![0.0; expected])
                }
            },
        }
    }
}
