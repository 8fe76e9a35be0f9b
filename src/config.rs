//! Runtime configuration: an optional TOML file, then `KNOWDB_*` environment overrides.

use crate::{
    chunker::DEFAULT_WINDOW_SIZE,
    embedding::{DEFAULT_TIMEOUT, Embedder, HashingEmbedder, RemoteEmbedder},
    error::{KbError, Result},
    knowledge::EmbeddingFallback,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::info;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_EMBEDDING_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Hashing,
    Remote,
    Bert,
}

impl std::str::FromStr for ProviderKind {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(ProviderKind::Hashing),
            "remote" => Ok(ProviderKind::Remote),
            "bert" => Ok(ProviderKind::Bert),
            other => Err(KbError::Config(format!("unknown embedding provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub dimension: usize,
    pub url: String,
    /// Name of the environment variable holding the bearer token, not the token itself.
    pub token_env: Option<String>,
    pub timeout_secs: u64,
    pub model_id: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: ProviderKind::default(),
            dimension: DEFAULT_DIMENSION,
            url: DEFAULT_EMBEDDING_URL.to_string(),
            token_env: Some("HF_TOKEN".to_string()),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

impl EmbeddingConfig {
    /// Builds the configured provider. The caller owns it and lends it to knowledge bases.
    pub fn build(&self) -> Result<Arc<dyn Embedder>> {
        info!(provider = ?self.provider, dimension = self.dimension, "building embedder");
        match self.provider {
            ProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(self.dimension))),
            ProviderKind::Remote => {
                let timeout = Duration::from_secs(self.timeout_secs.max(1));
                let mut embedder = RemoteEmbedder::new(self.url.clone(), self.dimension, timeout)?;
                if let Some(token) = self.token_env.as_deref().and_then(|var| std::env::var(var).ok()) {
                    embedder = embedder.with_token(token);
                }
                Ok(Arc::new(embedder))
            }
            ProviderKind::Bert => self.build_bert(),
        }
    }

    #[cfg(feature = "bert")]
    fn build_bert(&self) -> Result<Arc<dyn Embedder>> {
        let embedder = crate::embedding::BertEmbedder::from_hub(&self.model_id, self.dimension)?;
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "bert"))]
    fn build_bert(&self) -> Result<Arc<dyn Embedder>> {
        Err(KbError::Config(
            "the bert provider needs knowdb built with the `bert` feature".to_string(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub window_size: usize,
    pub top_k: usize,
    pub embedding_fallback: EmbeddingFallback,
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("knowledge"),
            window_size: DEFAULT_WINDOW_SIZE,
            top_k: DEFAULT_TOP_K,
            embedding_fallback: EmbeddingFallback::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Reads `path` if given (defaults otherwise) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| KbError::storage(path, e))?;
        toml::from_str(&raw)
            .map_err(|e| KbError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Applies `KNOWDB_*` overrides, reading variables through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("KNOWDB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("KNOWDB_WINDOW_SIZE") {
            self.window_size = parse_number("KNOWDB_WINDOW_SIZE", &value)?;
        }
        if let Some(value) = lookup("KNOWDB_TOP_K") {
            self.top_k = parse_number("KNOWDB_TOP_K", &value)?;
        }
        if let Some(value) = lookup("KNOWDB_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(url) = lookup("KNOWDB_EMBEDDING_URL") {
            self.embedding.url = url;
        }
        if let Some(value) = lookup("KNOWDB_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_number("KNOWDB_EMBEDDING_DIMENSION", &value)?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| KbError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod config_test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.window_size, 500);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.embedding_fallback, EmbeddingFallback::Reject);
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding.timeout_secs, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/tmp/kb"
            embedding_fallback = "zero-vector"

            [embedding]
            provider = "remote"
            dimension = 768
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.embedding_fallback, EmbeddingFallback::ZeroVector);
        assert_eq!(config.embedding.provider, ProviderKind::Remote);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.window_size, 500);
        assert_eq!(config.embedding.url, DEFAULT_EMBEDDING_URL);
    }

    #[test]
    fn test_from_file_and_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "top_k = 9\n").unwrap();
        assert_eq!(Config::from_file(&good).unwrap().top_k, 9);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "top_k = \"many\"\n").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(KbError::Config(_))));

        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(KbError::Storage { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("KNOWDB_DATA_DIR", "/data/kb"),
            ("KNOWDB_WINDOW_SIZE", "200"),
            ("KNOWDB_TOP_K", " 3 "),
            ("KNOWDB_EMBEDDING_PROVIDER", "Remote"),
            ("KNOWDB_EMBEDDING_DIMENSION", "16"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/data/kb"));
        assert_eq!(config.window_size, 200);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding.provider, ProviderKind::Remote);
        assert_eq!(config.embedding.dimension, 16);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "KNOWDB_TOP_K").then(|| "-1".to_string())
        });
        assert!(matches!(result, Err(KbError::Config(_))));

        let result = config.apply_overrides(|key| {
            (key == "KNOWDB_EMBEDDING_PROVIDER").then(|| "magic".to_string())
        });
        assert!(matches!(result, Err(KbError::Config(_))));
    }

    #[test]
    fn test_build_hashing_embedder() {
        let config = EmbeddingConfig { dimension: 12, ..EmbeddingConfig::default() };
        let embedder = config.build().unwrap();
        assert_eq!(embedder.dimension(), 12);
        assert_eq!(embedder.name(), "hashing");
    }

    #[cfg(not(feature = "bert"))]
    #[test]
    fn test_bert_without_feature_is_a_config_error() {
        let config = EmbeddingConfig { provider: ProviderKind::Bert, ..EmbeddingConfig::default() };
        assert!(matches!(config.build(), Err(KbError::Config(_))));
    }
}
