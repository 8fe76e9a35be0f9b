use super::{Embedder, check_dimension};
use crate::error::EmbeddingError;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Bound on a single embedding request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Feature-extraction endpoints answer with one vector, or a batch of one.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

/// Blocking client for a hosted feature-extraction endpoint
/// (Hugging Face inference API style).
///
/// Sends `{"inputs": text, "options": {"wait_for_model": true}}` and expects a JSON
/// array of floats back.
pub struct RemoteEmbedder {
    client: Client,
    url: String,
    token: Option<String>,
    dimension: usize,
}

impl RemoteEmbedder {
    pub fn new(url: impl Into<String>, dimension: usize, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(RemoteEmbedder {
            client,
            url: url.into(),
            token: None,
            dimension,
        })
    }

    /// Sends `token` as a bearer credential with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str {
        &self.url
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut request = self.client
            .post(&self.url)
            .json(&json!({ "inputs": text, "options": { "wait_for_model": true } }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::Status { status: status.as_u16(), body });
        }

        let body: serde_json::Value = response.json()?;
        let vector = parse_embedding(body, self.dimension)?;
        debug!(url = %self.url, dimension = vector.len(), "remote embedding received");
        Ok(vector)
    }
}

fn parse_embedding(body: serde_json::Value, dimension: usize) -> Result<Vec<f32>, EmbeddingError> {
    let parsed: EmbeddingResponse = serde_json::from_value(body)
        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

    let vector = match parsed {
        EmbeddingResponse::Single(vector) => vector,
        EmbeddingResponse::Batch(mut batch) => {
            if batch.len() != 1 {
                return Err(EmbeddingError::InvalidResponse(
                    format!("expected one embedding, got {}", batch.len()),
                ));
            }
            batch.remove(0)
        }
    };

    check_dimension(vector, dimension)
}
