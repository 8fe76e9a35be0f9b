use super::{Embedder, check_dimension};
use crate::error::EmbeddingError;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;
use tracing::info;

/// Local sentence embeddings from a BERT checkpoint on the Hugging Face hub.
///
/// Mean pooling over the attention mask followed by L2 normalization.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

fn model_error(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Model(e.to_string())
}

fn mean_pooling(hidden_states: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask_expanded = attention_mask
        .unsqueeze(2)?
        .broadcast_as(hidden_states.shape())?
        .to_dtype(hidden_states.dtype())?;
    let sum_embeddings = (hidden_states * &mask_expanded)?.sum(1)?;
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
    sum_embeddings.broadcast_div(&sum_mask)
}

fn l2_normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    tensor.broadcast_div(&norm.clamp(1e-12, f64::MAX)?)
}

impl BertEmbedder {
    /// Downloads (or reuses the cached) weights of `model_id` and checks that the model
    /// really produces `dimension`-wide vectors.
    pub fn from_hub(model_id: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        let device = Device::cuda_if_available(0).map_err(model_error)?;

        let api = Api::new().map_err(model_error)?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let tokenizer_path = repo.get("tokenizer.json").map_err(model_error)?;
        let config_path = repo.get("config.json").map_err(model_error)?;
        let weights_path = repo.get("model.safetensors").map_err(model_error)?;

        let raw_config = std::fs::read_to_string(config_path).map_err(model_error)?;
        let config: Config = serde_json::from_str(&raw_config).map_err(model_error)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(model_error)?;

        // SAFETY: the cached weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(model_error)?
        };
        let model = BertModel::load(vb, &config).map_err(model_error)?;

        let embedder = BertEmbedder {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimension,
        };
        embedder.embed("dimension probe")?;

        info!(model = model_id, dimension, "bert embedder loaded");
        Ok(embedder)
    }

    fn forward(&self, ids: &[u32], mask: &[u32]) -> candle_core::Result<Vec<f32>> {
        let ids = Tensor::from_vec(ids.to_vec(), (1, ids.len()), &self.device)?;
        let mask = Tensor::from_vec(mask.to_vec(), (1, mask.len()), &self.device)?;
        let type_ids = ids.zeros_like()?;

        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;
        let pooled = mean_pooling(&hidden, &mask)?;
        l2_normalize(&pooled)?.get(0)?.to_vec1()
    }
}

impl Embedder for BertEmbedder {
    fn name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding = self.tokenizer.encode(text, true).map_err(model_error)?;
        let vector = self
            .forward(encoding.get_ids(), encoding.get_attention_mask())
            .map_err(model_error)?;
        check_dimension(vector, self.dimension)
    }
}
