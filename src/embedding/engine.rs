// Local sentence embeddings (BERT family) via Candle
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{Tokenizer, TruncationParams};

use crate::config::EmbedderConfig;

/// Sentence embedding engine: mean pooling over BERT token states
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    normalize: bool,
}

impl EmbeddingEngine {
    /// Load the configured model (downloads it from the HuggingFace Hub on first use)
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(config.model_id.clone(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read model config")?;
        let bert_config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;
        let shape: ModelShape =
            serde_json::from_str(&config_contents).context("Failed to read model hidden size")?;
        let dimension = check_dimension(config.dimension, shape.hidden_size)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the weights file is owned by the hf-hub cache and not mutated while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &bert_config).context("Failed to create BERT model")?;

        tracing::info!(model = %config.model_id, dimension, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
            normalize: config.normalize,
        })
    }

    /// Embed a single text
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("Embedding batch returned no vectors")
    }

    /// Embed several texts in one forward pass
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = texts.len();

        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let row = i * max_len;
            flat_ids[row..row + ids.len()].copy_from_slice(ids);
            flat_mask[row..row + mask.len()].copy_from_slice(mask);
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let mut pooled = Self::mean_pool(&hidden, &attention_mask)?;
        if self.normalize {
            pooled = Self::l2_normalize(&pooled)?;
        }

        Ok(pooled.to_vec2::<f32>()?)
    }

    /// Mean pooling with attention mask
    fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = attention_mask
            .unsqueeze(2)?
            .expand(hidden.shape())?
            .to_dtype(hidden.dtype())?;

        let summed = (hidden * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(summed.broadcast_div(&counts)?)
    }

    fn l2_normalize(embeddings: &Tensor) -> Result<Tensor> {
        let norms = embeddings
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        Ok(embeddings.broadcast_div(&norms)?)
    }

    /// Output vector length (hidden size of the model)
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(serde::Deserialize)]
struct ModelShape {
    hidden_size: usize,
}

/// The model's hidden size decides the vector length; a configured value must agree
fn check_dimension(configured: usize, hidden_size: usize) -> Result<usize> {
    if configured != 0 && configured != hidden_size {
        anyhow::bail!(
            "Embedder configured for {} dimensions but the model produces {}",
            configured,
            hidden_size
        );
    }
    Ok(hidden_size)
}
