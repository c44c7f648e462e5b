//! In-process sentence embeddings with a BERT-family encoder.
//!
//! Reads `config.json`, `tokenizer.json` and `model.safetensors` from a local
//! model directory (for example a checkout of
//! `sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2`) and produces
//! mean-pooled, L2-normalised vectors on the CPU.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};

use super::embedding::EmbeddingProvider;
use super::error::RagError;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

struct Encoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

pub struct LocalEmbedder {
    model_name: String,
    encoder: Arc<Encoder>,
}

impl LocalEmbedder {
    /// Loads the encoder. Blocking; startup runs it on the blocking pool.
    pub fn load(model_dir: &Path, model_name: &str, max_length: usize) -> Result<Self, RagError> {
        for file in [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE] {
            let path = model_dir.join(file);
            if !path.is_file() {
                return Err(RagError::Model(format!("{} not found", path.display())));
            }
        }

        let encoder = Encoder::load(model_dir, max_length)
            .map_err(|e| RagError::Model(format!("{}: {:#}", model_dir.display(), e)))?;
        tracing::info!(
            "Loaded local embedding model {} from {}",
            model_name,
            model_dir.display()
        );

        Ok(Self {
            model_name: model_name.to_string(),
            encoder: Arc::new(encoder),
        })
    }
}

impl Encoder {
    fn load(model_dir: &Path, max_length: usize) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let config: BertConfig = serde_json::from_str(
            &fs::read_to_string(model_dir.join(CONFIG_FILE)).context("reading config.json")?,
        )
        .context("parsing config.json")?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join(TOKENIZER_FILE))
            .map_err(|e| anyhow::anyhow!("loading tokenizer.json: {}", e))?;
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("configuring truncation: {}", e))?;

        let weights = fs::read(model_dir.join(WEIGHTS_FILE)).context("reading model.safetensors")?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &device)?;
        let model = BertModel::load(vb, &config).context("initialising BERT weights")?;

        tracing::debug!(
            "BERT encoder: hidden_size={}, layers={}",
            config.hidden_size,
            config.num_hidden_layers
        );

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn embed(&self, inputs: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {}", e))?;

        let ids = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let masks = encodings
            .iter()
            .map(|e| Tensor::new(e.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let input_ids = Tensor::stack(&ids, 0)?;
        let attention_mask = Tensor::stack(&masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool(&hidden, &attention_mask)?;
        Ok(l2_normalize(&pooled)?.to_vec2::<f32>()?)
    }
}

/// Mean over non-padding positions.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.unsqueeze(2)?.to_dtype(hidden.dtype())?;
    let sum = hidden.broadcast_mul(&mask)?.sum(1)?;
    let count = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    sum.broadcast_div(&count)
}

fn l2_normalize(vectors: &Tensor) -> candle_core::Result<Tensor> {
    let norm = vectors.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    vectors.broadcast_div(&norm)
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = self.encoder.clone();
        let inputs = inputs.to_vec();
        tokio::task::spawn_blocking(move || encoder.embed(inputs))
            .await
            .map_err(RagError::embedding)?
            .map_err(RagError::embedding)
    }
}
