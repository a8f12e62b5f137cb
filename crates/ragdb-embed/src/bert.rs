//! Sentence embeddings from a local BERT-family checkpoint.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;

use ragdb_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::{configure, encode_texts, pad_batch};

/// The few config.json fields needed outside of `BertModel`.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelShape {
    pub hidden_size: usize,
    #[serde(default)]
    pub pad_token_id: u32,
}

/// Everything loaded from a model directory, shared by the embedder and the
/// cross-encoder.
pub(crate) struct Checkpoint {
    pub tokenizer: Tokenizer,
    pub config: BertConfig,
    pub shape: ModelShape,
    pub vb: VarBuilder<'static>,
    pub device: Device,
}

impl Checkpoint {
    pub fn load(dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        let tokenizer_path = dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))?;
        configure(&mut tokenizer, max_len)?;

        let config_path = dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let shape: ModelShape = serde_json::from_str(&raw)?;

        let vb = load_weights(dir, &device)?;
        Ok(Self { tokenizer, config, shape, vb, device })
    }
}

fn load_weights(dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = dir.join("model.safetensors");
    if safetensors.exists() {
        tracing::debug!(path = %safetensors.display(), "loading safetensors weights");
        // SAFETY: the file is memory-mapped read-only and not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let pytorch = dir.join("pytorch_model.bin");
    if pytorch.exists() {
        tracing::debug!(path = %pytorch.display(), "loading pytorch weights");
        let weights: HashMap<String, candle_core::Tensor> = candle_core::pickle::read_all(&pytorch)?.into_iter().collect();
        return Ok(VarBuilder::from_tensors(weights, DType::F32, device));
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", dir.display()))
}

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    dim: usize,
    max_len: usize,
    model_id: String,
}

impl BertEmbedder {
    pub fn load(dir: &Path, max_len: usize) -> Result<Self> {
        let started = std::time::Instant::now();
        let Checkpoint { tokenizer, config, shape, vb, device } = Checkpoint::load(dir, max_len)?;
        let model = BertModel::load(vb, &config)?;
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("bert");
        let model_id = format!("bert:{name}:d{}", shape.hidden_size);
        tracing::info!(model = %model_id, elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");
        Ok(Self { model, tokenizer, device, pad_id: shape.pad_token_id, dim: shape.hidden_size, max_len, model_id })
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = encode_texts(&self.tokenizer, texts)?;
        let batch = pad_batch(&encodings, self.pad_id, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if vectors.first().is_some_and(|v| v.len() != self.dim) {
            return Err(anyhow!("model produced vectors of unexpected dimension"));
        }
        Ok(vectors)
    }
}
