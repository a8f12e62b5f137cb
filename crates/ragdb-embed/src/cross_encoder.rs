//! (query, passage) relevance scoring with a BERT sequence-classification
//! checkpoint: encoder, tanh pooler over `[CLS]`, single-logit classifier.

use anyhow::{anyhow, Result};
use candle_core::{Device, Module};
use candle_nn::{linear, Linear};
use candle_transformers::models::bert::BertModel;
use std::path::Path;
use tokenizers::Tokenizer;

use ragdb_core::traits::Reranker;

use crate::bert::Checkpoint;
use crate::tokenize::{encode_pairs, pad_batch};

pub struct CrossEncoder {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    model_id: String,
}

impl CrossEncoder {
    pub fn load(dir: &Path, max_len: usize) -> Result<Self> {
        let Checkpoint { tokenizer, config, shape, vb, device } = Checkpoint::load(dir, max_len)?;
        let hidden = shape.hidden_size;
        let model = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden, 1, vb.pp("classifier"))?;
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("cross-encoder");
        let model_id = format!("cross-encoder:{name}");
        tracing::info!(model = %model_id, "re-ranker loaded");
        Ok(Self { model, pooler, classifier, tokenizer, device, pad_id: shape.pad_token_id, model_id })
    }
}

impl Reranker for CrossEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = encode_pairs(&self.tokenizer, query, passages)?;
        let batch = pad_batch(&encodings, self.pad_id, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.type_ids, Some(&batch.attention_mask))?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;
        let scores: Vec<f32> = logits.to_device(&Device::Cpu)?.to_vec1()?;
        if scores.len() != passages.len() {
            return Err(anyhow!("re-ranker returned {} scores for {} passages", scores.len(), passages.len()));
        }
        Ok(scores)
    }
}
