use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{Encoding, Tokenizer, TruncationParams};

/// A padded batch of encodings, each tensor shaped `[batch, seq]`.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Truncate every encoding to `max_len` tokens and leave padding to
/// [`pad_batch`], which pads only up to the longest sequence in a batch.
pub fn configure(tokenizer: &mut Tokenizer, max_len: usize) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("failed to configure truncation: {e}"))?;
    tokenizer.with_padding(None);
    Ok(())
}

pub fn encode_texts(tokenizer: &Tokenizer, texts: &[String]) -> Result<Vec<Encoding>> {
    texts
        .iter()
        .map(|t| tokenizer.encode(t.as_str(), true).map_err(|e| anyhow!("tokenization failed: {e}")))
        .collect()
}

pub fn encode_pairs(tokenizer: &Tokenizer, query: &str, passages: &[String]) -> Result<Vec<Encoding>> {
    passages
        .iter()
        .map(|p| tokenizer.encode((query, p.as_str()), true).map_err(|e| anyhow!("tokenization failed: {e}")))
        .collect()
}

pub fn pad_batch(encodings: &[Encoding], pad_id: u32, device: &Device) -> Result<EncodedBatch> {
    let batch = encodings.len();
    let seq = encodings.iter().map(Encoding::len).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(batch * seq);
    let mut types = Vec::with_capacity(batch * seq);
    let mut mask = Vec::with_capacity(batch * seq);
    for enc in encodings {
        let pad = seq - enc.len();
        ids.extend_from_slice(enc.get_ids());
        ids.extend(std::iter::repeat(pad_id).take(pad));
        types.extend_from_slice(enc.get_type_ids());
        types.extend(std::iter::repeat(0).take(pad));
        mask.extend_from_slice(enc.get_attention_mask());
        mask.extend(std::iter::repeat(0).take(pad));
    }
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, (batch, seq), device)?,
        type_ids: Tensor::from_vec(types, (batch, seq), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, seq), device)?,
    })
}
