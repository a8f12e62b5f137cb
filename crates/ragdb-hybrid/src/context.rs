//! Formats selected passages into a bounded, citable prompt fragment.

use std::collections::HashSet;

use ragdb_core::chunker::count_tokens;
use ragdb_core::config::ContextConfig;
use ragdb_core::types::{AssembledContext, Citation, RetrievedPassage, Span};

pub struct ContextAssembler {
    max_tokens: usize,
    dedup_similarity: f32,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig) -> Self {
        Self { max_tokens: config.max_context_tokens, dedup_similarity: config.dedup_similarity }
    }

    /// Passages arrive in relevance order and keep it. Near-duplicates of a
    /// higher-ranked passage are skipped; once the budget is reached the
    /// remaining (lowest-ranked) passages are dropped. A first passage that
    /// alone exceeds the budget is cut to fit.
    pub fn assemble(&self, passages: &[RetrievedPassage]) -> AssembledContext {
        let mut kept: Vec<(&RetrievedPassage, HashSet<String>)> = Vec::new();
        let mut blocks: Vec<String> = Vec::new();
        let mut citations = Vec::new();
        let mut used = 0;

        for passage in passages {
            let words = word_set(&passage.text);
            if kept.iter().any(|(k, kw)| self.is_duplicate(k, kw, passage, &words)) {
                tracing::debug!(chunk = %passage.chunk_id, "dropping near-duplicate passage");
                continue;
            }
            let marker = citations.len() + 1;
            let heading = header(marker, &passage.document_filename, passage.char_span);
            let header_tokens = count_tokens(&heading);
            let body_tokens = count_tokens(&passage.text);

            let (text, span) = if used + header_tokens + body_tokens <= self.max_tokens {
                (passage.text.as_str(), passage.char_span)
            } else if citations.is_empty() && header_tokens < self.max_tokens {
                let cut = truncate_words(&passage.text, self.max_tokens - header_tokens);
                (cut, Span::new(passage.char_span.start, passage.char_span.start + cut.len()))
            } else {
                break;
            };

            // The header shows the span actually included.
            let heading = if span == passage.char_span { heading } else { header(marker, &passage.document_filename, span) };
            used += header_tokens + count_tokens(text);
            blocks.push(format!("{heading}\n{text}"));
            citations.push(Citation {
                marker,
                chunk_id: passage.chunk_id.clone(),
                document_id: passage.document_id.clone(),
                document_filename: passage.document_filename.clone(),
                char_span: span,
            });
            kept.push((passage, words));
        }

        AssembledContext { text: blocks.join("\n\n"), citations, token_count: used }
    }

    fn is_duplicate(
        &self,
        kept: &RetrievedPassage,
        kept_words: &HashSet<String>,
        candidate: &RetrievedPassage,
        words: &HashSet<String>,
    ) -> bool {
        if kept.document_id == candidate.document_id
            && (kept.char_span.contains(&candidate.char_span) || candidate.char_span.contains(&kept.char_span))
        {
            return true;
        }
        jaccard(kept_words, words) >= self.dedup_similarity
    }
}

fn header(marker: usize, filename: &str, span: Span) -> String {
    format!("[{marker}] {filename} (chars {}-{})", span.start, span.end)
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f32 / union as f32
}

/// The prefix of `text` holding its first `n` words.
fn truncate_words(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let mut seen = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                seen += 1;
                if seen == n {
                    return &text[..i];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text
}
