//! Splits normalized document text into overlapping, bounded passages.
//!
//! A token here is a whitespace-delimited word. Chunks hold between
//! `min_tokens` and `max_tokens` tokens (the last chunk of a document may be
//! shorter) and consecutive chunks share exactly `overlap_tokens` tokens.
//! Cuts prefer the sentence or paragraph boundary nearest the budget within
//! `boundary_tolerance` tokens and fall back to a hard cut at `max_tokens`.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{chunk_id, Chunk, Span};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// How far below `max_tokens` a boundary may be to be preferred over a hard cut.
    pub boundary_tolerance: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { min_tokens: 400, max_tokens: 800, overlap_tokens: 100, boundary_tolerance: 120 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.max_tokens must be positive".into()));
        }
        if self.min_tokens > self.max_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.min_tokens ({}) exceeds max_tokens ({})",
                self.min_tokens, self.max_tokens
            )));
        }
        if self.overlap_tokens >= self.min_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_tokens ({}) must be smaller than min_tokens ({})",
                self.overlap_tokens, self.min_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    None,
    Sentence,
    Paragraph,
}

#[derive(Debug, Clone, Copy)]
struct WordToken {
    start: usize,
    end: usize,
    boundary: Boundary,
}

/// Number of word tokens in `text`, the unit every budget in this crate uses.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

fn scan_tokens(text: &str) -> Vec<WordToken> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(WordToken { start: s, end: i, boundary: Boundary::None });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(WordToken { start: s, end: text.len(), boundary: Boundary::None });
    }
    let count = tokens.len();
    for i in 0..count {
        let word = &text[tokens[i].start..tokens[i].end];
        let gap = match tokens.get(i + 1) {
            Some(next) => &text[tokens[i].end..next.start],
            None => "",
        };
        tokens[i].boundary = if gap.matches('\n').count() >= 2 {
            Boundary::Paragraph
        } else if ends_sentence(word) {
            Boundary::Sentence
        } else {
            Boundary::None
        };
    }
    tokens
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
    trimmed.ends_with(['.', '!', '?', '\u{3002}'])
}

pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Lazily yields the chunks of `text`. Calling this again (or cloning the
    /// iterator) restarts from the beginning. Whitespace-only text yields nothing.
    pub fn chunks<'a>(&'a self, document_id: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks {
            config: &self.config,
            document_id,
            text,
            tokens: scan_tokens(text),
            cursor: 0,
            ordinal: 0,
            done: false,
        }
    }
}

#[derive(Clone)]
pub struct Chunks<'a> {
    config: &'a ChunkingConfig,
    document_id: &'a str,
    text: &'a str,
    tokens: Vec<WordToken>,
    cursor: usize,
    ordinal: usize,
    done: bool,
}

impl Chunks<'_> {
    /// Token index one past the last token of the chunk starting at `start`.
    fn cut_point(&self, start: usize) -> usize {
        let total = self.tokens.len();
        let max = self.config.max_tokens;
        if total - start <= max {
            return total;
        }
        let hard = start + max;
        let low = (start + self.config.min_tokens).max(hard.saturating_sub(self.config.boundary_tolerance));
        (low..=hard)
            .rev()
            .find(|&end| end > start && self.tokens[end - 1].boundary != Boundary::None)
            .unwrap_or(hard)
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done || self.cursor >= self.tokens.len() {
            return None;
        }
        let start = self.cursor;
        let end = self.cut_point(start);
        let char_span = Span::new(self.tokens[start].start, self.tokens[end - 1].end);
        let chunk = Chunk {
            id: chunk_id(self.document_id, self.ordinal),
            document_id: self.document_id.to_string(),
            ordinal: self.ordinal,
            text: self.text[char_span.start..char_span.end].to_string(),
            token_count: end - start,
            char_span,
            token_span: Span::new(start, end),
        };
        self.ordinal += 1;
        if end >= self.tokens.len() {
            self.done = true;
        } else {
            self.cursor = end - self.config.overlap_tokens;
        }
        Some(chunk)
    }
}
