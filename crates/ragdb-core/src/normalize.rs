//! Converts uploaded bytes into one normalized text stream per document.
//!
//! Plain text and markdown are decoded directly (markdown syntax is stripped),
//! PDFs go through `pdf-extract` with an optional OCR fallback for scans.
//! Output paragraphs are separated by a single blank line and contain no
//! hard line wraps, runs of spaces, or control characters.

use std::path::Path;
use std::sync::Arc;

use crate::error::IngestionError;
use crate::traits::OcrEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl SourceFormat {
    pub fn detect(filename: &str, bytes: &[u8]) -> Result<Self, IngestionError> {
        if bytes.starts_with(b"%PDF-") {
            return Ok(Self::Pdf);
        }
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "md" | "markdown" | "mdown" => Ok(Self::Markdown),
            "txt" | "text" | "log" | "csv" | "" => Ok(Self::PlainText),
            other if looks_textual(bytes) => {
                tracing::debug!(extension = other, "treating unknown extension as plain text");
                Ok(Self::PlainText)
            }
            other => Err(IngestionError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

fn looks_textual(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(4096)];
    !sample.contains(&0) && std::str::from_utf8(sample).is_ok()
}

#[derive(Default, Clone)]
pub struct Normalizer {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Normalize one uploaded file. An empty result is returned as-is; the
    /// caller decides that an empty document is a failure.
    pub fn normalize(&self, bytes: &[u8], filename: &str) -> Result<String, IngestionError> {
        let raw = match SourceFormat::detect(filename, bytes)? {
            SourceFormat::PlainText => decode_text(bytes),
            SourceFormat::Markdown => strip_markdown(&decode_text(bytes)),
            SourceFormat::Pdf => self.extract_pdf(bytes, filename)?,
        };
        Ok(normalize_text(&raw))
    }

    fn extract_pdf(&self, bytes: &[u8], filename: &str) -> Result<String, IngestionError> {
        // pdf-extract panics on some malformed inputs.
        let extracted = match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(filename, error = %e, "pdf text extraction failed");
                String::new()
            }
            Err(_) => {
                tracing::warn!(filename, "pdf text extraction panicked");
                String::new()
            }
        };
        if !extracted.trim().is_empty() {
            return Ok(extracted);
        }
        match &self.ocr {
            Some(ocr) => {
                tracing::info!(filename, "no text layer found, falling back to OCR");
                ocr.recognize_pdf(bytes)
                    .map_err(|e| IngestionError::Normalization(format!("OCR failed: {e}")))
            }
            None => Err(IngestionError::Normalization("no extractable text in PDF".into())),
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Collapse layout noise: unify line endings, drop control characters, re-join
/// words hyphenated across line breaks, unwrap hard-wrapped lines, and separate
/// paragraphs with exactly one blank line.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n").replace('\u{c}', "\n\n");
    let cleaned: String = unified
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect();
    let dehyphenated = join_hyphenated(&cleaned);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in dehyphenated.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(collapsed);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

fn join_hyphenated(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' && chars.peek() == Some(&'\n') && out.chars().last().is_some_and(char::is_alphabetic) {
            let mut lookahead = chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|n| n.is_lowercase()) {
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Reduce markdown to prose. Code block contents are kept as text.
pub fn strip_markdown(raw: &str) -> String {
    let mut out = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") || is_rule(trimmed) {
            out.push(String::new());
            continue;
        }
        let mut body = trimmed;
        while let Some(rest) = body.strip_prefix('>') {
            body = rest.trim_start();
        }
        let heading = body.trim_start_matches('#');
        if heading.len() != body.len() && (heading.is_empty() || heading.starts_with(' ')) {
            body = heading.trim_start();
        }
        for marker in ["- ", "* ", "+ "] {
            if let Some(rest) = body.strip_prefix(marker) {
                body = rest;
                break;
            }
        }
        out.push(strip_inline(body));
    }
    out.join("\n")
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-') || compact.chars().all(|c| c == '*') || compact.chars().all(|c| c == '_'))
}

/// Replace `[text](url)` and `![alt](url)` with their text and drop emphasis
/// and inline-code markers.
fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while !rest.is_empty() {
        let link_start = rest.strip_prefix('!').unwrap_or(rest);
        if link_start.starts_with('[') {
            if let Some((label, after)) = split_link(link_start) {
                out.push_str(label);
                rest = after;
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if !matches!(c, '*' | '`') && !(c == '_' && is_emphasis_underscore(&out, chars.as_str())) {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

fn is_emphasis_underscore(before: &str, after: &str) -> bool {
    let prev_word = before.chars().last().is_some_and(char::is_alphanumeric);
    let next_word = after.chars().next().is_some_and(char::is_alphanumeric);
    !(prev_word && next_word)
}

fn split_link(s: &str) -> Option<(&str, &str)> {
    let close = s.find("](")?;
    let label = &s[1..close];
    if label.contains('[') {
        return None;
    }
    let after_paren = &s[close + 2..];
    let end = after_paren.find(')')?;
    Some((label, &after_paren[end + 1..]))
}
