//! In-memory BM25 inverted index.
//!
//! Document frequencies are exact at all times: removing a chunk retracts its
//! terms from every posting list, so a deleted chunk never influences scores.
//! Ties on score are broken by insertion order (lower sequence number first).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use ragdb_core::config::LexicalConfig;
use ragdb_core::storage::{load_json, save_json};
use ragdb_core::types::{ChunkId, SearchHit, SourceKind};

use crate::analyzer::{AnalysisSettings, Analyzer};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    len: u32,
    terms: HashMap<String, u32>,
}

/// On-disk form. Posting lists are derived and rebuilt on load.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    analysis: AnalysisSettings,
    next_seq: u64,
    entries: HashMap<ChunkId, Entry>,
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    analyzer: Analyzer,
    k1: f32,
    b: f32,
    next_seq: u64,
    total_len: u64,
    entries: HashMap<ChunkId, Entry>,
    postings: HashMap<String, HashSet<ChunkId>>,
}

impl LexicalIndex {
    pub fn new(config: &LexicalConfig) -> Self {
        Self {
            analyzer: Analyzer::new(AnalysisSettings::from(config)),
            k1: config.k1,
            b: config.b,
            next_seq: 0,
            total_len: 0,
            entries: HashMap::new(),
            postings: HashMap::new(),
        }
    }

    /// Load the index saved at `path`, or an empty one if nothing is there.
    /// BM25 parameters come from `config`; analysis settings come from the
    /// saved index.
    pub fn load(path: &Path, config: &LexicalConfig) -> Result<Self> {
        let Some(snapshot) = load_json::<Snapshot>(path)? else {
            return Ok(Self::new(config));
        };
        if snapshot.analysis != AnalysisSettings::from(config) {
            tracing::warn!(
                path = %path.display(),
                "lexical analysis settings differ from configuration; keeping the settings the index was built with"
            );
        }
        let mut index = Self {
            analyzer: Analyzer::new(snapshot.analysis),
            k1: config.k1,
            b: config.b,
            next_seq: snapshot.next_seq,
            total_len: 0,
            entries: HashMap::new(),
            postings: HashMap::new(),
        };
        for (id, entry) in snapshot.entries {
            index.insert_entry(id, entry);
        }
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            analysis: AnalysisSettings,
            next_seq: u64,
            entries: &'a HashMap<ChunkId, Entry>,
        }
        save_json(
            path,
            &SnapshotRef { analysis: self.analyzer.settings(), next_seq: self.next_seq, entries: &self.entries },
        )
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Index `text` under `id`, replacing any previous entry. Returns the
    /// insertion sequence number used for tie-breaking.
    pub fn add(&mut self, id: &str, text: &str) -> u64 {
        self.remove(id);
        let tokens = self.analyzer.tokens(text);
        let mut terms: HashMap<String, u32> = HashMap::new();
        for t in &tokens {
            *terms.entry(t.clone()).or_default() += 1;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let len = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
        self.insert_entry(id.to_string(), Entry { seq, len, terms });
        seq
    }

    fn insert_entry(&mut self, id: ChunkId, entry: Entry) {
        for term in entry.terms.keys() {
            self.postings.entry(term.clone()).or_default().insert(id.clone());
        }
        self.total_len += u64::from(entry.len);
        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.entries.insert(id, entry);
    }

    /// Remove `id` and retract its terms. Returns false if it was not indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        for term in entry.terms.keys() {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_len -= u64::from(entry.len);
        true
    }

    /// Top `k` chunks by BM25 score for `query`. Only chunks sharing at least
    /// one term with the query are returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let mut query_terms = self.analyzer.tokens(query);
        query_terms.sort();
        query_terms.dedup();

        let n = self.entries.len() as f32;
        let avg_len = (self.total_len as f32 / n).max(1.0);
        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in &query_terms {
            let Some(ids) = self.postings.get(term) else { continue };
            let df = ids.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for id in ids {
                let Some(entry) = self.entries.get(id) else { continue };
                let tf = entry.terms.get(term).copied().unwrap_or(0) as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * entry.len as f32 / avg_len);
                *scores.entry(id.as_str()).or_default() += idf * tf * (self.k1 + 1.0) / (tf + norm);
            }
        }

        let mut ranked: Vec<(&str, f32, u64)> = scores
            .into_iter()
            .filter_map(|(id, score)| self.entries.get(id).map(|e| (id, score, e.seq)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.2.cmp(&b.2)));
        ranked.truncate(k);
        ranked
            .into_iter()
            .map(|(id, score, _)| SearchHit { id: id.to_string(), score, source: SourceKind::Lexical })
            .collect()
    }

    /// Number of indexed chunks containing the analyzed form of `word`.
    pub fn doc_freq(&self, word: &str) -> usize {
        self.analyzer
            .tokens(word)
            .first()
            .and_then(|t| self.postings.get(t))
            .map_or(0, HashSet::len)
    }

    pub fn seq(&self, id: &str) -> Option<u64> {
        self.entries.get(id).map(|e| e.seq)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> HashSet<ChunkId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
