use ragdb_core::config::LexicalConfig;
use ragdb_text::LexicalIndex;
use tempfile::TempDir;

fn index_with(docs: &[(&str, &str)]) -> LexicalIndex {
    let mut index = LexicalIndex::new(&LexicalConfig::default());
    for (id, text) in docs {
        index.add(id, text);
    }
    index
}

#[test]
fn ranks_exact_term_matches_first() {
    let index = index_with(&[
        ("a:0", "Quarterly revenue report: Q3 earnings rose sharply."),
        ("b:0", "Weather forecast for the coming week is mild."),
        ("c:0", "Revenue projections for next year."),
    ]);
    let hits = index.search("Q3 earnings", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a:0");
    assert!(hits[0].score > 0.0);
}

#[test]
fn empty_index_and_stop_word_queries_return_nothing() {
    let empty = LexicalIndex::new(&LexicalConfig::default());
    assert!(empty.search("anything", 5).is_empty());

    let index = index_with(&[("a:0", "the cat sat")]);
    assert!(index.search("the and of", 5).is_empty());
    assert!(index.search("cat", 0).is_empty());
}

#[test]
fn ties_break_by_insertion_order() {
    let index = index_with(&[("z:0", "alpha beta"), ("a:0", "alpha beta"), ("m:0", "alpha beta")]);
    let ids: Vec<String> = index.search("alpha", 10).into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["z:0", "a:0", "m:0"]);
}

#[test]
fn removal_retracts_document_frequency() {
    let mut index = index_with(&[("a:0", "zebra stripes"), ("b:0", "zebra crossing"), ("c:0", "plain road")]);
    assert_eq!(index.doc_freq("zebra"), 2);
    let before = index.search("zebra", 5)[0].score;

    assert!(index.remove("b:0"));
    assert!(!index.remove("b:0"));
    assert_eq!(index.doc_freq("zebra"), 1);
    assert_eq!(index.doc_freq("crossing"), 0);
    let hits = index.search("zebra crossing", 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a:0");
    assert!(hits[0].score > before, "rarer term after deletion scores higher");
}

#[test]
fn delete_then_readd_matches_fresh_index() {
    let docs = [("a:0", "solar panels convert light"), ("b:0", "wind turbines convert motion")];
    let mut churned = index_with(&docs);
    churned.add("x:0", "light light light turbines");
    churned.remove("x:0");
    let fresh = index_with(&docs);

    let a = churned.search("convert light", 5);
    let b = fresh.search("convert light", 5);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.id, y.id);
        assert!((x.score - y.score).abs() < 1e-6);
    }
}

#[test]
fn readding_replaces_previous_text() {
    let mut index = index_with(&[("a:0", "old words here")]);
    index.add("a:0", "new content");
    assert_eq!(index.len(), 1);
    assert!(index.search("old", 5).is_empty());
    assert_eq!(index.search("content", 5).len(), 1);
}

#[test]
fn save_and_load_preserve_scores_and_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("lexical.json");
    let mut index = index_with(&[("a:0", "graph databases"), ("b:0", "graph theory basics"), ("c:0", "cooking")]);
    index.remove("c:0");
    index.save(&path).unwrap();

    let loaded = LexicalIndex::load(&path, &LexicalConfig::default()).unwrap();
    assert_eq!(loaded.ids(), index.ids());
    assert_eq!(loaded.doc_freq("graph"), 2);
    assert_eq!(loaded.seq("b:0"), index.seq("b:0"));
    assert_eq!(loaded.search("graph", 5), index.search("graph", 5));

    let mut loaded = loaded;
    let seq = loaded.add("d:0", "more graph");
    assert_eq!(seq, 3, "sequence numbers keep increasing after reload");
}

#[test]
fn load_missing_file_is_empty() {
    let tmp = TempDir::new().unwrap();
    let index = LexicalIndex::load(&tmp.path().join("missing.json"), &LexicalConfig::default()).unwrap();
    assert!(index.is_empty());
}
