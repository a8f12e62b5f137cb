mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use ragdb_core::error::Error;
use ragdb_core::traits::VectorStore;
use ragdb_core::types::{Degradation, DocumentStatus, IngestStage};
use ragdb_hybrid::IndexManager;
use ragdb_vector::MemoryProvider;
use tempfile::TempDir;

use common::*;

#[tokio::test]
async fn empty_or_unknown_collection_returns_no_passages() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);

    let result = manager.retrieve("nothing-here", "anything at all", None).await.unwrap();
    assert!(result.passages.is_empty());
    assert!(result.context.citations.is_empty());

    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    manager.delete("cats").await.unwrap();
    let result = manager.retrieve("c", "cats", None).await.unwrap();
    assert!(result.passages.is_empty());
}

#[tokio::test]
async fn ingest_reports_ready_and_lists_documents() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);

    let report = manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Ready);
    assert!(report.error.is_none());
    assert!(report.chunks > 1);

    let docs = manager.documents("c").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].filename, "cats.txt");
    assert_eq!(docs[0].content_hash.len(), 64);
    let doc = manager.document("cats").await.unwrap().unwrap();
    assert_eq!(doc.chunk_ids.len(), report.chunks);
    assert!(manager.document("dogs").await.unwrap().is_none());
}

#[tokio::test]
async fn indexes_stay_consistent_across_ingest_and_delete() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);

    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    manager.ingest("c", "solar", SOLAR.as_bytes(), "solar.txt").await.unwrap();
    manager.ingest("c", "zebra", ZEBRA.as_bytes(), "zebra.txt").await.unwrap();
    manager.delete("solar").await.unwrap();
    manager.ingest("c", "solar2", SOLAR.as_bytes(), "solar.txt").await.unwrap();

    let report = manager.consistency("c").await.unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert!(!report.lexical.iter().any(|id| id.starts_with("solar:")));
    assert!(report.lexical.iter().any(|id| id.starts_with("solar2:")));
}

#[tokio::test]
async fn deleted_documents_never_come_back() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    manager.ingest("c", "zebra", ZEBRA.as_bytes(), "zebra.txt").await.unwrap();

    let before = manager.retrieve("c", "zebra stripes savanna", Some(10)).await.unwrap();
    assert!(before.passages.iter().any(|p| p.document_id == "zebra"));

    let removed = manager.delete("zebra").await.unwrap();
    assert_eq!(removed.id, "zebra");
    let after = manager.retrieve("c", "zebra stripes savanna", Some(10)).await.unwrap();
    assert!(after.passages.iter().all(|p| p.document_id != "zebra"));
    assert!(after.passages.iter().all(|p| p.lexical_score.is_none()), "no lexical trace of deleted terms");
    assert!(matches!(manager.delete("zebra").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn retrieval_is_repeatable() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);
    for (id, text) in [("cats", CATS), ("solar", SOLAR), ("zebra", ZEBRA)] {
        manager.ingest("c", id, text.as_bytes(), &format!("{id}.txt")).await.unwrap();
    }
    let first = manager.retrieve("c", "animals that hunt at night", None).await.unwrap();
    let second = manager.retrieve("c", "animals that hunt at night", None).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn fused_only_returns_exactly_top_f_and_is_degraded() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);
    for (id, text) in [("cats", CATS), ("solar", SOLAR), ("zebra", ZEBRA)] {
        manager.ingest("c", id, text.as_bytes(), &format!("{id}.txt")).await.unwrap();
    }

    let result = manager.retrieve("c", "cats", Some(3)).await.unwrap();
    assert_eq!(result.passages.len(), 3);
    assert!(result.degraded);
    assert_eq!(result.degradations, vec![Degradation::RerankerUnavailable]);
    assert!(result.passages.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
    assert!(result.passages.iter().all(|p| p.rerank_score.is_none()));
}

#[tokio::test]
async fn literal_match_is_boosted_over_vector_only_neighbour() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(KeywordEmbedder { rules: vec![("revenue", 1), ("fiscal", 0), ("earnings", 0)], dim: 4 });
    let manager =
        IndexManager::open(tmp.path(), test_config(), embedder, None, Arc::new(MemoryProvider)).unwrap();

    manager
        .ingest("c", "report", b"Quarterly revenue report: Q3 earnings rose sharply.", "report.txt")
        .await
        .unwrap();
    manager
        .ingest("c", "summary", b"Fiscal performance summary for the third quarter.", "summary.txt")
        .await
        .unwrap();
    manager.ingest("c", "garden", b"Gardening tips for a bright spring season.", "garden.txt").await.unwrap();

    let result = manager.retrieve("c", "Q3 earnings", Some(2)).await.unwrap();
    let top = &result.passages[0];
    assert_eq!(top.document_id, "report");
    assert_eq!(top.document_filename, "report.txt");
    let summary = result.passages.iter().find(|p| p.document_id == "summary").unwrap();
    assert!(summary.vector_score.unwrap() > top.vector_score.unwrap(), "vector alone prefers the summary");
    assert!(top.lexical_score.is_some());
}

#[tokio::test]
async fn reranker_reorders_candidates() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), reranker(RerankBehavior::Keyword("stripes")));
    for (id, text) in [("cats", CATS), ("zebra", ZEBRA)] {
        manager.ingest("c", id, text.as_bytes(), &format!("{id}.txt")).await.unwrap();
    }

    let result = manager.retrieve("c", "cats and stripes", Some(3)).await.unwrap();
    assert!(!result.degraded);
    assert_eq!(result.passages.len(), 3);
    assert!(result.passages[0].text.contains("stripes"));
    assert_eq!(result.passages[0].rerank_score, Some(1.0));
}

#[tokio::test]
async fn equal_rerank_scores_keep_fused_order() {
    let docs = [("cats", CATS), ("solar", SOLAR), ("zebra", ZEBRA)];
    let fused_dir = TempDir::new().unwrap();
    let fused = memory_manager(fused_dir.path(), test_config(), None);
    let ranked_dir = TempDir::new().unwrap();
    let ranked = memory_manager(ranked_dir.path(), test_config(), reranker(RerankBehavior::Constant(0.5)));
    for (id, text) in docs {
        fused.ingest("c", id, text.as_bytes(), "f.txt").await.unwrap();
        ranked.ingest("c", id, text.as_bytes(), "f.txt").await.unwrap();
    }

    let a = fused.retrieve("c", "panel temperature", None).await.unwrap();
    let b = ranked.retrieve("c", "panel temperature", None).await.unwrap();
    let ids = |r: &ragdb_core::types::RetrievalResult| r.passages.iter().map(|p| p.chunk_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&a), ids(&b));
    assert!(!b.degraded);
}

#[tokio::test]
async fn slow_or_failing_reranker_degrades_to_fused_order() {
    let mut config = test_config();
    config.retrieval.rerank_timeout_ms = 50;

    let tmp = TempDir::new().unwrap();
    let slow = reranker(RerankBehavior::Slow(Duration::from_millis(500)));
    let manager = memory_manager(tmp.path(), config.clone(), slow);
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    let result = manager.retrieve("c", "cats", Some(2)).await.unwrap();
    assert_eq!(result.passages.len(), 2);
    assert_eq!(result.degradations, vec![Degradation::RerankerTimeout]);

    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), config, reranker(RerankBehavior::Fail));
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    let result = manager.retrieve("c", "cats", Some(2)).await.unwrap();
    assert_eq!(result.passages.len(), 2);
    assert!(matches!(result.degradations.as_slice(), [Degradation::RerankerFailed(_)]));
    assert!(result.degraded);
}

#[tokio::test]
async fn query_embedding_failure_falls_back_to_lexical() {
    let tmp = TempDir::new().unwrap();
    let embedder = SwitchableEmbedder::new();
    let manager = IndexManager::open(
        tmp.path(),
        test_config(),
        embedder.clone(),
        reranker(RerankBehavior::Constant(0.0)),
        Arc::new(MemoryProvider),
    )
    .unwrap();
    manager.ingest("c", "solar", SOLAR.as_bytes(), "solar.txt").await.unwrap();
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    embedder.fail.store(true, Ordering::SeqCst);
    let result = manager.retrieve("c", "photovoltaic silicon", None).await.unwrap();
    assert!(result.degraded);
    assert!(matches!(result.degradations.as_slice(), [Degradation::EmbeddingUnavailable(_)]));
    assert!(!result.passages.is_empty());
    assert!(result.passages.iter().all(|p| p.document_id == "solar" && p.vector_score.is_none()));
}

#[tokio::test]
async fn request_deadline_is_a_timeout_error() {
    let mut config = test_config();
    config.retrieval.request_timeout_ms = 50;
    config.retrieval.query_embed_timeout_ms = 5_000;
    let tmp = TempDir::new().unwrap();
    let embedder = SwitchableEmbedder::new();
    let manager =
        IndexManager::open(tmp.path(), config, embedder.clone(), None, Arc::new(MemoryProvider)).unwrap();
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    *embedder.stall.lock() = Some(Duration::from_millis(300));
    let err = manager.retrieve("c", "cats", None).await.unwrap_err();
    assert!(matches!(err, Error::QueryTimeout(_)));
}

#[tokio::test]
async fn encoder_outage_fails_document_and_allows_retry() {
    let tmp = TempDir::new().unwrap();
    let embedder = SwitchableEmbedder::new();
    let manager =
        IndexManager::open(tmp.path(), test_config(), embedder.clone(), None, Arc::new(MemoryProvider)).unwrap();

    embedder.fail.store(true, Ordering::SeqCst);
    let report = manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Failed);
    let reason = report.error.unwrap();
    assert!(reason.contains("after 2 attempts"), "{reason}");
    assert_eq!(manager.document("cats").await.unwrap().unwrap().status, DocumentStatus::Failed);
    assert!(manager.consistency("c").await.unwrap().lexical.is_empty());

    embedder.fail.store(false, Ordering::SeqCst);
    let report = manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Ready);
    assert!(manager.consistency("c").await.unwrap().is_consistent());
}

#[tokio::test]
async fn per_document_failures_are_recorded() {
    let mut config = test_config();
    config.ingest.max_file_bytes = 200;
    config.ingest.max_documents_per_collection = 1;
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), config, None);

    let empty = manager.ingest("c", "blank", b"  \n\n \t ", "blank.txt").await.unwrap();
    assert_eq!(empty.status, DocumentStatus::Failed);
    assert_eq!(empty.error.as_deref(), Some("empty document"));

    let big = vec![b'a'; 201];
    let too_large = manager.ingest("c", "big", &big, "big.txt").await.unwrap();
    assert_eq!(too_large.status, DocumentStatus::Failed);
    assert!(too_large.error.unwrap().contains("too large"));

    let binary = manager.ingest("c", "img", &[0x89, b'P', b'N', b'G', 0, 0, 1], "img.png").await.unwrap();
    assert_eq!(binary.status, DocumentStatus::Failed);

    assert_eq!(manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap().status, DocumentStatus::Ready);
    let full = manager.ingest("c", "solar", SOLAR.as_bytes(), "solar.txt").await.unwrap();
    assert_eq!(full.status, DocumentStatus::Failed);
    assert!(full.error.unwrap().contains("collection limit"));

    let listed = manager.documents("c").await.unwrap();
    assert_eq!(listed.len(), 5);
    assert_eq!(listed.iter().filter(|d| d.is_ready()).count(), 1);
}

#[tokio::test]
async fn duplicate_and_invalid_ids_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    assert!(matches!(manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await, Err(Error::DocumentExists(_))));
    assert!(matches!(manager.ingest("d", "cats", CATS.as_bytes(), "cats.txt").await, Err(Error::DocumentExists(_))));
    assert!(matches!(manager.ingest("../x", "a", b"text", "a.txt").await, Err(Error::InvalidInput(_))));
    assert!(matches!(manager.ingest("c", "a:b", b"text", "a.txt").await, Err(Error::InvalidInput(_))));
    assert!(matches!(manager.ingest("c", "", b"text", "a.txt").await, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn failed_vector_write_is_rolled_back() {
    let tmp = TempDir::new().unwrap();
    let store = FlakyStore::new(64);
    let manager =
        IndexManager::open(tmp.path(), test_config(), fake(), None, Arc::new(SharedProvider(store.clone()))).unwrap();
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    store.fail_add.store(true, Ordering::SeqCst);
    let report = manager.ingest("c", "zebra", ZEBRA.as_bytes(), "zebra.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Failed);
    assert!(report.error.unwrap().contains("indexing failed"));

    let consistency = manager.consistency("c").await.unwrap();
    assert!(consistency.is_consistent(), "{consistency:?}");
    assert!(!consistency.vectors.iter().any(|id| id.starts_with("zebra:")));
}

#[tokio::test]
async fn failed_rollback_marks_collection_unusable_until_dropped() {
    let tmp = TempDir::new().unwrap();
    let store = FlakyStore::new(64);
    let manager =
        IndexManager::open(tmp.path(), test_config(), fake(), None, Arc::new(SharedProvider(store.clone()))).unwrap();
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    store.fail_add.store(true, Ordering::SeqCst);
    store.fail_remove.store(true, Ordering::SeqCst);
    let err = manager.ingest("c", "zebra", ZEBRA.as_bytes(), "zebra.txt").await.unwrap_err();
    assert!(matches!(err, Error::IndexConsistency { .. }));
    assert!(matches!(manager.retrieve("c", "cats", None).await, Err(Error::CollectionUnusable { .. })));
    assert!(matches!(manager.ingest("c", "solar", SOLAR.as_bytes(), "s.txt").await, Err(Error::CollectionUnusable { .. })));

    manager.drop_collection("c").await.unwrap();
    assert!(manager.document("cats").await.unwrap().is_none());
    assert!(manager.documents("c").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_manifest_write_leaves_indexes_in_step() {
    let tmp = TempDir::new().unwrap();
    let manager = memory_manager(tmp.path(), test_config(), None);
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    let manifest = tmp.path().join("collections/c/manifest.json");
    std::fs::remove_file(&manifest).unwrap();
    std::fs::create_dir(&manifest).unwrap();

    let _ = manager.ingest("c", "zebra", ZEBRA.as_bytes(), "zebra.txt").await;
    let consistency = manager.consistency("c").await.unwrap();
    assert!(consistency.is_consistent(), "{consistency:?}");
    let result = manager.retrieve("c", "zebra stripes", Some(10)).await.unwrap();
    assert!(result.passages.iter().all(|p| p.document_id == "cats"));

    // The failed ingest left no claim on the id.
    let report = manager.ingest("d", "zebra", ZEBRA.as_bytes(), "zebra.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Ready);
    assert_eq!(manager.document("zebra").await.unwrap().unwrap().collection_id, "d");
}

#[tokio::test]
async fn failed_vector_removal_keeps_collection_usable() {
    let tmp = TempDir::new().unwrap();
    let store = FlakyStore::new(64);
    let manager =
        IndexManager::open(tmp.path(), test_config(), fake(), None, Arc::new(SharedProvider(store.clone()))).unwrap();
    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    store.fail_remove.store(true, Ordering::SeqCst);
    assert!(matches!(manager.delete("cats").await, Err(Error::Storage(_))));
    let consistency = manager.consistency("c").await.unwrap();
    assert!(consistency.is_consistent(), "{consistency:?}");
    assert_eq!(manager.document("cats").await.unwrap().unwrap().status, DocumentStatus::Ready);
    assert!(!manager.retrieve("c", "cats", None).await.unwrap().passages.is_empty());

    store.fail_remove.store(false, Ordering::SeqCst);
    manager.delete("cats").await.unwrap();
    assert!(manager.document("cats").await.unwrap().is_none());
    assert!(store.ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn partially_applied_vector_removal_is_restored() {
    let tmp = TempDir::new().unwrap();
    let store = FlakyStore::new(64);
    let manager =
        IndexManager::open(tmp.path(), test_config(), fake(), None, Arc::new(SharedProvider(store.clone()))).unwrap();
    let report = manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    assert!(report.chunks > 1);
    let before = store.ids().await.unwrap();

    store.partial_remove.store(true, Ordering::SeqCst);
    assert!(matches!(manager.delete("cats").await, Err(Error::Storage(_))));
    assert_eq!(store.ids().await.unwrap(), before);
    assert!(manager.consistency("c").await.unwrap().is_consistent());
}

#[test]
fn concurrent_ingest_of_one_id_into_two_collections_admits_one() {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
        let tmp = TempDir::new().unwrap();
        let manager = memory_manager(tmp.path(), test_config(), None);

        let (a, b) = tokio::join!(
            manager.ingest("a", "dup", CATS.as_bytes(), "cats.txt"),
            manager.ingest("b", "dup", SOLAR.as_bytes(), "solar.txt"),
        );
        let outcomes = [a, b];
        let ready = outcomes.iter().filter(|r| matches!(r, Ok(rep) if rep.status == DocumentStatus::Ready)).count();
        let refused = outcomes.iter().filter(|r| matches!(r, Err(Error::DocumentExists(_)))).count();
        assert_eq!((ready, refused), (1, 1));

        let listed = manager.documents("a").await.unwrap().len() + manager.documents("b").await.unwrap().len();
        assert_eq!(listed, 1);

        manager.delete("dup").await.unwrap();
        assert!(manager.documents("a").await.unwrap().is_empty());
        assert!(manager.documents("b").await.unwrap().is_empty());
    });
}

#[tokio::test]
async fn opening_a_collection_does_not_block_others() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(SlowOpenProvider { delay: Duration::from_millis(500) });
    let manager = IndexManager::open(tmp.path(), test_config(), fake(), None, provider).unwrap();
    manager.ingest("fast", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();

    let (slow, fast) = tokio::join!(manager.ingest("slow", "solar", SOLAR.as_bytes(), "solar.txt"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_millis(200), manager.retrieve("fast", "cats", None)).await
    });
    assert!(slow.is_ok());
    let fast = fast.expect("retrieve waited on another collection's open");
    assert!(!fast.unwrap().passages.is_empty());
}

#[tokio::test]
async fn progress_milestones_are_reported_in_order() {
    let tmp = TempDir::new().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let manager = memory_manager(tmp.path(), test_config(), None).with_observer(observer.clone());

    manager.ingest("c", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    manager.ingest("c", "blank", b"   ", "blank.txt").await.unwrap();

    let events = observer.events.lock().clone();
    let cats: Vec<_> = events.iter().filter(|e| e.document_id == "cats").map(|e| e.stage.clone()).collect();
    assert!(matches!(
        cats.as_slice(),
        [IngestStage::Normalized { .. }, IngestStage::Chunked { .. }, IngestStage::Embedded { .. }, IngestStage::Indexed]
    ));
    let blank: Vec<_> = events.iter().filter(|e| e.document_id == "blank").map(|e| e.stage.clone()).collect();
    assert_eq!(
        blank,
        vec![IngestStage::Normalized { chars: 0 }, IngestStage::Failed { reason: "empty document".into() }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_and_queries_stay_consistent() {
    let tmp = TempDir::new().unwrap();
    let manager = Arc::new(memory_manager(tmp.path(), test_config(), None));
    manager.ingest("a", "seed", CATS.as_bytes(), "seed.txt").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..6 {
        let m = Arc::clone(&manager);
        let collection = if i % 2 == 0 { "a" } else { "b" };
        tasks.push(tokio::spawn(async move {
            let text = format!("{SOLAR} Document number {i}.");
            m.ingest(collection, &format!("doc{i}"), text.as_bytes(), "doc.txt").await.map(|_| ())
        }));
        let m = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move { m.retrieve("a", "solar panels", None).await.map(|_| ()) }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    for c in ["a", "b"] {
        assert!(manager.consistency(c).await.unwrap().is_consistent());
    }
    assert_eq!(manager.documents("a").await.unwrap().len(), 4);
    assert_eq!(manager.documents("b").await.unwrap().len(), 3);
}

fn lance_manager(root: &std::path::Path) -> IndexManager {
    IndexManager::open(root, test_config(), fake(), None, Arc::new(ragdb_vector::LanceProvider)).unwrap()
}

#[tokio::test]
async fn collections_survive_a_restart() {
    let tmp = TempDir::new().unwrap();
    let before = {
        let manager = lance_manager(tmp.path());
        manager.ingest("notes", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
        manager.ingest("notes", "solar", SOLAR.as_bytes(), "solar.txt").await.unwrap();
        manager.retrieve("notes", "solar panels", None).await.unwrap()
    };

    let manager = lance_manager(tmp.path());
    assert_eq!(manager.collection_ids(), vec!["notes".to_string()]);
    let after = manager.retrieve("notes", "solar panels", None).await.unwrap();
    let ids = |r: &ragdb_core::types::RetrievalResult| r.passages.iter().map(|p| p.chunk_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));

    manager.delete("cats").await.unwrap();
    assert!(manager.consistency("notes").await.unwrap().is_consistent());
    drop(manager);

    let manager = lance_manager(tmp.path());
    assert!(manager.document("cats").await.unwrap().is_none());
    assert!(manager.document("solar").await.unwrap().unwrap().is_ready());
}

#[tokio::test]
async fn reopening_detects_missing_lexical_file() {
    let tmp = TempDir::new().unwrap();
    {
        let manager = lance_manager(tmp.path());
        manager.ingest("notes", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    }
    std::fs::remove_file(tmp.path().join("collections/notes/lexical.json")).unwrap();

    let manager = lance_manager(tmp.path());
    let report = manager.consistency("notes").await.unwrap();
    assert!(report.lexical.is_empty());
    assert!(!report.is_consistent());
    assert!(matches!(manager.retrieve("notes", "cats", None).await, Err(Error::CollectionUnusable { .. })));

    manager.drop_collection("notes").await.unwrap();
    let report = manager.ingest("notes", "cats", CATS.as_bytes(), "cats.txt").await.unwrap();
    assert_eq!(report.status, DocumentStatus::Ready);
    assert!(manager.consistency("notes").await.unwrap().is_consistent());
}
