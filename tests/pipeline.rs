mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{fruit_csv, harbour_text, FakeEmbedder, Harness};
use docask::answer::NO_ANSWER;
use docask::error::{ErrorCategory, QaError};
use docask::index::VectorIndex;
use docask::models::{Document, DocumentType, Locator};

#[tokio::test]
async fn three_thousand_chars_index_as_three_or_four_chunks() {
    let h = Harness::new();
    let doc = h.document("harbour.txt", &harbour_text(), DocumentType::Text);

    let report = h.pipeline.rebuild(&doc).await.unwrap();
    assert_eq!(report.document_id, "harbour.txt");
    assert_eq!(report.segments, 1);
    assert!((3..=4).contains(&report.chunks), "got {} chunks", report.chunks);
    assert_eq!(report.dims, common::DIMS);
    assert_eq!(report.model, "fake-bow");

    let status = h.pipeline.status().await;
    assert!(status.ready);
    assert_eq!(status.chunk_count, Some(report.chunks));
}

#[tokio::test]
async fn retrieve_is_bounded_and_ordered() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let hits = h.pipeline.retrieve("which fruit is yellow", Some(3)).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.chunk.document_id == "fruit.csv"));
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(matches!(hits[0].chunk.locator, Locator::Row(_)));
}

#[tokio::test]
async fn best_match_comes_first() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let hits = h.pipeline.retrieve("mango orange South Asia", Some(1)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.text.contains("fruit: mango"));
    assert_eq!(hits[0].chunk.locator, Locator::Row(5));
}

#[tokio::test]
async fn irrelevant_query_still_returns_k_chunks() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let hits = h
        .pipeline
        .retrieve("quantum chromodynamics lattice", Some(4))
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);
}

#[tokio::test]
async fn k_larger_than_index_returns_everything() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let hits = h.pipeline.retrieve("fruit", Some(50)).await.unwrap();
    assert_eq!(hits.len(), 6);
}

#[tokio::test]
async fn second_upload_replaces_the_first() {
    let h = Harness::new();
    let a = h.document("a.txt", "Apples grow in orchards on trees.", DocumentType::Text);
    let b = h.document("b.txt", "Bananas grow on large herbaceous plants.", DocumentType::Text);

    h.pipeline.rebuild(&a).await.unwrap();
    h.pipeline.rebuild(&b).await.unwrap();

    let hits = h.pipeline.retrieve("apples orchards trees", Some(4)).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.chunk.document_id == "b.txt"));
    assert_eq!(
        h.pipeline.status().await.document_id.as_deref(),
        Some("b.txt")
    );
}

#[tokio::test]
async fn failed_upload_clears_previous_document() {
    let h = Harness::new();
    let a = h.document("a.txt", "Apples grow in orchards.", DocumentType::Text);
    h.pipeline.rebuild(&a).await.unwrap();

    let missing = Document::from_path(h.tmp.path().join("missing.pdf"), DocumentType::Pdf);
    let err = h.pipeline.rebuild(&missing).await.unwrap_err();
    assert!(matches!(err, QaError::LoadFailure(_)));
    assert_eq!(err.category(), ErrorCategory::DocumentFailed);

    let err = h.pipeline.retrieve("apples", None).await.unwrap_err();
    assert!(matches!(err, QaError::NoActiveIndex));
    assert!(!h.pipeline.status().await.ready);
    assert!(!VectorIndex::db_path(&h.config.index.dir).exists());
}

#[tokio::test]
async fn blank_document_is_empty_input() {
    let h = Harness::new();
    let doc = h.document("blank.txt", "   \n\n  ", DocumentType::Text);

    let err = h.pipeline.rebuild(&doc).await.unwrap_err();
    assert!(matches!(err, QaError::EmptyInput));
    assert_eq!(h.embedder.embed_calls.load(Ordering::SeqCst), 0);
    assert!(!h.pipeline.status().await.ready);
}

#[tokio::test]
async fn unavailable_embedder_fails_before_loading() {
    let h = Harness::new();
    h.embedder.available.store(false, Ordering::SeqCst);

    // The file does not exist; a LoadFailure would mean loading ran first.
    let missing = Document::from_path(h.tmp.path().join("nowhere.txt"), DocumentType::Text);
    let err = h.pipeline.rebuild(&missing).await.unwrap_err();
    assert!(matches!(err, QaError::EmbeddingUnavailable(_)));
    assert_eq!(err.category(), ErrorCategory::BackendUnavailable);
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn inconsistent_embedding_response_fails_rebuild() {
    let h = Harness::new();
    h.embedder.short_batches.store(true, Ordering::SeqCst);
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);

    let err = h.pipeline.rebuild(&doc).await.unwrap_err();
    assert!(matches!(err, QaError::EmbeddingUnavailable(_)));
    assert!(!h.pipeline.status().await.ready);
}

#[tokio::test]
async fn question_before_upload_is_no_active_index() {
    let h = Harness::new();
    let err = h.pipeline.answer_question("What is this about?").await.unwrap_err();
    assert!(matches!(err, QaError::NoActiveIndex));
    assert_eq!(err.category(), ErrorCategory::NoDocument);
    assert_eq!(h.embedder.embed_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn blank_question_is_rejected() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let err = h.pipeline.answer_question("   ").await.unwrap_err();
    assert!(matches!(err, QaError::EmptyQuestion));
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn answer_is_grounded_in_retrieved_context() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let answer = h
        .pipeline
        .answer_question("Where does the mango come from?")
        .await
        .unwrap();
    assert_eq!(answer.text, "stub answer");
    assert_eq!(answer.sources.len(), 4);
    assert_eq!(h.generator.calls(), 1);

    let prompt = h.generator.last_prompt().unwrap();
    assert!(prompt.contains(NO_ANSWER));
    assert!(prompt.contains("fruit: mango"));
    let context_at = prompt.find("Context:").unwrap();
    let question_at = prompt.find("Question: Where does the mango come from?").unwrap();
    assert!(context_at < question_at);
    for source in &answer.sources {
        assert!(prompt.contains(&source.chunk.text));
    }
}

#[tokio::test]
async fn generation_failure_keeps_the_document() {
    let h = Harness::new();
    h.generator.fail.store(true, Ordering::SeqCst);
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let err = h.pipeline.answer_question("Which fruit is red?").await.unwrap_err();
    assert!(matches!(err, QaError::GenerationUnavailable(_)));
    assert!(err.to_string().contains("model not loaded"));
    assert!(h.pipeline.status().await.ready);
}

#[tokio::test]
async fn query_embedding_failure_keeps_the_document() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    h.embedder.available.store(false, Ordering::SeqCst);
    let err = h.pipeline.answer_question("Which fruit is red?").await.unwrap_err();
    assert!(matches!(err, QaError::EmbeddingUnavailable(_)));
    assert!(h.pipeline.status().await.ready);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn reset_drops_the_document() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    h.pipeline.reset().await.unwrap();
    assert!(!h.pipeline.status().await.ready);
    assert!(!h.config.index.dir.exists());
    let err = h.pipeline.retrieve("apple", None).await.unwrap_err();
    assert!(matches!(err, QaError::NoActiveIndex));
}

#[tokio::test]
async fn index_survives_restart() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let reopened = h.reopen().await;
    let status = reopened.status().await;
    assert_eq!(status.document_id.as_deref(), Some("fruit.csv"));
    assert_eq!(status.chunk_count, Some(6));

    let hits = reopened.retrieve("lemon Assam", Some(1)).await.unwrap();
    assert!(hits[0].chunk.text.contains("fruit: lemon"));
}

#[tokio::test]
async fn failed_rebuild_is_not_restored() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let missing = Document::from_path(h.tmp.path().join("gone.csv"), DocumentType::Tabular);
    assert!(h.pipeline.rebuild(&missing).await.is_err());

    let reopened = h.reopen().await;
    assert!(!reopened.status().await.ready);
}

#[tokio::test]
async fn questions_during_rebuild_see_one_whole_document() {
    let h = Harness::new();
    let a = h.document("a.csv", &fruit_csv(), DocumentType::Tabular);
    let b = h.document("b.txt", &harbour_text(), DocumentType::Text);
    h.pipeline.rebuild(&a).await.unwrap();

    let (rebuilt, retrieved) = tokio::join!(
        h.pipeline.rebuild(&b),
        h.pipeline.retrieve("harbour ships apple", Some(4)),
    );
    rebuilt.unwrap();

    let hits = retrieved.unwrap();
    let first = hits[0].chunk.document_id.clone();
    assert!(first == "a.csv" || first == "b.txt");
    assert!(hits.iter().all(|hit| hit.chunk.document_id == first));
}

#[tokio::test]
async fn restart_with_another_embedding_model_drops_the_index() {
    let h = Harness::new();
    let doc = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);
    h.pipeline.rebuild(&doc).await.unwrap();

    let reopened = h
        .reopen_with(Arc::new(FakeEmbedder::named("other-model")))
        .await;
    assert!(!reopened.status().await.ready);
    assert!(!VectorIndex::db_path(&h.config.index.dir).exists());
    let err = reopened.retrieve("lemon", None).await.unwrap_err();
    assert!(matches!(err, QaError::NoActiveIndex));
}

#[tokio::test]
async fn slow_failed_upload_does_not_clear_a_later_one() {
    let h = Harness::new();
    *h.embedder.slow_failure.lock().unwrap() = Some("quarantine".to_string());
    let first = h.document(
        "first.txt",
        "This file is under quarantine and the backend chokes on it.",
        DocumentType::Text,
    );
    let second = h.document("fruit.csv", &fruit_csv(), DocumentType::Tabular);

    let (first_result, second_result) = tokio::join!(h.pipeline.rebuild(&first), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.pipeline.rebuild(&second).await
    });

    assert!(matches!(first_result, Err(QaError::EmbeddingUnavailable(_))));
    assert_eq!(second_result.unwrap().document_id, "fruit.csv");

    let status = h.pipeline.status().await;
    assert!(status.ready);
    assert_eq!(status.document_id.as_deref(), Some("fruit.csv"));
    let hits = h.pipeline.retrieve("mango", Some(1)).await.unwrap();
    assert_eq!(hits[0].chunk.document_id, "fruit.csv");
}
