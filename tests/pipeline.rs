//! End-to-end library tests: load → chunk → build → query → answer, with
//! offline model stand-ins and a local mock of the hosted API.

mod common;

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use common::{spawn_mock_openai, test_config, EchoChat, WordEmbedder, MOCK_ANSWER};
use knowledge_worker::chunk::{chunk_document, reconstruct};
use knowledge_worker::embedding::{Embedder, OpenAiEmbedder};
use knowledge_worker::extract::ExtractorRegistry;
use knowledge_worker::ingest::{build_index, ensure_index};
use knowledge_worker::llm::{ChatMessage, ChatModel, OpenAiChat};
use knowledge_worker::loader::load_documents;
use knowledge_worker::openai::OpenAiClient;
use knowledge_worker::rag::{RagPipeline, NO_CONTEXT_ANSWER};
use knowledge_worker::retry::RetryPolicy;
use knowledge_worker::store::{StoreError, VectorStore};

const HANDBOOK: &str = "Welcome to the company handbook. This guide covers the basics for new staff.\n\n\
Parking permits for the garage are issued by facilities. Request a permit through the front desk.\n\n\
Holidays follow the regional calendar and are published each January.";

const IT_POLICY: &str = "Laptops are replaced every three years.\n\nPasswords rotate every ninety days.";

fn setup() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    let data = tmp.path().join("data");
    fs::create_dir_all(docs.join("it")).unwrap();
    (tmp, docs, data)
}

async fn open_store(cfg: &knowledge_worker::config::Config, embedder: Arc<WordEmbedder>) -> VectorStore {
    VectorStore::open(&cfg.store, embedder, cfg.openai.batch_size)
        .await
        .unwrap()
}

#[tokio::test]
async fn three_paragraph_file_is_retrieved_for_its_middle_topic() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let cfg = test_config(&docs, &data);

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    let summary = build_index(&cfg, &store, true).await.unwrap();
    assert_eq!(summary.documents, 2);
    assert!(summary.chunks >= 2);

    let results = store
        .query("how do I get parking permits for the garage", cfg.retrieval.k)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= cfg.retrieval.k);
    assert_eq!(results[0].source_path, "handbook.md");
    assert!(results[0].text.contains("Parking permits"));
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn empty_root_builds_nothing_and_still_answers() {
    let (_tmp, docs, data) = setup();
    let cfg = test_config(&docs, &data);

    let store = Arc::new(open_store(&cfg, WordEmbedder::new("words-v1")).await);
    let summary = build_index(&cfg, &store, false).await.unwrap();
    assert_eq!(summary.chunks, 0);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.query("anything", 5).await.unwrap().is_empty());

    let chat = EchoChat::new();
    let pipeline = RagPipeline::new(store, chat.clone(), 5, 4);
    let answer = pipeline.answer("What is the leave policy?", &[]).await.unwrap();
    assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn oversized_file_is_left_out() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("huge.txt"), "parking ".repeat(500)).unwrap();
    let mut cfg = test_config(&docs, &data);
    cfg.documents.max_file_size = 1000;

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    let summary = build_index(&cfg, &store, true).await.unwrap();
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.skipped_large, 1);

    let results = store.query("parking", 10).await.unwrap();
    assert!(results.iter().all(|r| r.source_path != "huge.txt"));
    assert!(results.iter().any(|r| r.source_path == "handbook.md"));
}

#[tokio::test]
async fn corrupted_pdf_is_skipped() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("broken.pdf"), b"%PDF-1.4\nthis is not a real pdf").unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let cfg = test_config(&docs, &data);

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    let summary = build_index(&cfg, &store, true).await.unwrap();
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.skipped_errors, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sources, 2);
}

#[tokio::test]
async fn incremental_build_twice_changes_nothing() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let cfg = test_config(&docs, &data);
    let embedder = WordEmbedder::new("words-v1");

    let store = open_store(&cfg, embedder.clone()).await;
    build_index(&cfg, &store, false).await.unwrap();
    let first_ids = store.ids().await.unwrap();
    let embedded_after_first = embedder.embedded();

    let second = build_index(&cfg, &store, false).await.unwrap();
    assert_eq!(store.ids().await.unwrap(), first_ids);
    assert_eq!(second.store.embedded, 0);
    assert_eq!(second.store.unchanged, first_ids.len());
    assert_eq!(embedder.embedded(), embedded_after_first);
}

#[tokio::test]
async fn rebuild_matches_current_documents() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let cfg = test_config(&docs, &data);

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    build_index(&cfg, &store, false).await.unwrap();

    fs::remove_file(docs.join("it").join("policy.txt")).unwrap();

    // Incremental builds keep entries of removed files.
    build_index(&cfg, &store, false).await.unwrap();
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sources, 2);

    let summary = build_index(&cfg, &store, true).await.unwrap();
    assert_eq!(store.count().await.unwrap(), summary.chunks);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.sources, 1);
}

#[tokio::test]
async fn same_question_same_ranking() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let mut cfg = test_config(&docs, &data);
    cfg.chunking.chunk_size = 60;
    cfg.chunking.chunk_overlap = 10;

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    build_index(&cfg, &store, true).await.unwrap();

    let ids = |r: Vec<knowledge_worker::models::RetrievedChunk>| {
        r.into_iter().map(|c| c.id).collect::<Vec<_>>()
    };
    let a = ids(store.query("every three years", 4).await.unwrap());
    let b = ids(store.query("every three years", 4).await.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.len(), 4);
}

#[test]
fn loaded_documents_reconstruct_from_chunks() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    fs::write(docs.join("it").join("policy.txt"), IT_POLICY).unwrap();
    let mut cfg = test_config(&docs, &data);
    cfg.chunking.chunk_size = 70;
    cfg.chunking.chunk_overlap = 20;

    let report = load_documents(&cfg.documents, &ExtractorRegistry::default()).unwrap();
    assert_eq!(report.loaded(), 2);
    for doc in &report.documents {
        let chunks = chunk_document(doc, &cfg.chunking);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), doc.text);
    }
}

#[tokio::test]
async fn ensure_index_reuses_populated_store() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    let cfg = test_config(&docs, &data);
    let embedder = WordEmbedder::new("words-v1");

    let store = open_store(&cfg, embedder.clone()).await;
    assert!(ensure_index(&cfg, &store, false).await.unwrap().is_some());
    let embedded = embedder.embedded();
    assert!(ensure_index(&cfg, &store, false).await.unwrap().is_none());
    assert_eq!(embedder.embedded(), embedded);
    assert!(ensure_index(&cfg, &store, true).await.unwrap().is_some());
}

#[tokio::test]
async fn switching_embedding_model_is_rejected() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    let cfg = test_config(&docs, &data);

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    build_index(&cfg, &store, true).await.unwrap();
    store.close().await;

    let store = open_store(&cfg, WordEmbedder::new("words-v2")).await;
    let err = store.query("parking", 3).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::ModelMismatch { .. })
    ));
}

#[tokio::test]
async fn answer_prompt_carries_sources_and_question() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    let cfg = test_config(&docs, &data);

    let store = open_store(&cfg, WordEmbedder::new("words-v1")).await;
    build_index(&cfg, &store, true).await.unwrap();

    let pipeline = RagPipeline::new(Arc::new(store), EchoChat::new(), 3, 4);
    let answer = pipeline.answer("Who issues parking permits?", &[]).await.unwrap();
    // EchoChat replies with the final prompt message.
    assert!(answer.answer.contains("(source: handbook.md#0)"));
    assert!(answer.answer.ends_with("Question: Who issues parking permits?"));
    assert_eq!(answer.sources[0].path, "handbook.md");
}

// ============ Hosted API (mock server) ============

fn mock_config(base_url: &str) -> knowledge_worker::config::Config {
    let mut cfg = knowledge_worker::config::Config::default();
    cfg.openai.api_key = Some("test-key".to_string());
    cfg.openai.base_url = base_url.to_string();
    cfg
}

#[tokio::test]
async fn transient_api_failures_are_retried() {
    let mock = spawn_mock_openai(2).await;
    let cfg = mock_config(&mock.base_url);
    let client = OpenAiClient::new(&cfg.openai)
        .unwrap()
        .with_retry(RetryPolicy::immediate(3));
    let embedder = OpenAiEmbedder::new(client, "text-embedding-3-small");

    let texts = vec!["alpha".to_string(), "beta gamma".to_string()];
    let vectors = embedder.embed(&texts).await.unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], common::word_vector("alpha"));
    assert_eq!(vectors[1], common::word_vector("beta gamma"));
    assert_eq!(mock.embedding_requests(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_error() {
    let mock = spawn_mock_openai(10).await;
    let cfg = mock_config(&mock.base_url);
    let client = OpenAiClient::new(&cfg.openai)
        .unwrap()
        .with_retry(RetryPolicy::immediate(1));
    let chat = OpenAiChat::new(client, "gpt-test", 0.0);

    let err = chat
        .complete(&[ChatMessage::user("hello")])
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("503"));
    assert_eq!(mock.chat_requests(), 2);
}

#[tokio::test]
async fn full_pipeline_against_hosted_api_mock() {
    let (_tmp, docs, data) = setup();
    fs::write(docs.join("handbook.md"), HANDBOOK).unwrap();
    let mock = spawn_mock_openai(0).await;
    let mut cfg = test_config(&docs, &data);
    cfg.openai.base_url = mock.base_url.clone();

    let embedder = OpenAiEmbedder::new(
        OpenAiClient::new(&cfg.openai).unwrap(),
        cfg.openai.embedding_model.clone(),
    );
    let store = VectorStore::open(&cfg.store, Arc::new(embedder), cfg.openai.batch_size)
        .await
        .unwrap();
    build_index(&cfg, &store, true).await.unwrap();

    let chat = OpenAiChat::new(
        OpenAiClient::new(&cfg.openai).unwrap(),
        cfg.openai.model.clone(),
        cfg.openai.temperature,
    );
    let pipeline = RagPipeline::new(Arc::new(store), Arc::new(chat), 3, 4);
    let answer = pipeline.answer("parking permits?", &[]).await.unwrap();
    assert_eq!(answer.answer, MOCK_ANSWER);
    assert_eq!(answer.sources[0].path, "handbook.md");
    assert_eq!(mock.chat_requests(), 1);
}
