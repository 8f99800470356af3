//! Shared helpers for integration tests: offline model stand-ins and a local
//! server speaking the OpenAI embeddings and chat completions endpoints.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use knowledge_worker::config::Config;
use knowledge_worker::embedding::Embedder;
use knowledge_worker::llm::{ChatMessage, ChatModel};

pub const DIMS: usize = 256;

/// Bag-of-words hashing vector; identical texts give identical vectors.
pub fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        v[bucket % DIMS] += 1.0;
    }
    v
}

pub struct WordEmbedder {
    model: String,
    pub texts: AtomicUsize,
}

impl WordEmbedder {
    pub fn new(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            texts: AtomicUsize::new(0),
        })
    }

    pub fn embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| word_vector(t)).collect())
    }
}

/// Replies with the last user message so tests can inspect the prompt.
pub struct EchoChat {
    pub calls: AtomicUsize,
}

impl EchoChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for EchoChat {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }
}

/// Config for tests: documents under `root`, store under `data`.
pub fn test_config(root: &Path, data: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.openai.api_key = Some("test-key".to_string());
    cfg.documents.root = root.to_path_buf();
    cfg.store.data_dir = data.to_path_buf();
    cfg.chunking.chunk_size = 500;
    cfg.chunking.chunk_overlap = 50;
    cfg.retrieval.k = 3;
    cfg
}

// ============ Mock OpenAI server ============

pub const MOCK_ANSWER: &str = "According to the documents, the answer is in [1].";

#[derive(Clone, Default)]
struct MockState {
    embedding_requests: Arc<AtomicUsize>,
    chat_requests: Arc<AtomicUsize>,
    fail_remaining: Arc<AtomicUsize>,
}

impl MockState {
    /// Consume one scheduled failure, if any are left.
    fn take_failure(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct MockOpenAi {
    pub base_url: String,
    state: MockState,
}

impl MockOpenAi {
    pub fn embedding_requests(&self) -> usize {
        self.state.embedding_requests.load(Ordering::SeqCst)
    }

    pub fn chat_requests(&self) -> usize {
        self.state.chat_requests.load(Ordering::SeqCst)
    }
}

/// Serve the mock API on an ephemeral port. The first `fail_first` requests
/// answer 503.
pub async fn spawn_mock_openai(fail_first: usize) -> MockOpenAi {
    let state = MockState::default();
    state.fail_remaining.store(fail_first, Ordering::SeqCst);

    let app = Router::new()
        .route("/v1/embeddings", post(mock_embeddings))
        .route("/v1/chat/completions", post(mock_chat))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockOpenAi {
        base_url: format!("http://{}/v1", addr),
        state,
    }
}

async fn mock_embeddings(
    State(state): State<MockState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.embedding_requests.fetch_add(1, Ordering::SeqCst);
    if state.take_failure() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"message": "overloaded"}})),
        );
    }
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    // Reverse order exercises index-based reordering on the client.
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| json!({"object": "embedding", "index": i, "embedding": word_vector(text)}))
        .collect();
    (
        StatusCode::OK,
        Json(json!({"object": "list", "data": data, "model": body["model"]})),
    )
}

async fn mock_chat(
    State(state): State<MockState>,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.chat_requests.fetch_add(1, Ordering::SeqCst);
    if state.take_failure() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"message": "overloaded"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": MOCK_ANSWER}}]
        })),
    )
}

// ============ Binary helpers ============

pub fn kw_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kw");
    path
}
