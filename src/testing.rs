//! Offline stand-ins for the hosted models, shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::llm::{ChatMessage, ChatModel};

pub const DIMS: usize = 256;

/// Bag-of-words embedder: each word bumps one of [`DIMS`] buckets.
pub struct WordEmbedder {
    model: String,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
}

impl WordEmbedder {
    pub fn new(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        })
    }

    pub fn vector(text: &str) -> Vec<f32> {
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
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Chat model that records every request and answers with a fixed reply,
/// or fails when built with [`ScriptedChat::failing`].
pub struct ScriptedChat {
    reply: Option<String>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("OpenAI API error 503 Service Unavailable: overloaded"),
        }
    }
}
