//! Chat-completion backend abstraction.
//!
//! [`ChatModel`] is what the answer pipeline talks to. [`OpenAiChat`] calls
//! the hosted `/chat/completions` endpoint through [`OpenAiClient`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(client: OpenAiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        let response = self.client.post_json("chat/completions", &body).await?;
        parse_completion(&response)
    }
}

fn parse_completion(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("invalid chat completion response: missing choices[0].message.content"))
}
