//! Retrieval-augmented answer pipeline.
//!
//! For each question the pipeline retrieves the top `k` chunks from the
//! [`VectorStore`], builds a prompt, and asks the [`ChatModel`]. The prompt
//! has a fixed system instruction, then up to `max_history` earlier turns,
//! then one user message holding the numbered, source-tagged context
//! passages followed by the question.
//!
//! When nothing is retrieved the pipeline answers with
//! [`NO_CONTEXT_ANSWER`] without calling the model.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{ChatMessage, ChatModel};
use crate::models::{Answer, RetrievedChunk, SourceRef};
use crate::store::VectorStore;

pub const SYSTEM_PROMPT: &str = "You are a knowledge assistant for the company's internal documents. \
Answer the user's question using only the numbered context passages provided with it. \
Cite the passages you rely on by their number, for example [2]. \
If the passages do not contain the answer, say that the documents do not cover it instead of guessing.";

pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the indexed documents to answer that question.";

/// One earlier question and its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Turn history with a fixed capacity; the oldest turn is dropped first.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Conversation {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        if self.max_turns == 0 {
            return;
        }
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

pub struct RagPipeline {
    store: Arc<VectorStore>,
    chat: Arc<dyn ChatModel>,
    k: usize,
    max_history: usize,
}

impl RagPipeline {
    pub fn new(
        store: Arc<VectorStore>,
        chat: Arc<dyn ChatModel>,
        k: usize,
        max_history: usize,
    ) -> Self {
        Self {
            store,
            chat,
            k,
            max_history,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Answer `question`, using at most the last `max_history` turns of
    /// `history` as conversational context.
    pub async fn answer(&self, question: &str, history: &[Turn]) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question must not be empty");
        }

        let retrieved = self.store.query(question, self.k).await?;
        info!(retrieved = retrieved.len(), k = self.k, "retrieved context");
        if retrieved.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                retrieved: 0,
            });
        }

        let skip = history.len().saturating_sub(self.max_history);
        let messages = build_messages(question, &history[skip..], &retrieved);
        debug!(messages = messages.len(), "sending prompt to chat model");
        let answer = self.chat.complete(&messages).await?;

        Ok(Answer {
            answer,
            sources: retrieved
                .iter()
                .map(|c| SourceRef {
                    path: c.source_path.clone(),
                    chunk_index: c.chunk_index,
                    score: c.score,
                })
                .collect(),
            retrieved: retrieved.len(),
        })
    }

    /// Answer within `conversation` and record the new turn.
    pub async fn ask(&self, conversation: &mut Conversation, question: &str) -> Result<Answer> {
        let answer = self.answer(question, &conversation.turns()).await?;
        conversation.push(Turn {
            question: question.trim().to_string(),
            answer: answer.answer.clone(),
        });
        Ok(answer)
    }
}

/// Prompt layout: system instruction, prior turns, context plus question.
pub fn build_messages(
    question: &str,
    history: &[Turn],
    retrieved: &[RetrievedChunk],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    for turn in history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }

    let context = retrieved
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] (source: {}#{})\n{}",
                i + 1,
                c.source_path,
                c.chunk_index,
                c.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    messages.push(ChatMessage::user(format!(
        "Context:\n\n{}\n\nQuestion: {}",
        context, question
    )));
    messages
}
