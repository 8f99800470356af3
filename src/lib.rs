//! # Knowledge Worker
//!
//! Retrieval-augmented question answering over a company's internal
//! documents.
//!
//! Documents under a configured root are extracted to text, split into
//! overlapping chunks, embedded through an OpenAI-compatible API and kept in
//! a SQLite-backed vector store. Questions are answered by retrieving the most
//! similar chunks and passing them, with recent conversation turns, to a chat
//! model.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────┐
//! │   Loader   │──▶│ Chunker  │──▶│   Vector   │
//! │ walk+parse │   │ overlap  │   │   store    │
//! └────────────┘   └──────────┘   └─────┬──────┘
//!                                       │ top-k
//!                                 ┌─────▼──────┐
//!                                 │    RAG     │──▶ chat model
//!                                 │  pipeline  │
//!                                 └─────┬──────┘
//!                          ┌────────────┴──────────┐
//!                          ▼                       ▼
//!                     ┌─────────┐            ┌──────────┐
//!                     │   CLI   │            │   Web    │
//!                     │ (repl)  │            │  (axum)  │
//!                     └─────────┘            └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Defaults, TOML file and environment layering |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extractors |
//! | [`loader`] | Document directory walk |
//! | [`chunk`] | Overlapping text chunking |
//! | [`retry`] | Backoff policy for API calls |
//! | [`openai`] | OpenAI-compatible HTTP client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Persisted vector store |
//! | [`ingest`] | Index build job |
//! | [`rag`] | Answer pipeline and conversation history |
//! | [`repl`] | Terminal chat |
//! | [`server`] | Web chat and JSON API |
//! | [`stats`] | Store statistics output |
//! | [`logging`] | tracing subscriber setup |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod rag;
pub mod repl;
pub mod retry;
pub mod server;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;
