//! Core data models used throughout the knowledge worker.
//!
//! These types represent the documents, chunks, retrieval results and answers
//! that flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A source file and the text extracted from it.
///
/// Built once during a load pass and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the document root, `/`-separated. Used for chunk IDs.
    pub relative_path: String,
    /// Lower-case extension without the dot.
    pub extension: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Top-level directory under the root, or `root_files`.
    pub doc_type: String,
    pub text: String,
    /// Non-fatal extraction problems (lossy decoding, unreadable sheets).
    pub errors: Vec<String>,
}

/// A contiguous slice of a document's text.
///
/// `start` and `end` are character offsets into [`Document::text`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic ID derived from the source path and chunk index.
    pub id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`, used to detect changed content on rebuild.
    pub hash: String,
    pub doc_type: String,
    pub file_type: String,
}

/// One stored chunk returned by a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub doc_type: String,
    pub text: String,
    /// Cosine similarity to the query, higher is more relevant.
    pub score: f32,
}

/// A cited source inside an [`Answer`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceRef {
    pub path: String,
    pub chunk_index: i64,
    pub score: f32,
}

/// The generated reply plus the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Number of chunks retrieved for this question.
    pub retrieved: usize,
}
