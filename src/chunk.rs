//! Boundary-aware, overlapping text chunker.
//!
//! Splits a [`Document`]'s text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks share exactly `chunk_overlap` characters:
//! every chunk after the first starts `chunk_overlap` characters before the
//! end of its predecessor.
//!
//! Within each window the cut point is chosen by priority:
//!
//! 1. the end of the last paragraph break (`\n\n` or `\r\n\r\n`)
//! 2. the end of the last sentence (`.`, `!` or `?` followed by whitespace)
//! 3. the last whitespace character
//! 4. a hard cut at `chunk_size` characters
//!
//! A boundary is only taken if it lies past the overlap, so every step makes
//! progress. Because chunks are plain spans of the original text, dropping the
//! first `chunk_overlap` characters of every chunk after the first and
//! concatenating yields the document text exactly.
//!
//! Chunk IDs are UUIDv5 values over `"{relative_path}#{index}"`, so re-chunking
//! an unchanged file yields the same IDs.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Split a document into chunks. Empty or whitespace-only text yields none.
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    split_spans(&doc.text, config.chunk_size, config.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(index, span)| make_chunk(doc, index as i64, span))
        .collect()
}

/// A chunk's span in characters plus the byte range it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    byte_start: usize,
    byte_end: usize,
}

fn split_spans(text: &str, chunk_size: usize, overlap: usize) -> Vec<Span> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);

    // bytes[i] is the byte offset of character i; bytes[n] == text.len()
    let mut bytes: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = bytes.len();
    bytes.push(text.len());
    let chars: Vec<char> = text.chars().collect();

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + chunk_size).min(n);
        let end = if hard_end == n {
            n
        } else {
            find_break(&chars, start + overlap + 1, hard_end).unwrap_or(hard_end)
        };

        spans.push(Span {
            start,
            end,
            byte_start: bytes[start],
            byte_end: bytes[end],
        });

        if end == n {
            break;
        }
        start = end - overlap;
    }

    spans
}

/// Best cut position in `(min_end..=max_end)`, by boundary priority.
fn find_break(chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    if min_end > max_end {
        return None;
    }

    // Paragraph: cut right after a blank line ("\n\n" or "\r\n\r\n").
    for end in (min_end..=max_end).rev() {
        if ends_paragraph(&chars[..end]) {
            return Some(end);
        }
    }

    // Sentence: cut after the whitespace that follows terminal punctuation.
    for end in (min_end..=max_end).rev() {
        if end >= 2
            && chars[end - 1].is_whitespace()
            && matches!(chars[end - 2], '.' | '!' | '?')
        {
            return Some(end);
        }
    }

    // Word: cut after any whitespace.
    (min_end..=max_end)
        .rev()
        .find(|&end| end >= 1 && chars[end - 1].is_whitespace())
}

/// True when `head` ends with a line break preceded by another line break.
fn ends_paragraph(head: &[char]) -> bool {
    let Some((&'\n', rest)) = head.split_last() else {
        return false;
    };
    let rest = match rest.split_last() {
        Some((&'\r', before)) => before,
        _ => rest,
    };
    matches!(rest.last(), Some('\n'))
}

fn make_chunk(doc: &Document, index: i64, span: Span) -> Chunk {
    let text = &doc.text[span.byte_start..span.byte_end];

    Chunk {
        id: chunk_id(&doc.relative_path, index),
        source_path: doc.relative_path.clone(),
        chunk_index: index,
        start: span.start,
        end: span.end,
        text: text.to_string(),
        hash: hash_text(text),
        doc_type: doc.doc_type.clone(),
        file_type: doc.extension.clone(),
    }
}

/// Stable identifier for the `index`-th chunk of `source_path`.
pub fn chunk_id(source_path: &str, index: i64) -> String {
    let name = format!("{}#{}", source_path, index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild a document's text from its ordered chunks.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.end;
    }
    out
}
