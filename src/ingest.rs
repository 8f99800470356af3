//! Index build job: load documents, chunk them, write the vector store.
//!
//! Runs as one sequential batch. Chunks are produced document by document in
//! loader order, so the chunk sequence (and every chunk ID) is identical across
//! runs on an unchanged tree.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::loader::load_documents;
use crate::store::{BuildReport, VectorStore};

/// Outcome of one build, from file walk to stored vectors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub documents: usize,
    pub skipped_large: usize,
    pub skipped_errors: usize,
    pub skipped_unsupported: usize,
    pub skipped_empty: usize,
    pub chunks: usize,
    pub store: BuildReport,
}

/// Load, chunk and store every document under the configured root.
///
/// With `rebuild` the store is cleared first; otherwise only new or changed
/// chunks are embedded.
pub async fn build_index(
    config: &Config,
    store: &VectorStore,
    rebuild: bool,
) -> Result<BuildSummary> {
    let registry = ExtractorRegistry::with_defaults();
    let report = load_documents(&config.documents, &registry)?;

    let chunks: Vec<_> = report
        .documents
        .iter()
        .flat_map(|doc| chunk_document(doc, &config.chunking))
        .collect();
    info!(
        documents = report.loaded(),
        chunks = chunks.len(),
        rebuild,
        "building vector store"
    );

    let store_report = store.build(&chunks, rebuild).await?;

    Ok(BuildSummary {
        documents: report.loaded(),
        skipped_large: report.skipped_large,
        skipped_errors: report.skipped_errors,
        skipped_unsupported: report.skipped_unsupported,
        skipped_empty: report.skipped_empty,
        chunks: chunks.len(),
        store: store_report,
    })
}

/// Builds the index when it is empty or a rebuild is forced.
///
/// Returns `None` when the existing index was reused.
pub async fn ensure_index(
    config: &Config,
    store: &VectorStore,
    rebuild: bool,
) -> Result<Option<BuildSummary>> {
    if !rebuild && !store.is_empty().await? {
        info!("reusing existing vector store");
        return Ok(None);
    }
    info!(rebuild, "vector store empty or rebuild requested, building");
    build_index(config, store, rebuild).await.map(Some)
}

/// `kw --mode build`: run a build and print its summary.
pub async fn run_build(config: &Config, store: &VectorStore, rebuild: bool) -> Result<()> {
    let summary = build_index(config, store, rebuild).await?;
    print_summary(&summary, rebuild);
    Ok(())
}

pub fn print_summary(summary: &BuildSummary, rebuild: bool) {
    println!("build{}", if rebuild { " (rebuild)" } else { "" });
    println!("  documents loaded: {}", summary.documents);
    println!("  skipped (too large): {}", summary.skipped_large);
    println!("  skipped (errors): {}", summary.skipped_errors);
    println!("  skipped (unsupported): {}", summary.skipped_unsupported);
    println!("  skipped (empty): {}", summary.skipped_empty);
    println!("  chunks: {}", summary.chunks);
    println!("  embedded: {}", summary.store.embedded);
    println!("  unchanged: {}", summary.store.unchanged);
    println!("  removed: {}", summary.store.removed);
    println!("ok");
}
