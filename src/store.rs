//! Persistent vector store backed by SQLite.
//!
//! Each chunk is stored under its deterministic ID (see
//! [`chunk_id`](crate::chunk::chunk_id)) together with its text, metadata,
//! content hash and embedding BLOB. Similarity search is brute-force cosine
//! similarity over all stored vectors.
//!
//! # Build policy
//!
//! - `rebuild = true` clears every row and the recorded model, then embeds all
//!   given chunks. Afterwards the store holds exactly the given chunk set.
//! - `rebuild = false` embeds only chunks whose ID is new or whose hash
//!   changed, and drops surplus trailing chunks of the sources it was given.
//!   Chunks with an unchanged hash keep their embedding but take the new
//!   offsets and metadata. Running it twice on the same input leaves the store
//!   unchanged.
//!
//! Rows are written batch by batch, one transaction per batch, so an
//! interrupted build leaves every committed chunk intact.
//!
//! # Consistency
//!
//! The embedding model and vector dimensionality are recorded in the `meta`
//! table on first build. Building incrementally or querying with a different
//! model fails with [`StoreError::ModelMismatch`] instead of silently comparing
//! vectors from different embedding spaces.
//!
//! Builds take the store's write lock and queries its read lock, so a query
//! never observes a partially rebuilt index.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::migrate;
use crate::models::{Chunk, RetrievedChunk};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "dims";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "embedding model mismatch: index was built with '{stored}' but '{configured}' is configured; rebuild the index with --rebuild-db"
    )]
    ModelMismatch { stored: String, configured: String },
    #[error("embedding dimension mismatch: index holds {stored}-dimensional vectors, got {actual}")]
    DimensionMismatch { stored: usize, actual: usize },
    #[error("embedder returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },
}

/// What one [`VectorStore::build`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Chunks passed in.
    pub total: usize,
    /// Chunks sent to the embedder and written.
    pub embedded: usize,
    /// Chunks already stored with the same hash.
    pub unchanged: usize,
    /// Rows deleted (cleared on rebuild, or pruned surplus chunks).
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunks: usize,
    pub sources: usize,
    pub embedding_model: Option<String>,
    pub dims: Option<usize>,
    /// `(doc_type, chunk count)`, sorted by doc type.
    pub by_doc_type: Vec<(String, usize)>,
    pub path: PathBuf,
    /// On-disk size of the database files.
    pub size_bytes: u64,
    /// Unix timestamp of the most recent write.
    pub last_updated: Option<i64>,
}

pub struct VectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    path: PathBuf,
    gate: RwLock<()>,
}

impl VectorStore {
    pub async fn open(
        config: &StoreConfig,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        Self::open_at(&config.db_path(), embedder, batch_size).await
    }

    pub async fn open_at(
        path: &Path,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
            path: path.to_path_buf(),
            gate: RwLock::new(()),
        })
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn count(&self) -> Result<usize> {
        let _guard = self.gate.read().await;
        self.count_rows().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }

    /// All stored chunk IDs, sorted.
    pub async fn ids(&self) -> Result<Vec<String>> {
        let _guard = self.gate.read().await;
        let ids = sqlx::query_scalar("SELECT id FROM chunks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn build(&self, chunks: &[Chunk], rebuild: bool) -> Result<BuildReport> {
        let _guard = self.gate.write().await;
        let model = self.embedder.model_name().to_string();
        let mut report = BuildReport {
            total: chunks.len(),
            ..BuildReport::default()
        };

        if rebuild {
            report.removed = self.clear().await?;
            info!(removed = report.removed, "cleared vector store for rebuild");
        } else {
            self.check_model().await?;
        }
        self.set_meta(META_MODEL, &model).await?;

        report.removed += self.prune_surplus(chunks).await?;

        let existing: HashMap<String, StoredPlacement> = sqlx::query(
            "SELECT id, hash, start_offset, end_offset, doc_type, file_type FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            let placement = StoredPlacement {
                hash: row.get("hash"),
                start: row.get("start_offset"),
                end: row.get("end_offset"),
                doc_type: row.get("doc_type"),
                file_type: row.get("file_type"),
            };
            (row.get("id"), placement)
        })
        .collect();

        let mut pending: Vec<&Chunk> = Vec::new();
        let mut moved: Vec<&Chunk> = Vec::new();
        for chunk in chunks {
            match existing.get(&chunk.id) {
                Some(stored) if stored.hash == chunk.hash => {
                    if !stored.matches(chunk) {
                        moved.push(chunk);
                    }
                }
                _ => pending.push(chunk),
            }
        }
        report.unchanged = chunks.len() - pending.len();
        if !moved.is_empty() {
            self.update_placement(&moved).await?;
            debug!(moved = moved.len(), "refreshed offsets of unchanged chunks");
        }

        let mut dims = self.stored_dims().await?;
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("embedding batch of {} chunks failed", batch.len()))?;
            if vectors.len() != batch.len() {
                return Err(StoreError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                }
                .into());
            }

            for v in &vectors {
                match dims {
                    Some(d) if d != v.len() => {
                        return Err(StoreError::DimensionMismatch {
                            stored: d,
                            actual: v.len(),
                        }
                        .into());
                    }
                    Some(_) => {}
                    None => {
                        self.set_meta(META_DIMS, &v.len().to_string()).await?;
                        dims = Some(v.len());
                    }
                }
            }

            self.upsert_batch(batch, &vectors).await?;
            report.embedded += batch.len();
            debug!(embedded = report.embedded, pending = pending.len(), "batch stored");
        }

        info!(
            total = report.total,
            embedded = report.embedded,
            unchanged = report.unchanged,
            removed = report.removed,
            "vector store build complete"
        );
        Ok(report)
    }

    /// The `k` stored chunks most similar to `text`, best first.
    ///
    /// Ties are broken by chunk ID so identical queries return identical
    /// orderings. An empty store returns no results without calling the
    /// embedder.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let _guard = self.gate.read().await;
        if k == 0 || self.count_rows().await? == 0 {
            return Ok(Vec::new());
        }
        self.check_model().await?;

        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .context("embedding query failed")?
            .into_iter()
            .next()
            .ok_or(StoreError::CountMismatch {
                expected: 1,
                got: 0,
            })?;
        if let Some(stored) = self.stored_dims().await? {
            if stored != query_vec.len() {
                return Err(StoreError::DimensionMismatch {
                    stored,
                    actual: query_vec.len(),
                }
                .into());
            }
        }

        let rows = sqlx::query(
            "SELECT id, source_path, chunk_index, doc_type, text, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = embedding::cosine_similarity(&query_vec, &embedding::blob_to_vec(&blob));
                RetrievedChunk {
                    id: row.get("id"),
                    source_path: row.get("source_path"),
                    chunk_index: row.get("chunk_index"),
                    doc_type: row.get("doc_type"),
                    text: row.get("text"),
                    score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let _guard = self.gate.read().await;

        let chunks = self.count_rows().await?;
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_path) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let last_updated: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let by_doc_type: BTreeMap<String, i64> =
            sqlx::query("SELECT doc_type, COUNT(*) AS n FROM chunks GROUP BY doc_type")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|row| (row.get("doc_type"), row.get("n")))
                .collect();

        Ok(StoreStats {
            chunks,
            sources: sources as usize,
            embedding_model: self.get_meta(META_MODEL).await?,
            dims: self.stored_dims().await?,
            by_doc_type: by_doc_type
                .into_iter()
                .map(|(t, n)| (t, n as usize))
                .collect(),
            path: self.path.clone(),
            size_bytes: self.disk_size(),
            last_updated,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============ internals (callers hold the gate) ============

    async fn count_rows(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM meta").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn check_model(&self) -> Result<()> {
        let configured = self.embedder.model_name();
        match self.get_meta(META_MODEL).await? {
            Some(stored) if stored != configured => Err(StoreError::ModelMismatch {
                stored,
                configured: configured.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Deletes stored chunks of the given sources whose index is past the
    /// source's new last chunk.
    async fn prune_surplus(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for c in chunks {
            let n = counts.entry(c.source_path.as_str()).or_default();
            *n = (*n).max(c.chunk_index + 1);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for (source, count) in counts {
            removed += sqlx::query("DELETE FROM chunks WHERE source_path = ? AND chunk_index >= ?")
                .bind(source)
                .bind(count)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        if removed > 0 {
            debug!(removed, "pruned surplus chunks");
        }
        Ok(removed as usize)
    }

    /// Rewrites offsets and metadata of chunks whose text is unchanged,
    /// keeping their embeddings.
    async fn update_placement(&self, chunks: &[&Chunk]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                UPDATE chunks
                SET start_offset = ?, end_offset = ?, doc_type = ?, file_type = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(&chunk.doc_type)
            .bind(&chunk.file_type)
            .bind(now)
            .bind(&chunk.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_batch(&self, batch: &[&Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in batch.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, chunk_index, start_offset, end_offset,
                                    text, hash, doc_type, file_type, embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    text = excluded.text,
                    hash = excluded.hash,
                    doc_type = excluded.doc_type,
                    file_type = excluded.file_type,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_path)
            .bind(chunk.chunk_index)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&chunk.doc_type)
            .bind(&chunk.file_type)
            .bind(embedding::vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stored_dims(&self) -> Result<Option<usize>> {
        Ok(self
            .get_meta(META_DIMS)
            .await?
            .and_then(|d| d.parse().ok()))
    }

    fn disk_size(&self) -> u64 {
        let Some(name) = self.path.file_name() else {
            return 0;
        };
        ["", "-wal", "-shm"]
            .iter()
            .map(|suffix| {
                let mut file = name.to_os_string();
                file.push(suffix);
                self.path.with_file_name(file)
            })
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }
}

/// What `build` compares against for a chunk already in the store.
struct StoredPlacement {
    hash: String,
    start: i64,
    end: i64,
    doc_type: String,
    file_type: String,
}

impl StoredPlacement {
    fn matches(&self, chunk: &Chunk) -> bool {
        self.start == chunk.start as i64
            && self.end == chunk.end as i64
            && self.doc_type == chunk.doc_type
            && self.file_type == chunk.file_type
    }
}
