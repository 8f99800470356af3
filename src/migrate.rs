use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the store schema. Safe to run on every open.
///
/// `meta` records the embedding model and dimensionality the index was built
/// with; `chunks` holds one row per embedded chunk, keyed by the deterministic
/// chunk ID.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            file_type TEXT NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source_path, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc_type ON chunks(doc_type)")
        .execute(pool)
        .await?;

    Ok(())
}
