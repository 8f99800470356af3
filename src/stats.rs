//! Vector store statistics.
//!
//! `kw --mode stats` prints what is indexed: chunk and source counts, the
//! embedding model the vectors were built with, and a per-folder breakdown.

use anyhow::Result;

use crate::store::{StoreStats, VectorStore};

/// Run the stats command: read the store and print a summary.
pub async fn run_stats(store: &VectorStore) -> Result<()> {
    let stats = store.stats().await?;
    print!("{}", render_stats(&stats));
    Ok(())
}

pub fn render_stats(stats: &StoreStats) -> String {
    let mut out = String::new();
    out.push_str("Knowledge Worker - Vector Store Stats\n");
    out.push_str("=====================================\n\n");
    out.push_str(&format!("  Store:       {}\n", stats.path.display()));
    out.push_str(&format!("  Size:        {}\n", format_bytes(stats.size_bytes)));
    out.push_str(&format!(
        "  Model:       {}\n",
        stats.embedding_model.as_deref().unwrap_or("(none)")
    ));
    out.push_str(&format!(
        "  Dimensions:  {}\n",
        stats
            .dims
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    out.push('\n');
    out.push_str(&format!("  Sources:     {}\n", stats.sources));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    out.push_str(&format!(
        "  Updated:     {}\n",
        match stats.last_updated {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    ));

    if !stats.by_doc_type.is_empty() {
        out.push_str("\n  By document type:\n");
        out.push_str(&format!("  {:<32} {:>8}\n", "TYPE", "CHUNKS"));
        out.push_str(&format!("  {}\n", "-".repeat(41)));
        for (doc_type, n) in &stats.by_doc_type {
            out.push_str(&format!("  {:<32} {:>8}\n", doc_type, n));
        }
    }
    out.push('\n');
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
