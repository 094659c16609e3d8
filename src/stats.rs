//! Index statistics, shared by `docrag stats` and `GET /stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use docrag_core::store::VectorStore;

use crate::app::{build_service, App};
use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub collection: String,
    pub embedding_model: Option<String>,
    pub embedding_dims: Option<usize>,
    pub entries: u64,
    pub sources: u64,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

pub async fn collect_stats(app: &App) -> Result<IndexStats> {
    let signature = app.store.signature().await?;
    Ok(IndexStats {
        collection: app.store.collection().to_string(),
        embedding_model: signature.as_ref().map(|s| s.model.clone()),
        embedding_dims: signature.map(|s| s.dims),
        entries: app.store.count().await?,
        sources: app.store.source_count().await?,
        last_indexed_at: app.store.last_indexed_at().await?,
    })
}

/// Run the stats command: print a summary of the collection.
pub async fn run_stats(config: &Config) -> Result<()> {
    let app = build_service(config).await?;
    let stats = collect_stats(&app).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docrag index stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", stats.collection);
    match (&stats.embedding_model, stats.embedding_dims) {
        (Some(model), Some(dims)) => println!("  Embedding:   {} ({} dims)", model, dims),
        _ => println!("  Embedding:   not pinned"),
    }
    println!();
    println!("  Documents:   {}", stats.sources);
    println!("  Chunks:      {}", stats.entries);
    println!(
        "  Last index:  {}",
        stats
            .last_indexed_at
            .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
