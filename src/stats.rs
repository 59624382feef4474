//! Store statistics.
//!
//! Prints the record count of every configured collection plus the size of
//! the database file. Used by `docpipe stats` to confirm a load landed.

use anyhow::Result;

use crate::config::Config;
use crate::datasets::DatasetKind;
use crate::db;
use crate::migrate;
use crate::models::CollectionId;
use crate::store::sqlite::SqliteStore;
use crate::store::DocumentStore;

/// Record counts per configured collection.
pub async fn collection_counts(
    store: &dyn DocumentStore,
    config: &Config,
) -> Result<Vec<(DatasetKind, CollectionId, u64)>> {
    let mut counts = Vec::new();
    for kind in DatasetKind::ALL {
        let collection = kind.build(config).collection;
        let count = store.count(&collection).await?;
        counts.push((kind, collection, count));
    }
    Ok(counts)
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let counts = collection_counts(&store, config).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docpipe Store Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  {:<12} {:<28} {:>8}", "DATASET", "COLLECTION", "RECORDS");
    println!("  {}", "-".repeat(50));
    for (kind, collection, count) in &counts {
        println!(
            "  {:<12} {:<28} {:>8}",
            kind.name(),
            collection.to_string(),
            count
        );
    }
    println!();

    store.close().await;
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
