//! Inspect command implementation.

use super::open_store;
use possync_core::{
    LocalStore, PendingCounts, PendingQueues, ReferenceCache, ReferenceKind, StalledRecord,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Schema version on disk.
    pub schema_version: u32,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Pending records per document kind.
    pub pending: PendingCounts,
    /// Cached entries per reference kind.
    pub cache: Vec<CacheStats>,
    /// Records at or over the high-water mark.
    pub stalled: Vec<StalledRecord>,
}

/// Population of one reference kind.
#[derive(Debug, Serialize)]
pub struct CacheStats {
    /// Reference kind.
    pub kind: ReferenceKind,
    /// Number of cached entries.
    pub entries: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, high_water: u32, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let result = inspect(path, &store, high_water)?;
    store.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result, high_water);
        }
    }

    Ok(())
}

fn inspect(
    path: &Path,
    store: &Arc<LocalStore>,
    high_water: u32,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let queues = PendingQueues::new(Arc::clone(store));
    let cache = ReferenceCache::new(Arc::clone(store));

    let mut cache_stats = Vec::new();
    for kind in ReferenceKind::ALL {
        cache_stats.push(CacheStats {
            kind,
            entries: cache.count(kind)?,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        schema_version: store.schema_version(),
        log_size: store.log_size()?,
        pending: queues.counts()?,
        cache: cache_stats,
        stalled: queues.stalled(high_water)?,
    })
}

fn print_text_output(result: &InspectResult, high_water: u32) {
    println!("possync Store Inspection");
    println!("========================");
    println!();
    println!("Path:           {}", result.path);
    println!("Schema version: {}", result.schema_version);
    println!("Log size:       {}", format_size(result.log_size));
    println!();
    println!("Pending:");
    println!("  Invoices:   {}", result.pending.invoices);
    println!("  Payments:   {}", result.pending.payments);
    println!("  Expenses:   {}", result.pending.expenses);
    println!("  Deliveries: {}", result.pending.deliveries);
    println!();
    println!("Cache:");
    for stats in &result.cache {
        let state = if stats.entries == 0 { "empty" } else { "populated" };
        println!("  {:<9} {} ({} entries)", stats.kind.as_str(), state, stats.entries);
    }

    println!();
    if result.stalled.is_empty() {
        println!("No records at {} or more attempts", high_water);
    } else {
        println!("Stalled ({} or more attempts):", high_water);
        for record in &result.stalled {
            println!(
                "  {} {} - {} attempts",
                record.kind, record.id, record.attempts
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
