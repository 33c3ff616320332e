//! Compact command implementation.

use super::open_store;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let store = open_store(path)?;
    let before = store.log_size()?;

    if dry_run {
        println!("  Log size: {} bytes", before);
        store.close()?;
        return Ok(());
    }

    let stats = store.compact()?;
    store.close()?;

    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.bytes_before.saturating_sub(stats.bytes_after),
        if stats.bytes_before > 0 {
            (stats.bytes_before.saturating_sub(stats.bytes_after) as f64
                / stats.bytes_before as f64)
                * 100.0
        } else {
            0.0
        }
    );
    println!();
    println!("Compaction complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::store_with;
    use possync_core::{Invoice, PendingQueue};
    use std::sync::Arc;

    #[test]
    fn compaction_shrinks_log_and_keeps_records() {
        let (_dir, path) = store_with(|store| {
            let invoices = PendingQueue::<Invoice>::new(Arc::clone(store));
            for _ in 0..10 {
                let id = invoices.enqueue(Invoice::default()).unwrap();
                invoices.remove(id).unwrap();
            }
            invoices.enqueue(Invoice::default()).unwrap();
        });

        let before = {
            let store = open_store(&path).unwrap();
            let size = store.log_size().unwrap();
            store.close().unwrap();
            size
        };

        run(&path, true).unwrap();
        run(&path, false).unwrap();

        let store = Arc::new(open_store(&path).unwrap());
        assert!(store.log_size().unwrap() < before);
        let invoices = PendingQueue::<Invoice>::new(Arc::clone(&store));
        assert_eq!(invoices.len().unwrap(), 1);
        assert_eq!(
            invoices.enqueue(Invoice::default()).unwrap().as_u64(),
            12
        );
    }
}
