//! Clear-cache command implementation.

use super::open_store;
use possync_core::{ReferenceCache, ReferenceKind};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the clear-cache command.
pub fn run(path: &Path, kind: ReferenceKind) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let cache = ReferenceCache::new(Arc::clone(&store));

    let removed = cache.count(kind)?;
    cache.clear(kind)?;
    store.close()?;

    info!(%kind, removed, "reference cache cleared");
    println!("Cleared {} ({} entries)", kind, removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::store_with;
    use possync_core::{Product, ShiftState};

    #[test]
    fn clears_only_the_named_kind() {
        let (_dir, path) = store_with(|store| {
            let cache = ReferenceCache::new(Arc::clone(store));
            cache.replace(vec![Product::default()]).unwrap();
            cache.replace(vec![ShiftState::default()]).unwrap();
        });

        run(&path, ReferenceKind::ShiftOpenState).unwrap();

        let store = Arc::new(open_store(&path).unwrap());
        let cache = ReferenceCache::new(Arc::clone(&store));
        assert!(!cache.is_populated(ReferenceKind::ShiftOpenState).unwrap());
        assert!(cache.is_populated(ReferenceKind::ProductCatalog).unwrap());
    }
}
