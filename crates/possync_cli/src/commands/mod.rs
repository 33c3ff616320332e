//! CLI command implementations.

pub mod clear_cache;
pub mod compact;
pub mod inspect;
pub mod list;

use possync_core::{LocalStore, Schema, StoreConfig};
use std::path::Path;

/// Opens an existing store directory with the point-of-sale schema.
pub fn open_store(path: &Path) -> Result<LocalStore, Box<dyn std::error::Error>> {
    if !path.join("MANIFEST").exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let config = StoreConfig::default().create_if_missing(false);
    Ok(LocalStore::open(path, &Schema::point_of_sale(), config)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use possync_core::{LocalStore, Schema, StoreConfig};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Creates a store directory, lets `fill` write to it, and closes it.
    pub fn store_with(fill: impl FnOnce(&std::sync::Arc<LocalStore>)) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("till");
        let store = std::sync::Arc::new(
            LocalStore::open(&path, &Schema::point_of_sale(), StoreConfig::default()).unwrap(),
        );
        fill(&store);
        store.close().unwrap();
        (dir, path)
    }
}
