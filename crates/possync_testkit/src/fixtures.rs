//! Store fixtures.
//!
//! Both flavours can be closed and reopened over the same bytes, which is
//! what durability tests need.

use possync_core::{LocalStore, Schema, StoreConfig};
use possync_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

enum Medium {
    Memory(InMemoryBackend),
    Dir { _temp: TempDir, path: PathBuf },
}

/// A point-of-sale store with automatic cleanup.
pub struct TestStore {
    store: Arc<LocalStore>,
    schema: Schema,
    medium: Medium,
}

impl TestStore {
    /// Creates an in-memory store with the point-of-sale schema.
    pub fn memory() -> Self {
        Self::memory_with_backend(InMemoryBackend::new())
    }

    /// Creates an in-memory store over `backend`.
    ///
    /// Keep a clone of the backend to flip its failure switches.
    pub fn memory_with_backend(backend: InMemoryBackend) -> Self {
        let schema = Schema::point_of_sale();
        let store = LocalStore::open_with_backend(
            Box::new(backend.clone()),
            &schema,
            StoreConfig::default(),
        )
        .expect("Failed to open in-memory store");
        Self {
            store: Arc::new(store),
            schema,
            medium: Medium::Memory(backend),
        }
    }

    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(StoreConfig::default())
    }

    /// Creates a store in a fresh temporary directory with `config`.
    pub fn file_with_config(config: StoreConfig) -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = temp.path().join("store");
        let schema = Schema::point_of_sale();
        let store = LocalStore::open(&path, &schema, config).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            schema,
            medium: Medium::Dir { _temp: temp, path },
        }
    }

    /// Returns a shared handle to the store.
    pub fn handle(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.medium {
            Medium::Memory(_) => None,
            Medium::Dir { path, .. } => Some(path.as_path()),
        }
    }

    /// Returns the backend if in-memory.
    pub fn backend(&self) -> Option<&InMemoryBackend> {
        match &self.medium {
            Medium::Memory(backend) => Some(backend),
            Medium::Dir { .. } => None,
        }
    }

    /// Closes the store and opens it again over the same data.
    ///
    /// Handles obtained before the call keep pointing at the closed store.
    pub fn reopen(&mut self) {
        self.store.close().expect("Failed to close store");
        let store = match &self.medium {
            Medium::Memory(backend) => LocalStore::open_with_backend(
                Box::new(backend.clone()),
                &self.schema,
                StoreConfig::default(),
            ),
            Medium::Dir { path, .. } => {
                LocalStore::open(path, &self.schema, self.store.config().clone())
            }
        }
        .expect("Failed to reopen store");
        self.store = Arc::new(store);
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(Arc<LocalStore>) -> R,
{
    let store = TestStore::memory();
    f(store.handle())
}

/// Runs a test with a store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(Arc<LocalStore>, &Path) -> R,
{
    let store = TestStore::file();
    let path = store.path().expect("File store should have a path").to_path_buf();
    f(store.handle(), &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::invoice;
    use possync_core::PendingQueues;

    #[test]
    fn memory_store_survives_reopen() {
        let mut store = TestStore::memory();
        PendingQueues::new(store.handle())
            .invoices
            .enqueue(invoice("1"))
            .unwrap();

        store.reopen();
        assert_eq!(PendingQueues::new(store.handle()).counts().unwrap().invoices, 1);
    }

    #[test]
    fn file_store_survives_reopen() {
        let mut store = TestStore::file();
        assert!(store.path().unwrap().exists());
        PendingQueues::new(store.handle())
            .payments
            .enqueue(Default::default())
            .unwrap();

        store.reopen();
        assert_eq!(PendingQueues::new(store.handle()).counts().unwrap().payments, 1);
    }

    #[test]
    fn helpers_hand_out_open_stores() {
        with_temp_store(|store| assert!(store.is_open()));
        with_file_store(|store, path| {
            assert!(store.is_open());
            assert!(path.join("MANIFEST").exists());
        });
    }
}
