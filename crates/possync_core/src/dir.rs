//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ MANIFEST          # Schema version and collection registry
//! ├─ LOCK              # Advisory lock for single-process access
//! └─ store.log         # Append-only record log
//! ```

use crate::error::{StoreError, StoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";

/// Owns the store directory and its exclusive lock.
///
/// Only one `StoreDir` can exist per directory at a time; the lock is
/// released when it is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock ([`StoreError::Locked`])
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the path to the MANIFEST file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Loads the manifest, or `None` for a fresh directory.
    pub fn load_manifest(&self) -> StoreResult<Option<Manifest>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&manifest_path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }

        Manifest::decode(&data).map(Some)
    }

    /// Saves the manifest atomically (write temp, sync, rename, sync dir).
    pub fn save_manifest(&self, manifest: &Manifest) -> StoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(&manifest.encode())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced.
        Ok(())
    }
}
