//! Durable local store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::log::{LogEntry, LogWriter};
use crate::manifest::Manifest;
use crate::schema::Schema;
use crate::types::{Keying, RecordId, RecordKey};
use parking_lot::{Mutex, RwLock};
use possync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Collection {
    keying: Keying,
    next_id: u64,
    records: BTreeMap<RecordKey, Vec<u8>>,
}

impl Collection {
    fn new(keying: Keying) -> Self {
        Self {
            keying,
            next_id: 1,
            records: BTreeMap::new(),
        }
    }

    fn observe_key(&mut self, key: &RecordKey) {
        if let RecordKey::Auto(id) = key {
            self.next_id = self.next_id.max(id.as_u64() + 1);
        }
    }

    fn apply(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Put { key, value, .. } => {
                self.observe_key(&key);
                self.records.insert(key, value);
            }
            LogEntry::Delete { key, .. } => {
                self.records.remove(&key);
            }
            LogEntry::Clear { .. } => self.records.clear(),
            LogEntry::Replace { entries, .. } => {
                self.records.clear();
                for (key, value) in entries {
                    self.observe_key(&key);
                    self.records.insert(key, value);
                }
            }
            LogEntry::Sequence { next_id, .. } => {
                self.next_id = self.next_id.max(next_id);
            }
        }
    }
}

/// Size of the log before and after a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// The on-device store.
///
/// A `LocalStore` holds named collections of opaque records. Every mutation
/// is appended to the record log (and flushed when `sync_on_commit` is set)
/// before it becomes visible, so anything a caller has seen succeed survives
/// a crash.
///
/// All operations are short synchronous critical sections; callers in async
/// code never hold a store lock across an `.await`.
///
/// # Opening
///
/// ```rust,no_run
/// use possync_core::{LocalStore, Schema, StoreConfig};
/// use std::path::Path;
///
/// let store = LocalStore::open(
///     Path::new("till-data"),
///     &Schema::point_of_sale(),
///     StoreConfig::default(),
/// )?;
/// # Ok::<(), possync_core::StoreError>(())
/// ```
pub struct LocalStore {
    config: StoreConfig,
    /// Directory lock holder; `None` for backend-only stores and after close.
    dir: Mutex<Option<StoreDir>>,
    manifest: RwLock<Manifest>,
    log: LogWriter,
    collections: RwLock<HashMap<String, Collection>>,
    is_open: RwLock<bool>,
}

impl LocalStore {
    /// Opens (or creates) a store directory and brings it to `schema`.
    ///
    /// # Errors
    ///
    /// - Another process has the directory locked (`Locked`)
    /// - The stored schema is newer than `schema` (`SchemaMismatch`)
    /// - I/O errors occur
    pub fn open(path: &Path, schema: &Schema, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;

        let mut manifest = dir.load_manifest()?.unwrap_or_default();
        if manifest.upgrade_to(schema)? {
            info!(
                path = %path.display(),
                schema_version = manifest.schema_version,
                "store schema upgraded"
            );
            dir.save_manifest(&manifest)?;
        }

        let backend = FileBackend::open(&dir.log_path())?;
        let store = Self::recover(config, Some(dir), manifest, Box::new(backend))?;
        store.maybe_compact()?;
        Ok(store)
    }

    /// Opens a store over an arbitrary log backend.
    ///
    /// No manifest is persisted; collections come from `schema` and from
    /// whatever the log already contains.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        schema: &Schema,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let mut manifest = Manifest::default();
        manifest.upgrade_to(schema)?;
        Self::recover(config, None, manifest, backend)
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory(schema: &Schema) -> StoreResult<Self> {
        Self::open_with_backend(
            Box::new(InMemoryBackend::new()),
            schema,
            StoreConfig::default(),
        )
    }

    fn recover(
        config: StoreConfig,
        dir: Option<StoreDir>,
        manifest: Manifest,
        backend: Box<dyn StorageBackend>,
    ) -> StoreResult<Self> {
        let log = LogWriter::new(backend, config.sync_on_commit);

        let mut collections: HashMap<String, Collection> = manifest
            .collections
            .iter()
            .map(|(name, keying)| (name.clone(), Collection::new(*keying)))
            .collect();

        let replay = log.replay()?;
        if replay.has_torn_tail() {
            warn!(
                valid_len = replay.valid_len,
                discarded = replay.total_len - replay.valid_len,
                "discarding torn log tail"
            );
            log.truncate(replay.valid_len)?;
        }

        let entry_count = replay.entries.len();
        for entry in replay.entries {
            let name = entry.collection().to_string();
            let collection = collections.entry(name).or_insert_with_key(|name| {
                let keying = infer_keying(&entry);
                warn!(collection = %name, ?keying, "log references unregistered collection");
                Collection::new(keying)
            });
            collection.apply(entry);
        }

        debug!(
            entries = entry_count,
            collections = collections.len(),
            "store recovered"
        );

        Ok(Self {
            config,
            dir: Mutex::new(dir),
            manifest: RwLock::new(manifest),
            log,
            collections: RwLock::new(collections),
            is_open: RwLock::new(true),
        })
    }

    fn maybe_compact(&self) -> StoreResult<()> {
        let threshold = self.config.compact_threshold;
        if threshold > 0 && self.log.size()? > threshold {
            let stats = self.compact()?;
            info!(
                bytes_before = stats.bytes_before,
                bytes_after = stats.bytes_after,
                "log compacted on open"
            );
        }
        Ok(())
    }

    /// Inserts `value` into an auto-keyed collection and returns its new id.
    pub fn add(&self, collection: &str, value: Vec<u8>) -> StoreResult<RecordId> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;

        if state.keying != Keying::AutoIncrement {
            return Err(StoreError::invalid_operation(format!(
                "collection {collection} is not auto-keyed"
            )));
        }

        let id = RecordId::new(state.next_id);
        let entry = LogEntry::Put {
            collection: collection.to_string(),
            key: RecordKey::Auto(id),
            value,
        };
        self.log.append(&entry)?;
        state.apply(entry);

        Ok(id)
    }

    /// Returns every record of a collection in key order.
    pub fn get_all(&self, collection: &str) -> StoreResult<Vec<(RecordKey, Vec<u8>)>> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let state = lookup(&collections, collection)?;
        Ok(state
            .records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Returns a record, or `None` if no record has that key.
    pub fn get(&self, collection: &str, key: &RecordKey) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        let collections = self.collections.read();
        Ok(lookup(&collections, collection)?.records.get(key).cloned())
    }

    /// Returns the number of records in a collection.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let collections = self.collections.read();
        Ok(lookup(&collections, collection)?.records.len())
    }

    /// Writes a record under `key`, overwriting any previous value.
    ///
    /// Auto-keyed collections only accept ids the store has already issued.
    pub fn put(&self, collection: &str, key: RecordKey, value: Vec<u8>) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;
        check_key(collection, state, &key)?;

        let entry = LogEntry::Put {
            collection: collection.to_string(),
            key,
            value,
        };
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(())
    }

    /// Rewrites a record in place with `f`, under the store lock.
    ///
    /// Returns `false` without calling `f` if the record is absent, so a
    /// concurrent delete is never undone.
    pub fn update<F>(&self, collection: &str, key: &RecordKey, f: F) -> StoreResult<bool>
    where
        F: FnOnce(&[u8]) -> StoreResult<Vec<u8>>,
    {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;

        let Some(current) = state.records.get(key) else {
            return Ok(false);
        };
        let value = f(current)?;

        let entry = LogEntry::Put {
            collection: collection.to_string(),
            key: key.clone(),
            value,
        };
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(true)
    }

    /// Removes a record. Removing an absent key is a no-op.
    pub fn delete(&self, collection: &str, key: &RecordKey) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;

        if !state.records.contains_key(key) {
            return Ok(());
        }

        let entry = LogEntry::Delete {
            collection: collection.to_string(),
            key: key.clone(),
        };
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(())
    }

    /// Removes every record of a collection. Issued ids stay retired.
    pub fn clear(&self, collection: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;

        let entry = LogEntry::Clear {
            collection: collection.to_string(),
        };
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(())
    }

    /// Replaces the whole contents of a collection as one log entry.
    ///
    /// Readers see either the old contents or the new, never a mix.
    pub fn replace_all(
        &self,
        collection: &str,
        entries: Vec<(RecordKey, Vec<u8>)>,
    ) -> StoreResult<()> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let state = lookup_mut(&mut collections, collection)?;
        for (key, _) in &entries {
            check_key(collection, state, key)?;
        }

        let entry = LogEntry::Replace {
            collection: collection.to_string(),
            entries,
        };
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(())
    }

    /// Rewrites the log to hold only live records and id sequences.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        self.ensure_open()?;
        // Write lock blocks mutations for the duration of the rewrite.
        let collections = self.collections.write();
        let bytes_before = self.log.size()?;

        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();

        let mut entries = Vec::new();
        for name in names {
            let state = &collections[name];
            if state.keying == Keying::AutoIncrement {
                entries.push(LogEntry::Sequence {
                    collection: name.clone(),
                    next_id: state.next_id,
                });
            }
            if !state.records.is_empty() {
                entries.push(LogEntry::Replace {
                    collection: name.clone(),
                    entries: state
                        .records
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                });
            }
        }

        let bytes_after = self.log.rewrite(&entries)?;
        debug!(bytes_before, bytes_after, "log compacted");

        Ok(CompactionStats {
            bytes_before,
            bytes_after,
        })
    }

    /// Returns the names of all registered collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the schema version the store was opened with.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.manifest.read().schema_version
    }

    /// Returns the current log size in bytes.
    pub fn log_size(&self) -> StoreResult<u64> {
        self.log.size()
    }

    /// Returns the store directory, if file-backed and still open.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    /// Returns store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Closes the store and releases the directory lock.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> StoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }

        if let Some(dir) = self.dir.lock().take() {
            dir.save_manifest(&self.manifest.read())?;
        }

        *is_open = false;
        debug!("store closed");
        Ok(())
    }

    /// Checks if the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("schema_version", &self.schema_version())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn lookup<'a>(
    collections: &'a HashMap<String, Collection>,
    name: &str,
) -> StoreResult<&'a Collection> {
    collections
        .get(name)
        .ok_or_else(|| StoreError::unknown_collection(name))
}

fn lookup_mut<'a>(
    collections: &'a mut HashMap<String, Collection>,
    name: &str,
) -> StoreResult<&'a mut Collection> {
    collections
        .get_mut(name)
        .ok_or_else(|| StoreError::unknown_collection(name))
}

fn check_key(collection: &str, state: &Collection, key: &RecordKey) -> StoreResult<()> {
    match (state.keying, key) {
        (Keying::Caller, RecordKey::Named(_)) => Ok(()),
        (Keying::AutoIncrement, RecordKey::Auto(id)) if id.as_u64() < state.next_id => Ok(()),
        (Keying::AutoIncrement, RecordKey::Auto(id)) => Err(StoreError::invalid_operation(
            format!("id {id} was never issued in {collection}"),
        )),
        _ => Err(StoreError::invalid_operation(format!(
            "key {key} does not match keying of {collection}"
        ))),
    }
}

fn infer_keying(entry: &LogEntry) -> Keying {
    let auto = match entry {
        LogEntry::Put { key, .. } | LogEntry::Delete { key, .. } => {
            matches!(key, RecordKey::Auto(_))
        }
        LogEntry::Replace { entries, .. } => entries
            .first()
            .map(|(k, _)| matches!(k, RecordKey::Auto(_)))
            .unwrap_or(false),
        LogEntry::Sequence { .. } => true,
        LogEntry::Clear { .. } => false,
    };
    if auto {
        Keying::AutoIncrement
    } else {
        Keying::Caller
    }
}

/// A lazily opened store handle shared by every caller.
///
/// The first `get_or_open` opens the store; later calls return the same
/// `Arc` until the store is closed, after which the next call reopens it.
#[derive(Debug)]
pub struct SharedStore {
    path: PathBuf,
    schema: Schema,
    config: StoreConfig,
    cell: Mutex<Option<Arc<LocalStore>>>,
}

impl SharedStore {
    /// Creates an unopened shared handle.
    pub fn new(path: impl Into<PathBuf>, schema: Schema, config: StoreConfig) -> Self {
        Self {
            path: path.into(),
            schema,
            config,
            cell: Mutex::new(None),
        }
    }

    /// Returns the open store, opening it on first use.
    pub fn get_or_open(&self) -> StoreResult<Arc<LocalStore>> {
        let mut cell = self.cell.lock();
        if let Some(store) = cell.as_ref().filter(|s| s.is_open()) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(LocalStore::open(
            &self.path,
            &self.schema,
            self.config.clone(),
        )?);
        *cell = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Closes the store if it is open.
    pub fn close(&self) -> StoreResult<()> {
        match self.cell.lock().take() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }
}
