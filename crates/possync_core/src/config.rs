//! Local store configuration.

/// Configuration for opening a local store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the log after every mutation.
    ///
    /// Pending documents are only durable once flushed, so this stays on
    /// outside of benchmarks.
    pub sync_on_commit: bool,

    /// Log size (bytes) above which `open` compacts the log.
    /// Zero disables automatic compaction.
    pub compact_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            compact_threshold: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush the log on every mutation.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the automatic compaction threshold.
    #[must_use]
    pub const fn compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }
}
