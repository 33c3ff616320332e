//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for the local store.
///
/// Backends are **opaque byte stores**. The local store appends framed log
/// entries and replays them on open; the backend only guarantees that bytes
/// come back exactly as written.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` ensures all appended data is durable
/// - `rewrite` replaces the whole content atomically: after a crash the
///   backend holds either the old bytes or the new bytes, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to durable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// Stronger than `flush`: file metadata (size) is durable too.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Used to drop a torn tail left behind by a crash mid-append.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire content with `data`.
    ///
    /// Used by log compaction.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()>;
}
