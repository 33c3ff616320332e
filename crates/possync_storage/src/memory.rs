//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    data: RwLock<Vec<u8>>,
    unavailable: AtomicBool,
}

/// An in-memory storage backend.
///
/// Clones share the same buffer, so a test can keep a clone, hand the other
/// to a store, close the store, and reopen it from the same bytes.
///
/// Two failure switches model a host that refuses to persist:
/// - [`InMemoryBackend::with_quota`] fails appends past a byte limit
/// - [`InMemoryBackend::set_unavailable`] fails every write
///
/// # Example
///
/// ```rust
/// use possync_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
    quota: Option<u64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for recovery scenarios (torn tails, corrupt frames).
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let backend = Self::default();
        *backend.shared.data.write() = data;
        backend
    }

    /// Limits the total size of the buffer to `limit` bytes.
    #[must_use]
    pub fn with_quota(mut self, limit: u64) -> Self {
        self.quota = Some(limit);
        self
    }

    /// Makes every subsequent write fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.shared.data.read().clone()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.shared.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.check_available()?;
        let mut data = self.shared.data.write();
        let offset = data.len() as u64;

        if let Some(limit) = self.quota {
            let requested = offset + new_data.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }

        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_available()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.shared.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_available()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_available()?;
        let mut data = self.shared.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, current_size
                ),
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn rewrite(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.check_available()?;
        if let Some(limit) = self.quota {
            let requested = new_data.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }
        *self.shared.data.write() = new_data.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_correct_offset() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_read_at_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn memory_clones_share_buffer() {
        let backend = InMemoryBackend::new();
        let mut writer = backend.clone();
        writer.append(b"shared").unwrap();
        assert_eq!(backend.data(), b"shared");
    }

    #[test]
    fn memory_quota_rejects_overflowing_append() {
        let mut backend = InMemoryBackend::new().with_quota(8);
        backend.append(b"1234").unwrap();

        let err = backend.append(b"56789").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                requested: 9,
                limit: 8
            }
        ));
        // Nothing partial was written.
        assert_eq!(backend.size().unwrap(), 4);
    }

    #[test]
    fn memory_unavailable_fails_writes_but_not_reads() {
        let mut backend = InMemoryBackend::with_data(b"cached".to_vec());
        backend.set_unavailable(true);

        assert!(matches!(
            backend.append(b"x"),
            Err(StorageError::Unavailable)
        ));
        assert!(backend.flush().is_err());
        assert_eq!(backend.read_at(0, 6).unwrap(), b"cached");

        backend.set_unavailable(false);
        assert!(backend.append(b"x").is_ok());
    }

    #[test]
    fn memory_truncate_and_rewrite() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(backend.truncate(100).is_err());

        backend.rewrite(b"compacted").unwrap();
        assert_eq!(backend.data(), b"compacted");
    }

    proptest! {
        #[test]
        fn appended_chunks_read_back_at_their_offsets(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16)
        ) {
            let mut backend = InMemoryBackend::new();
            let offsets: Vec<u64> = chunks
                .iter()
                .map(|chunk| backend.append(chunk).unwrap())
                .collect();

            for (chunk, offset) in chunks.iter().zip(offsets) {
                prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}
