//! Log writer and replay.

use crate::error::{StoreError, StoreResult};
use crate::log::entry::{compute_crc32, LogEntry, LogEntryType, LOG_MAGIC, LOG_VERSION};
use parking_lot::Mutex;
use possync_storage::StorageBackend;
use tracing::{debug, error, warn};

/// Header size for log frames.
/// magic (4) + version (2) + type (1) + length (4) = 11 bytes
const HEADER_SIZE: usize = 11;

/// CRC size.
const CRC_SIZE: usize = 4;

/// Result of reading the log from the start.
#[derive(Debug, Default)]
pub struct Replay {
    /// Entries of every valid frame, in log order.
    pub entries: Vec<LogEntry>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// Byte length of the log as found.
    pub total_len: u64,
}

impl Replay {
    /// Returns true if bytes past the valid prefix must be discarded.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.total_len
    }
}

/// Appends framed entries to a storage backend and reads them back.
pub struct LogWriter {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_write: bool,
}

impl LogWriter {
    /// Creates a log writer over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_write,
        }
    }

    /// Appends an entry and returns the offset of its frame.
    ///
    /// If the backend rejects the write or the flush, the log is cut back to
    /// where it was so a failed entry never reappears on replay and the next
    /// append starts on a frame boundary.
    pub fn append(&self, entry: &LogEntry) -> StoreResult<u64> {
        let frame = encode_frame(entry)?;

        let mut backend = self.backend.lock();
        let before = backend.size()?;

        let written = backend.append(&frame).and_then(|offset| {
            if self.sync_on_write {
                backend.flush()?;
                backend.sync()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if backend.size().map(|size| size > before).unwrap_or(false) {
                    if let Err(undo) = backend.truncate(before) {
                        warn!(offset = before, error = %undo, "could not roll back failed append");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Returns the current log size.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every frame from the start of the log.
    ///
    /// An incomplete final frame (a crash mid-append) ends the log. It is
    /// reported, not repaired; call [`LogWriter::truncate`] with
    /// [`Replay::valid_len`].
    ///
    /// # Errors
    ///
    /// A complete frame with a bad magic, unknown type, or checksum mismatch
    /// is `Corruption`. Nothing is discarded in that case.
    pub fn replay(&self) -> StoreResult<Replay> {
        let backend = self.backend.lock();
        let total_len = backend.size()?;
        let len = usize::try_from(total_len)
            .map_err(|_| StoreError::corruption("log too large to replay"))?;
        let data = backend.read_at(0, len)?;
        drop(backend);

        let mut replay = Replay {
            total_len,
            ..Replay::default()
        };
        let mut offset = 0usize;

        while offset < data.len() {
            match decode_frame(&data[offset..]) {
                Ok(Frame::Complete(entry, frame_len)) => {
                    replay.entries.push(entry);
                    offset += frame_len;
                }
                Ok(Frame::Incomplete) => {
                    debug!(offset, "incomplete final frame");
                    break;
                }
                Err(err) => {
                    error!(offset, error = %err, "corrupt log frame");
                    return Err(match err {
                        StoreError::Corruption { message } => {
                            StoreError::corruption(format!("at offset {offset}: {message}"))
                        }
                        other => other,
                    });
                }
            }
        }

        replay.valid_len = offset as u64;
        debug!(
            entries = replay.entries.len(),
            valid_len = replay.valid_len,
            "log replayed"
        );
        Ok(replay)
    }

    /// Truncates the log to `offset` bytes.
    pub fn truncate(&self, offset: u64) -> StoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }

    /// Atomically replaces the whole log with `entries`. Returns the new size.
    pub fn rewrite(&self, entries: &[LogEntry]) -> StoreResult<u64> {
        let mut data = Vec::new();
        for entry in entries {
            data.extend_from_slice(&encode_frame(entry)?);
        }

        let mut backend = self.backend.lock();
        backend.rewrite(&data)?;
        backend.sync()?;
        Ok(data.len() as u64)
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

fn encode_frame(entry: &LogEntry) -> StoreResult<Vec<u8>> {
    let body = entry.encode_body()?;
    let len = u32::try_from(body.len())
        .map_err(|_| StoreError::invalid_operation("log entry too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + body.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(entry.entry_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&body);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Decodes the frame at the start of `data`, returning the entry and the
/// frame length.
enum Frame {
    Complete(LogEntry, usize),
    Incomplete,
}

fn decode_frame(data: &[u8]) -> StoreResult<Frame> {
    if data.len() < HEADER_SIZE {
        return Ok(Frame::Incomplete);
    }

    let header = &data[..HEADER_SIZE];
    if header[0..4] != LOG_MAGIC {
        return Err(StoreError::corruption("invalid frame magic"));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > LOG_VERSION {
        return Err(StoreError::corruption(format!(
            "unsupported log version {version}"
        )));
    }

    let type_byte = header[6];
    let entry_type = LogEntryType::from_byte(type_byte)
        .ok_or_else(|| StoreError::corruption(format!("unknown entry type {type_byte}")))?;

    let body_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    let frame_len = HEADER_SIZE + body_len + CRC_SIZE;
    if data.len() < frame_len {
        return Ok(Frame::Incomplete);
    }

    let body_end = HEADER_SIZE + body_len;
    let stored_crc = u32::from_le_bytes([
        data[body_end],
        data[body_end + 1],
        data[body_end + 2],
        data[body_end + 3],
    ]);
    let computed_crc = compute_crc32(&data[..body_end]);
    if stored_crc != computed_crc {
        return Err(StoreError::corruption(format!(
            "checksum mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"
        )));
    }

    let entry = LogEntry::decode_body(entry_type, &data[HEADER_SIZE..body_end])?;
    Ok(Frame::Complete(entry, frame_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordId, RecordKey};
    use possync_storage::InMemoryBackend;

    fn put(id: u64) -> LogEntry {
        LogEntry::Put {
            collection: "pending_invoices".into(),
            key: RecordKey::Auto(RecordId::new(id)),
            value: vec![id as u8; 8],
        }
    }

    #[test]
    fn append_and_replay() {
        let log = LogWriter::new(Box::new(InMemoryBackend::new()), true);
        assert_eq!(log.append(&put(1)).unwrap(), 0);
        let second = log.append(&put(2)).unwrap();
        assert!(second > 0);

        let replay = log.replay().unwrap();
        assert_eq!(replay.entries, vec![put(1), put(2)]);
        assert!(!replay.has_torn_tail());
    }

    #[test]
    fn replay_empty_log() {
        let log = LogWriter::new(Box::new(InMemoryBackend::new()), false);
        let replay = log.replay().unwrap();
        assert!(replay.entries.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_reported() {
        let backend = InMemoryBackend::new();
        let log = LogWriter::new(Box::new(backend.clone()), false);
        log.append(&put(1)).unwrap();
        let good_len = log.size().unwrap();
        log.append(&put(2)).unwrap();

        // Simulate a crash mid-write of the second frame.
        let mut data = backend.data();
        data.truncate(data.len() - 5);
        let log = LogWriter::new(Box::new(InMemoryBackend::with_data(data)), false);

        let replay = log.replay().unwrap();
        assert_eq!(replay.entries, vec![put(1)]);
        assert_eq!(replay.valid_len, good_len);
        assert!(replay.has_torn_tail());

        log.truncate(replay.valid_len).unwrap();
        assert_eq!(log.size().unwrap(), good_len);
    }

    #[test]
    fn corrupt_checksum_is_an_error() {
        let backend = InMemoryBackend::new();
        let log = LogWriter::new(Box::new(backend.clone()), false);
        log.append(&put(1)).unwrap();
        log.append(&put(2)).unwrap();

        let mut data = backend.data();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let log = LogWriter::new(Box::new(InMemoryBackend::with_data(data)), false);

        assert!(matches!(log.replay(), Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn bad_frame_mid_log_is_an_error() {
        let backend = InMemoryBackend::new();
        let log = LogWriter::new(Box::new(backend.clone()), false);
        for id in 1..=3 {
            log.append(&put(id)).unwrap();
        }

        let mut magic = backend.data();
        magic[0] ^= 0xFF;
        let log = LogWriter::new(Box::new(InMemoryBackend::with_data(magic)), false);
        assert!(matches!(log.replay(), Err(StoreError::Corruption { .. })));

        let mut entry_type = backend.data();
        entry_type[6] = 0x7F;
        let log = LogWriter::new(Box::new(InMemoryBackend::with_data(entry_type)), false);
        assert!(matches!(log.replay(), Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn failed_append_leaves_log_unchanged() {
        let backend = InMemoryBackend::new().with_quota(64);
        let log = LogWriter::new(Box::new(backend), true);
        log.append(&put(1)).unwrap();
        let size = log.size().unwrap();

        let big = LogEntry::Put {
            collection: "pending_invoices".into(),
            key: RecordKey::Auto(RecordId::new(2)),
            value: vec![0; 128],
        };
        assert!(log.append(&big).is_err());
        assert_eq!(log.size().unwrap(), size);
        assert_eq!(log.replay().unwrap().entries.len(), 1);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let log = LogWriter::new(Box::new(InMemoryBackend::new()), false);
        for id in 1..=5 {
            log.append(&put(id)).unwrap();
        }

        let compacted = vec![
            put(5),
            LogEntry::Sequence {
                collection: "pending_invoices".into(),
                next_id: 6,
            },
        ];
        let size = log.rewrite(&compacted).unwrap();
        assert_eq!(log.size().unwrap(), size);
        assert_eq!(log.replay().unwrap().entries, compacted);
    }
}
