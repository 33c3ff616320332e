//! Log entry types and body encoding.

use crate::error::{StoreError, StoreResult};
use crate::types::{RecordId, RecordKey};

/// Magic bytes identifying a log frame.
pub const LOG_MAGIC: [u8; 4] = *b"PLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const KEY_AUTO: u8 = 0;
const KEY_NAMED: u8 = 1;

/// Type of log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogEntryType {
    /// Insert or overwrite a record.
    Put = 1,
    /// Remove a record.
    Delete = 2,
    /// Remove every record of a collection.
    Clear = 3,
    /// Clear a collection and insert a batch.
    Replace = 4,
    /// Id sequence watermark of an auto-keyed collection.
    Sequence = 5,
}

impl LogEntryType {
    /// Converts a byte to an entry type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Clear),
            4 => Some(Self::Replace),
            5 => Some(Self::Sequence),
            _ => None,
        }
    }

    /// Converts the entry type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One store mutation.
///
/// Record values are opaque CBOR bytes produced by the typed layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Insert or overwrite a record.
    Put {
        /// Collection name.
        collection: String,
        /// Record key.
        key: RecordKey,
        /// Encoded record.
        value: Vec<u8>,
    },

    /// Remove a record.
    Delete {
        /// Collection name.
        collection: String,
        /// Record key.
        key: RecordKey,
    },

    /// Remove every record of a collection.
    Clear {
        /// Collection name.
        collection: String,
    },

    /// Clear a collection and insert `entries`, as one unit.
    Replace {
        /// Collection name.
        collection: String,
        /// New contents.
        entries: Vec<(RecordKey, Vec<u8>)>,
    },

    /// Next id to hand out for an auto-keyed collection.
    ///
    /// Written on compaction so ids stay unique after the records that
    /// carried them are gone.
    Sequence {
        /// Collection name.
        collection: String,
        /// Next id.
        next_id: u64,
    },
}

impl LogEntry {
    /// Returns the entry type.
    #[must_use]
    pub fn entry_type(&self) -> LogEntryType {
        match self {
            Self::Put { .. } => LogEntryType::Put,
            Self::Delete { .. } => LogEntryType::Delete,
            Self::Clear { .. } => LogEntryType::Clear,
            Self::Replace { .. } => LogEntryType::Replace,
            Self::Sequence { .. } => LogEntryType::Sequence,
        }
    }

    /// Returns the collection the entry applies to.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Put { collection, .. }
            | Self::Delete { collection, .. }
            | Self::Clear { collection }
            | Self::Replace { collection, .. }
            | Self::Sequence { collection, .. } => collection,
        }
    }

    /// Serializes the entry body (without frame).
    pub fn encode_body(&self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        put_str(&mut buf, self.collection())?;

        match self {
            Self::Put { key, value, .. } => {
                put_key(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { key, .. } => put_key(&mut buf, key)?,
            Self::Clear { .. } => {}
            Self::Replace { entries, .. } => {
                let count = u32::try_from(entries.len())
                    .map_err(|_| StoreError::invalid_operation("replace batch too large"))?;
                buf.extend_from_slice(&count.to_le_bytes());
                for (key, value) in entries {
                    put_key(&mut buf, key)?;
                    put_bytes(&mut buf, value)?;
                }
            }
            Self::Sequence { next_id, .. } => buf.extend_from_slice(&next_id.to_le_bytes()),
        }

        Ok(buf)
    }

    /// Deserializes an entry from its type and body.
    pub fn decode_body(entry_type: LogEntryType, body: &[u8]) -> StoreResult<Self> {
        let mut reader = BodyReader { body, cursor: 0 };
        let collection = reader.string()?;

        let entry = match entry_type {
            LogEntryType::Put => Self::Put {
                collection,
                key: reader.key()?,
                value: reader.bytes()?,
            },
            LogEntryType::Delete => Self::Delete {
                collection,
                key: reader.key()?,
            },
            LogEntryType::Clear => Self::Clear { collection },
            LogEntryType::Replace => {
                let count = reader.u32()? as usize;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = reader.key()?;
                    let value = reader.bytes()?;
                    entries.push((key, value));
                }
                Self::Replace {
                    collection,
                    entries,
                }
            }
            LogEntryType::Sequence => Self::Sequence {
                collection,
                next_id: reader.u64()?,
            },
        };

        if reader.cursor != body.len() {
            return Err(StoreError::corruption(format!(
                "trailing bytes in {:?} entry: expected {} bytes, got {}",
                entry_type,
                reader.cursor,
                body.len()
            )));
        }

        Ok(entry)
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> StoreResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| StoreError::invalid_operation(format!("name too long: {} bytes", s.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> StoreResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| StoreError::invalid_operation("record too large"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_key(buf: &mut Vec<u8>, key: &RecordKey) -> StoreResult<()> {
    match key {
        RecordKey::Auto(id) => {
            buf.push(KEY_AUTO);
            buf.extend_from_slice(&id.as_u64().to_le_bytes());
        }
        RecordKey::Named(name) => {
            buf.push(KEY_NAMED);
            put_str(buf, name)?;
        }
    }
    Ok(())
}

struct BodyReader<'a> {
    body: &'a [u8],
    cursor: usize,
}

impl<'a> BodyReader<'a> {
    fn take(&mut self, len: usize) -> StoreResult<&'a [u8]> {
        if self.cursor + len > self.body.len() {
            return Err(StoreError::corruption("unexpected end of entry body"));
        }
        let slice = &self.body[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| StoreError::corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn string(&mut self) -> StoreResult<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| StoreError::corruption("invalid utf-8 in entry"))
    }

    fn bytes(&mut self) -> StoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn key(&mut self) -> StoreResult<RecordKey> {
        match self.take(1)?[0] {
            KEY_AUTO => Ok(RecordKey::Auto(RecordId::new(self.u64()?))),
            KEY_NAMED => Ok(RecordKey::Named(self.string()?)),
            tag => Err(StoreError::corruption(format!("unknown key tag {tag}"))),
        }
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_byte_roundtrip() {
        for t in [
            LogEntryType::Put,
            LogEntryType::Delete,
            LogEntryType::Clear,
            LogEntryType::Replace,
            LogEntryType::Sequence,
        ] {
            assert_eq!(LogEntryType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(LogEntryType::from_byte(0), None);
    }

    #[test]
    fn replace_entry_with_mixed_keys() {
        let entry = LogEntry::Replace {
            collection: "catalog_cache".into(),
            entries: vec![
                (RecordKey::named("sku-1"), vec![1, 2]),
                (RecordKey::Auto(RecordId::new(9)), Vec::new()),
            ],
        };
        let body = entry.encode_body().unwrap();
        assert_eq!(
            LogEntry::decode_body(LogEntryType::Replace, &body).unwrap(),
            entry
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let entry = LogEntry::Clear {
            collection: "pending_payments".into(),
        };
        let mut body = entry.encode_body().unwrap();
        body.push(0);
        assert!(matches!(
            LogEntry::decode_body(LogEntryType::Clear, &body),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn truncated_body_rejected() {
        let entry = LogEntry::Put {
            collection: "pending_invoices".into(),
            key: RecordKey::Auto(RecordId::new(1)),
            value: vec![0xAA; 16],
        };
        let body = entry.encode_body().unwrap();
        assert!(LogEntry::decode_body(LogEntryType::Put, &body[..body.len() - 3]).is_err());
    }

    #[test]
    fn crc32_known_value() {
        // Standard check value for "123456789".
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }
}
