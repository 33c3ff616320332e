//! Store manifest: schema version and collection registry.

use crate::error::{StoreError, StoreResult};
use crate::schema::Schema;
use crate::types::Keying;
use std::collections::BTreeMap;

/// Magic bytes for the manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"PMFN";

/// Current manifest encoding version.
pub const MANIFEST_VERSION: u16 = 1;

/// Persistent description of what the store contains.
///
/// The manifest stores:
/// - The schema version the store was last opened with
/// - Every collection ever registered, with its keying mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Schema version.
    pub schema_version: u32,
    /// Collection name to keying mode.
    pub collections: BTreeMap<String, Keying>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Manifest {
    /// Creates a new empty manifest.
    #[must_use]
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            collections: BTreeMap::new(),
        }
    }

    /// Gets the keying mode of a collection.
    #[must_use]
    pub fn keying(&self, name: &str) -> Option<Keying> {
        self.collections.get(name).copied()
    }

    /// Brings the manifest up to `schema`.
    ///
    /// Missing collections are registered; existing ones are left alone.
    /// Returns `true` when the manifest changed and must be persisted.
    ///
    /// # Errors
    ///
    /// - The stored schema is newer than `schema` (written by a newer build)
    /// - A collection changes keying mode between versions
    pub fn upgrade_to(&mut self, schema: &Schema) -> StoreResult<bool> {
        if self.schema_version > schema.version() {
            return Err(StoreError::schema_mismatch(format!(
                "store is at schema version {}, this build supports up to {}",
                self.schema_version,
                schema.version()
            )));
        }

        let mut changed = self.schema_version != schema.version();

        for def in schema.collections() {
            match self.collections.get(def.name()) {
                Some(&existing) if existing != def.keying() => {
                    return Err(StoreError::schema_mismatch(format!(
                        "collection {} changed keying from {:?} to {:?}",
                        def.name(),
                        existing,
                        def.keying()
                    )));
                }
                Some(_) => {}
                None => {
                    self.collections
                        .insert(def.name().to_string(), def.keying());
                    changed = true;
                }
            }
        }

        self.schema_version = schema.version();
        Ok(changed)
    }

    /// Encodes the manifest to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.schema_version.to_le_bytes());

        let count = u32::try_from(self.collections.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&count.to_le_bytes());

        for (name, keying) in &self.collections {
            let name_bytes = name.as_bytes();
            let name_len = u16::try_from(name_bytes.len()).unwrap_or(u16::MAX);
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(&name_bytes[..name_len as usize]);
            buf.push(keying.as_byte());
        }

        buf
    }

    /// Decodes a manifest from bytes.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let mut reader = Reader { data, cursor: 0 };

        if reader.take(4)? != MANIFEST_MAGIC {
            return Err(StoreError::corruption("invalid manifest magic"));
        }

        let version = reader.u16()?;
        if version > MANIFEST_VERSION {
            return Err(StoreError::schema_mismatch(format!(
                "unsupported manifest version: {version}"
            )));
        }

        let schema_version = reader.u32()?;
        let count = reader.u32()? as usize;

        let mut collections = BTreeMap::new();
        for _ in 0..count {
            let name_len = reader.u16()? as usize;
            let name = std::str::from_utf8(reader.take(name_len)?)
                .map_err(|_| StoreError::corruption("invalid collection name"))?
                .to_string();
            let keying = Keying::from_byte(reader.u8()?)
                .ok_or_else(|| StoreError::corruption("invalid keying mode"))?;
            collections.insert(name, keying);
        }

        Ok(Self {
            schema_version,
            collections,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> StoreResult<&'a [u8]> {
        if self.cursor + len > self.data.len() {
            return Err(StoreError::corruption("manifest too short"));
        }
        let slice = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
