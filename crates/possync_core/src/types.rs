//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Locally assigned identifier of a pending record.
///
/// Ids are assigned by the store, increase monotonically within a
/// collection, and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key of a record inside a collection.
///
/// Auto-keyed collections (pending documents) use [`RecordKey::Auto`];
/// caller-keyed collections (reference caches) use [`RecordKey::Named`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    /// Store-generated integer key.
    Auto(RecordId),
    /// Caller-supplied key (product id, singleton sentinel).
    Named(String),
}

impl RecordKey {
    /// Creates a caller-supplied key.
    pub fn named(key: impl Into<String>) -> Self {
        Self::Named(key.into())
    }

    /// Returns the record id for auto keys.
    #[must_use]
    pub fn as_id(&self) -> Option<RecordId> {
        match self {
            Self::Auto(id) => Some(*id),
            Self::Named(_) => None,
        }
    }
}

impl From<RecordId> for RecordKey {
    fn from(id: RecordId) -> Self {
        Self::Auto(id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto(id) => write!(f, "{id}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// How records of a collection are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Keying {
    /// Store assigns increasing integer ids on `add`.
    AutoIncrement = 1,
    /// Caller supplies the key on `put`.
    Caller = 2,
}

impl Keying {
    /// Converts a byte to a keying mode.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::AutoIncrement),
            2 => Some(Self::Caller),
            _ => None,
        }
    }

    /// Converts the keying mode to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
