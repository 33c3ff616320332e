//! # possync Core
//!
//! On-device durability for the point-of-sale client.
//!
//! This crate provides:
//! - [`LocalStore`]: named record collections over a crash-safe log
//! - [`PendingQueue`]: typed queues of documents awaiting delivery
//! - [`ReferenceCache`]: full-replace snapshots of reference data
//!
//! Nothing here talks to the network; see `possync_sync_engine` for that.
//!
//! ## Example
//!
//! ```rust
//! use possync_core::{Invoice, LocalStore, PendingQueues, Schema};
//! use std::sync::Arc;
//!
//! let store = Arc::new(LocalStore::open_in_memory(&Schema::point_of_sale())?);
//! let queues = PendingQueues::new(store);
//!
//! let id = queues.invoices.enqueue(Invoice {
//!     invoice_number: "1001".into(),
//!     total: "150.00".into(),
//!     ..Invoice::default()
//! })?;
//! assert_eq!(queues.counts()?.invoices, 1);
//! # let _ = id;
//! # Ok::<(), possync_core::StoreError>(())
//! ```

mod cache;
mod codec;
mod config;
mod dir;
mod document;
mod error;
mod log;
mod manifest;
mod queue;
mod reference;
mod schema;
mod store;
mod types;

pub use cache::{CacheEntry, ReferenceCache};
pub use codec::{from_cbor, to_cbor};
pub use config::StoreConfig;
pub use document::{
    DeliveryOrder, Document, DocumentKind, Expense, Invoice, Payment, PendingRecord,
};
pub use error::{StoreError, StoreResult};
pub use log::{LogEntry, LogWriter, Replay};
pub use manifest::Manifest;
pub use queue::{PendingCounts, PendingQueue, PendingQueues, StalledRecord};
pub use reference::{
    BusinessProfile, FiscalAssignment, Product, Reference, ReferenceKind, ShiftState,
    SINGLETON_KEY,
};
pub use schema::{CollectionDef, Schema, POINT_OF_SALE_SCHEMA_VERSION};
pub use store::{CompactionStats, LocalStore, SharedStore};
pub use types::{now_millis, EpochMillis, Keying, RecordId, RecordKey};

// Re-export storage types for convenience
pub use possync_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
