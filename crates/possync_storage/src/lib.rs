//! # possync storage
//!
//! Byte-level storage backends underneath the possync local store.
//!
//! Backends are **opaque byte stores**: they append, read back, flush, and
//! truncate bytes. They know nothing about log frames, collections, or
//! pending documents; `possync_core` owns every format decision.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral stores; supports a byte
//!   quota and an "unavailable" switch to simulate a host that refuses writes
//! - [`FileBackend`] - For on-device persistence using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use possync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"factura 1001").unwrap();
//! let data = backend.read_at(offset, 12).unwrap();
//! assert_eq!(&data, b"factura 1001");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
