//! # possync Testkit
//!
//! Test utilities for possync.
//!
//! This crate provides:
//! - Store fixtures, in memory or in a temporary directory
//! - Builders for realistic document payloads and reference snapshots
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use possync_testkit::prelude::*;
//! use possync_core::PendingQueues;
//!
//! let store = TestStore::memory();
//! let queues = PendingQueues::new(store.handle());
//! queues.invoices.enqueue(invoice("1001")).unwrap();
//! assert_eq!(queues.counts().unwrap().invoices, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builders;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builders::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use builders::*;
pub use fixtures::*;
pub use generators::*;
