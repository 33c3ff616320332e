//! # possync Sync Engine
//!
//! Moves queued documents and reference data between the till and the
//! backend.
//!
//! This crate provides:
//! - [`RemoteStore`]: the backend as seen from the till, with an HTTP/JSON
//!   implementation ([`HttpRemote`]) and a scripted [`MockRemote`]
//! - [`ConnectivityMonitor`]: online state plus a reconnect event
//! - [`Synchronizer`]: drains every pending queue in one pass
//! - [`CacheRefresher`]: fetches reference data into the local cache
//! - [`OfflineSystem`]: the startup sequence and the facade the UI calls
//!
//! ## Passes
//!
//! A pass sends invoices, then payments, then expenses, then delivery
//! orders, oldest record first within each kind. A failure bumps the
//! record's attempt count and the pass carries on. Passes are triggered by
//! a fixed timer, by reconnection, and by [`OfflineSystem::sync_now`]; they
//! never overlap.
//!
//! ## Key Invariants
//!
//! - A record leaves its queue only after the remote accepted it
//! - Records are never discarded for failing too often
//! - Local bookkeeping fields are never sent to the remote
//! - Inserts carry no idempotency key, so a lost acknowledgement can
//!   duplicate a remote row

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod http;
mod refresher;
mod remote;
mod scheduler;
mod synchronizer;
mod system;

pub use config::{RetryConfig, SyncConfig, MAX_RETRY_DELAY};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use error::{SyncError, SyncResult};
pub use http::{document_endpoint, reference_endpoint, HttpClient, HttpRemote, HttpResponse};
pub use refresher::CacheRefresher;
pub use remote::{MockOutcome, MockRemote, RemoteStore};
pub use scheduler::{spawn as spawn_scheduler, SchedulerHandle};
pub use synchronizer::{KindSummary, PassSummary, SyncStats, Synchronizer};
pub use system::OfflineSystem;
