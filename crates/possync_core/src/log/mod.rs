//! Append-only record log.
//!
//! Every store mutation becomes one framed entry:
//!
//! ```text
//! | magic "PLOG" (4) | version (2) | type (1) | len (4) | body (len) | crc32 (4) |
//! ```
//!
//! The CRC covers everything before it. An incomplete final frame is a torn
//! append and the store truncates it on open. Any complete frame that fails
//! validation is corruption and opening the store fails.

mod entry;
mod writer;

pub use entry::LogEntry;
pub use writer::{LogWriter, Replay};
