//! Durable log of committed changes.
//!
//! Every record is framed as
//!
//! ```text
//! | magic "DITL" (4) | version (2) | type (1) | length (4) | payload | crc32 (4) |
//! ```
//!
//! all little-endian, the CRC covering everything before it.
//!
//! Reading stops cleanly at a truncated header or payload, which is what a
//! crash in the middle of an append leaves behind. A checksum mismatch, bad
//! magic, unknown type or newer format version is fatal: those are damage,
//! not an interrupted write.

mod log;
mod record;

pub use log::{DurableLog, LogIterator};
pub use record::{LogRecord, RecordType, LOG_MAGIC, LOG_VERSION};
