//! Write-Ahead Log subsystem for ferrodb
//!
//! The WAL is an append-only sequence of page-operation records ordered by
//! log sequence number (LSN). Records are the unit of redo and undo: each
//! one captures both the old and the new state of the page region it
//! touches, so the log can roll a crashed database forward and roll an
//! aborted operation unit back.
//!
//! # Invariants Enforced
//!
//! - Every persisted record carries a CRC32 checksum; any mismatch halts
//!   reading immediately (no partial replay, no skipping, no repair)
//! - The binary layout of a record is fixed-width little-endian and stable
//!   across process restarts
//! - Appends are followed by fsync before the assigned LSN is returned
//! - Truncation never removes the segment a retained LSN points into

mod checksum;
mod errors;
mod log;
mod lsn;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{Severity, WalError, WalErrorCode, WalResult};
pub use log::{MemoryOperationLog, OperationLog};
pub use lsn::Lsn;
pub use reader::SegmentReader;
pub use record::{OperationKind, OperationPayload, PageOperationRecord};
pub use writer::FileOperationLog;
