//! ferrodb - durability core for a paginated embedded storage engine
//!
//! This crate covers the two subsystems that make writes survive crashes:
//!
//! - The write-ahead log of page-operation records: atomic, reversible
//!   deltas applied to fixed-size pages, with a stable binary layout so
//!   historical logs can be replayed after a restart.
//! - Flush coordination for asynchronous secondary-index writers: per-writer
//!   progress trackers and a coordinator that computes the oldest LSN the
//!   log must retain before segments may be discarded.
//!
//! # Design Principles
//!
//! - Durability over throughput
//! - Explicit failure over silent recovery
//! - The truncation boundary is computed conservatively: when in doubt,
//!   nothing is discarded

pub mod flush;
pub mod observability;
pub mod page;
pub mod recovery;
pub mod wal;
