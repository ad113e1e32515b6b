//! Flush coordination for asynchronous secondary-index writers
//!
//! Secondary-index writers (full-text, spatial) apply committed changes
//! out-of-band and report their own progress as writer-local sequence
//! numbers. The primary log can only discard a segment once every writer
//! has durably flushed past it; the types here track that progress and
//! compute the safe truncation boundary.
//!
//! # Invariants
//!
//! - A tracked sequence number per record only ever increases
//! - `highest_flushed`, once set, is non-decreasing
//! - The LSN mapped to a writer's flushed progress is never newer than the
//!   durable point of the primary log; a violation is a fatal
//!   desynchronization
//! - The truncation boundary is the minimum flushed LSN across writers, and
//!   is absent while any consulted writer has never flushed

mod coordinator;
mod errors;
mod tracker;

pub use coordinator::{FlushCoordinator, LOCK_SHARDS};
pub use errors::{FlushError, FlushResult};
pub use tracker::{RecordId, WriterProgressTracker};
