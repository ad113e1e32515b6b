//! Per-writer progress tracking
//!
//! One tracker per external writer. It remembers, per record identifier,
//! the highest sequence number the writer has processed; the bijection
//! between batch-boundary sequence numbers and log LSNs; and the writer's
//! durable high-water mark. All "not yet" states are `Option::None`, never
//! a numeric sentinel, so sequence number 0 stays a valid value.
//!
//! The tracker itself is not synchronized; the coordinator's shard lock
//! protects it (see [`FlushCoordinator`](super::FlushCoordinator)).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::wal::Lsn;

/// Stable identifier of a logical record processed by a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    /// Bucket / cluster the record lives in
    pub bucket: u32,
    /// Position within the bucket
    pub position: u64,
}

impl RecordId {
    /// Create a record identifier.
    pub fn new(bucket: u32, position: u64) -> Self {
        Self { bucket, position }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.bucket, self.position)
    }
}

/// Progress state of one external writer.
#[derive(Debug, Default)]
pub struct WriterProgressTracker {
    /// Highest sequence number observed per record; monotonic per key
    seen: HashMap<RecordId, u64>,
    /// Sequence number -> LSN at a batch boundary
    seq_to_lsn: BTreeMap<u64, Lsn>,
    /// Mirror of `seq_to_lsn`; the two always hold the same pairs
    lsn_to_seq: BTreeMap<Lsn, u64>,
    /// Highest sequence number the writer has durably persisted
    highest_flushed: Option<u64>,
    /// Sequence number a flush has been requested up to, not yet confirmed
    pending_flush: Option<u64>,
    /// Set by any track call; cleared only when `seen` is empty
    has_unflushed: bool,
}

impl WriterProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the writer processed `record_id` at `sequence_number`.
    ///
    /// A call without a record id is a heartbeat: it raises the unflushed
    /// flag and records nothing else. The stored value per record only ever
    /// increases.
    pub fn track(&mut self, record_id: Option<RecordId>, sequence_number: u64) {
        self.has_unflushed = true;
        let Some(record_id) = record_id else {
            return;
        };
        let entry = self.seen.entry(record_id).or_insert(sequence_number);
        if *entry < sequence_number {
            *entry = sequence_number;
        }
    }

    /// Maximum sequence number seen among `observed_ids`, or `None` if the
    /// set is empty or none of its members were tracked.
    pub fn largest_sequence_number(&self, observed_ids: &[RecordId]) -> Option<u64> {
        observed_ids
            .iter()
            .filter_map(|id| self.seen.get(id).copied())
            .max()
    }

    /// Register the batch-boundary bijection `sequence_number` <-> `lsn`.
    pub fn map_sequence_to_lsn(&mut self, lsn: Lsn, sequence_number: u64) {
        self.seq_to_lsn.insert(sequence_number, lsn);
        self.lsn_to_seq.insert(lsn, sequence_number);
    }

    /// Greatest registered sequence number <= `value`, or `None`.
    pub fn nearest_sequence_at_or_below(&self, value: u64) -> Option<u64> {
        self.seq_to_lsn.range(..=value).next_back().map(|(s, _)| *s)
    }

    /// Greatest registered LSN <= `lsn`, or `None`.
    pub fn nearest_lsn_at_or_below(&self, lsn: Lsn) -> Option<Lsn> {
        self.lsn_to_seq.range(..=lsn).next_back().map(|(l, _)| *l)
    }

    /// Maximum sequence number mapped to any LSN in `observed_lsns`.
    pub fn highest_mapped_sequence(&self, observed_lsns: &[Lsn]) -> Option<u64> {
        observed_lsns
            .iter()
            .filter_map(|lsn| self.lsn_to_seq.get(lsn).copied())
            .max()
    }

    /// LSN registered for exactly `sequence_number`, or `None`.
    pub fn mapped_lsn(&self, sequence_number: u64) -> Option<Lsn> {
        self.seq_to_lsn.get(&sequence_number).copied()
    }

    /// Advance the durable high-water mark.
    ///
    /// Regressions are clamped: a value at or below the current mark leaves
    /// it unchanged and returns `false`.
    pub fn set_highest_flushed(&mut self, sequence_number: u64) -> bool {
        match self.highest_flushed {
            Some(current) if sequence_number <= current => false,
            _ => {
                self.highest_flushed = Some(sequence_number);
                true
            }
        }
    }

    /// The durable high-water mark; `None` until the first flush.
    pub fn highest_flushed(&self) -> Option<u64> {
        self.highest_flushed
    }

    /// Record the sequence number a flush has been requested up to.
    pub fn set_pending_flush(&mut self, sequence_number: u64) {
        self.pending_flush = Some(sequence_number);
    }

    /// The requested-but-unconfirmed flush point, if any.
    pub fn pending_flush(&self) -> Option<u64> {
        self.pending_flush
    }

    /// Drop per-record progress entries at or below `sequence_number`.
    pub fn clear_seen_up_to(&mut self, sequence_number: u64) {
        self.seen.retain(|_, v| *v > sequence_number);
    }

    /// Drop every sequence<->LSN pair whose LSN is at or below `lsn`.
    ///
    /// Both directions of the bijection are pruned; calling twice with the
    /// same boundary is a no-op the second time.
    pub fn clear_mappings_up_to_lsn(&mut self, lsn: Lsn) {
        let stale: Vec<Lsn> = self
            .lsn_to_seq
            .range(..=lsn)
            .map(|(l, _)| *l)
            .collect();
        for l in stale {
            if let Some(seq) = self.lsn_to_seq.remove(&l) {
                self.seq_to_lsn.remove(&seq);
            }
        }
    }

    /// Clear the unflushed flag, but only if no per-record progress remains.
    pub fn reset_unflushed_if_empty(&mut self) {
        if self.seen.is_empty() {
            self.has_unflushed = false;
        }
    }

    /// Whether the writer has tracked work not yet known to be flushed.
    pub fn has_unflushed_work(&self) -> bool {
        self.has_unflushed
    }

    /// Number of registered sequence<->LSN pairs.
    pub fn mapping_len(&self) -> usize {
        self.seq_to_lsn.len()
    }
}
