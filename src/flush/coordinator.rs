//! Flush coordinator
//!
//! Owns every writer's progress tracker and answers the one question the
//! log compactor cares about: up to which LSN has every consulted writer
//! durably flushed. Trackers live in a fixed array of mutex-protected
//! shard maps indexed by `writer_id % LOCK_SHARDS`, so lock selection is
//! O(1), no lock is allocated per writer, and two distinct writers only
//! contend on a shard collision.
//!
//! Cross-writer aggregates first snapshot the writer-id set by visiting
//! shards in index order, then revisit each id under its shard lock.
//! Trackers created while a snapshot scan runs are not part of that scan's
//! result.
//!
//! The coordinator is constructed explicitly and injected where needed;
//! there is no process-wide instance.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::observability::Logger;
use crate::wal::Lsn;

use super::errors::{FlushError, FlushResult};
use super::tracker::{RecordId, WriterProgressTracker};

/// Number of tracker shards. Lock selection is `writer_id % LOCK_SHARDS`.
pub const LOCK_SHARDS: usize = 128;

type Shard = Mutex<HashMap<u64, WriterProgressTracker>>;

/// Aggregates per-writer progress into a global truncation boundary.
pub struct FlushCoordinator {
    shards: Vec<Shard>,
    /// Writer ids whose work was attributed to each committed LSN
    lsn_writers: Mutex<BTreeMap<Lsn, Vec<u64>>>,
}

impl FlushCoordinator {
    /// Create a coordinator with no registered writers.
    pub fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            lsn_writers: Mutex::new(BTreeMap::new()),
        }
    }

    fn shard(&self, writer_id: u64) -> MutexGuard<'_, HashMap<u64, WriterProgressTracker>> {
        // A poisoned shard still holds consistent state: every mutation
        // under the lock is a single map update.
        self.shards[(writer_id % LOCK_SHARDS as u64) as usize]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn shard_at(&self, index: usize) -> MutexGuard<'_, HashMap<u64, WriterProgressTracker>> {
        self.shards[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lsn_writers(&self) -> MutexGuard<'_, BTreeMap<Lsn, Vec<u64>>> {
        self.lsn_writers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writer ids present at the moment of the call, ascending.
    fn writer_ids_snapshot(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        for index in 0..LOCK_SHARDS {
            ids.extend(self.shard_at(index).keys().copied());
        }
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // LSN attribution
    // ------------------------------------------------------------------

    /// Record which writers' work is attributed to `lsn`.
    ///
    /// Called when the primary log commits a batch spanning those writers.
    /// A second registration for the same LSN replaces the first.
    pub fn register_lsn_writers(&self, lsn: Lsn, writer_ids: &[u64]) {
        self.lsn_writers().insert(lsn, writer_ids.to_vec());
    }

    /// Registered LSNs at or before `referent`, ascending.
    pub fn lsns_at_or_before(&self, referent: Lsn) -> Vec<Lsn> {
        self.lsn_writers().range(..=referent).map(|(l, _)| *l).collect()
    }

    /// Writers attributed to any LSN at or before `referent`: the set that
    /// must be consulted before truncating up to it.
    pub fn writers_for_lsns_at_or_before(&self, referent: Lsn) -> BTreeSet<u64> {
        let mut writers = BTreeSet::new();
        for (_, ids) in self.lsn_writers().range(..=referent) {
            writers.extend(ids.iter().copied());
        }
        writers
    }

    // ------------------------------------------------------------------
    // Per-writer delegation
    // ------------------------------------------------------------------

    /// Record progress for one writer, creating its tracker on first use.
    pub fn track(&self, writer_id: u64, record_id: Option<RecordId>, sequence_number: u64) {
        self.shard(writer_id)
            .entry(writer_id)
            .or_default()
            .track(record_id, sequence_number);
    }

    /// Maximum sequence number the writer has seen among `observed_ids`.
    pub fn largest_sequence_number(
        &self,
        writer_id: u64,
        observed_ids: &[RecordId],
    ) -> Option<u64> {
        self.shard(writer_id)
            .get(&writer_id)
            .and_then(|t| t.largest_sequence_number(observed_ids))
    }

    /// Register the batch-boundary bijection for one writer.
    pub fn map_sequence_to_lsn(&self, writer_id: u64, lsn: Lsn, sequence_number: u64) {
        self.shard(writer_id)
            .entry(writer_id)
            .or_default()
            .map_sequence_to_lsn(lsn, sequence_number);
    }

    /// Maximum sequence number the writer mapped to any of `observed_lsns`.
    pub fn highest_mapped_sequence(&self, writer_id: u64, observed_lsns: &[Lsn]) -> Option<u64> {
        self.shard(writer_id)
            .get(&writer_id)
            .and_then(|t| t.highest_mapped_sequence(observed_lsns))
    }

    /// Advance a writer's durable high-water mark. Regressions are ignored
    /// and logged.
    pub fn set_highest_flushed(&self, writer_id: u64, sequence_number: u64) {
        let advanced = self
            .shard(writer_id)
            .entry(writer_id)
            .or_default()
            .set_highest_flushed(sequence_number);
        if !advanced {
            Logger::warn(
                "FLUSH_REGRESSION_IGNORED",
                &[
                    ("writer_id", &writer_id.to_string()),
                    ("sequence_number", &sequence_number.to_string()),
                ],
            );
        }
    }

    /// A writer's durable high-water mark, if it ever flushed.
    pub fn highest_flushed(&self, writer_id: u64) -> Option<u64> {
        self.shard(writer_id)
            .get(&writer_id)
            .and_then(|t| t.highest_flushed())
    }

    /// Record the sequence number a flush has been requested up to.
    pub fn set_pending_flush(&self, writer_id: u64, sequence_number: u64) {
        self.shard(writer_id)
            .entry(writer_id)
            .or_default()
            .set_pending_flush(sequence_number);
    }

    /// The writer's requested-but-unconfirmed flush point.
    pub fn pending_flush(&self, writer_id: u64) -> Option<u64> {
        self.shard(writer_id)
            .get(&writer_id)
            .and_then(|t| t.pending_flush())
    }

    /// Drop a writer's per-record progress at or below `sequence_number`.
    pub fn clear_seen_up_to(&self, writer_id: u64, sequence_number: u64) {
        if let Some(tracker) = self.shard(writer_id).get_mut(&writer_id) {
            tracker.clear_seen_up_to(sequence_number);
        }
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Whether any of the named writers has tracked work not yet flushed.
    ///
    /// A writer without a tracker has never reported and contributes
    /// nothing.
    pub fn has_unflushed_work(&self, writer_ids: &[u64]) -> bool {
        writer_ids.iter().any(|id| {
            self.shard(*id)
                .get(id)
                .map(|t| t.has_unflushed_work())
                .unwrap_or(false)
        })
    }

    /// Clear the unflushed flag of every writer whose progress map is
    /// empty. Snapshot semantics: trackers created during the call are not
    /// visited.
    pub fn reset_unflushed_flags(&self) {
        for id in self.writer_ids_snapshot() {
            if let Some(tracker) = self.shard(id).get_mut(&id) {
                tracker.reset_unflushed_if_empty();
            }
        }
    }

    /// Greatest LSN at or below `lsn` registered by any writer. Snapshot
    /// semantics over the writer set.
    pub fn nearest_lsn_at_or_below(&self, lsn: Lsn) -> Option<Lsn> {
        let mut best: Option<Lsn> = None;
        for id in self.writer_ids_snapshot() {
            let candidate = self.shard(id).get(&id).and_then(|t| t.nearest_lsn_at_or_below(lsn));
            if let Some(candidate) = candidate {
                if best.map(|b| candidate > b).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Highest flushed sequence number across every writer that ever
    /// flushed. Snapshot semantics over the writer set.
    pub fn highest_flushed_any(&self) -> Option<u64> {
        let mut best: Option<u64> = None;
        for id in self.writer_ids_snapshot() {
            let candidate = self.shard(id).get(&id).and_then(|t| t.highest_flushed());
            if let Some(candidate) = candidate {
                if best.map(|b| candidate > b).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Compute the newest safe truncation boundary across `writer_ids`.
    ///
    /// For every named writer, its durable high-water mark is mapped to the
    /// nearest registered sequence number at or below it, and that to its
    /// LSN. The result is the minimum such LSN: the log may discard
    /// everything strictly older, because every writer confirmed durability
    /// at or past that point.
    ///
    /// Returns `Ok(None)` when truncation is not possible yet: a named
    /// writer has never reported, never flushed, or has no registered
    /// mapping at or below its flushed mark.
    ///
    /// # Errors
    ///
    /// [`FlushError::Desynchronized`] if a writer's mapped LSN is strictly
    /// newer than `referent`: the writer claims durability past what the
    /// primary log has committed. Fatal; truncation halts for this call.
    pub fn minimal_flushed_lsn(
        &self,
        writer_ids: &[u64],
        referent: Lsn,
    ) -> FlushResult<Option<Lsn>> {
        let mut boundary: Option<Lsn> = None;

        for &writer_id in writer_ids {
            let shard = self.shard(writer_id);
            let Some(tracker) = shard.get(&writer_id) else {
                return Ok(None);
            };
            let Some(flushed) = tracker.highest_flushed() else {
                return Ok(None);
            };
            let Some(sequence) = tracker.nearest_sequence_at_or_below(flushed) else {
                return Ok(None);
            };
            let Some(lsn) = tracker.mapped_lsn(sequence) else {
                return Ok(None);
            };

            if lsn > referent {
                Logger::error(
                    "WRITER_DESYNC",
                    &[
                        ("writer_id", &writer_id.to_string()),
                        ("mapped_lsn", &lsn.to_string()),
                        ("referent_lsn", &referent.to_string()),
                    ],
                );
                return Err(FlushError::Desynchronized {
                    writer_id,
                    mapped: lsn,
                    referent,
                });
            }

            if boundary.map(|b| lsn < b).unwrap_or(true) {
                boundary = Some(lsn);
            }
        }

        if let Some(boundary) = boundary {
            Logger::info(
                "FLUSH_BOUNDARY_COMPUTED",
                &[
                    ("boundary_lsn", &boundary.to_string()),
                    ("writers", &writer_ids.len().to_string()),
                ],
            );
        }
        Ok(boundary)
    }

    /// Purge stale sequence<->LSN mappings of the named writers and the
    /// LSN attribution map, once truncation up to `lsn` has happened.
    /// Idempotent: a second call with the same boundary changes nothing.
    pub fn cleanup_up_to_lsn(&self, writer_ids: &[u64], lsn: Lsn) {
        for &writer_id in writer_ids {
            if let Some(tracker) = self.shard(writer_id).get_mut(&writer_id) {
                tracker.clear_mappings_up_to_lsn(lsn);
            }
        }
        self.lsn_writers().retain(|l, _| *l > lsn);
    }
}

impl Default for FlushCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
