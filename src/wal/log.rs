//! Operation log interface
//!
//! The log owns LSN assignment: records carry no position until appended.
//! Iteration decodes stored frames and re-validates every checksum, so
//! corruption introduced at rest is caught on the next read, not replayed.
//!
//! Two implementations exist: [`MemoryOperationLog`] here, used by tests
//! and embedders that keep the log in the page cache's address space, and
//! the file-backed [`FileOperationLog`](super::FileOperationLog).

use std::collections::BTreeMap;

use super::errors::WalResult;
use super::lsn::Lsn;
use super::record::PageOperationRecord;

/// Append-only sequence of page-operation records ordered by LSN.
///
/// Appends are serialized by the log owner; this trait does not add its own
/// synchronization.
pub trait OperationLog {
    /// Append a record, assigning and returning its LSN.
    fn append_and_get_lsn(&mut self, record: PageOperationRecord) -> WalResult<Lsn>;

    /// All records at or after `from`, in log order.
    fn iterate_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>>;

    /// All records at or before `from`, newest first.
    fn iterate_back_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>>;

    /// Discard every record strictly older than `lsn`.
    fn truncate_before(&mut self, lsn: Lsn) -> WalResult<()>;
}

/// In-memory operation log.
///
/// Frames are stored encoded, exactly as a segment file would hold them, so
/// iteration exercises the same decode and checksum path as recovery from
/// disk.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    segment: u64,
    next_position: u64,
    frames: BTreeMap<Lsn, Vec<u8>>,
}

impl MemoryOperationLog {
    /// Create an empty log positioned at segment 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current segment and start the next one.
    pub fn roll_segment(&mut self) -> u64 {
        self.segment += 1;
        self.next_position = 0;
        self.segment
    }

    /// The segment new appends go to.
    pub fn current_segment(&self) -> u64 {
        self.segment
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl OperationLog for MemoryOperationLog {
    fn append_and_get_lsn(&mut self, record: PageOperationRecord) -> WalResult<Lsn> {
        let frame = record.to_frame();
        let lsn = Lsn::new(self.segment, self.next_position);
        self.next_position += frame.len() as u64;
        self.frames.insert(lsn, frame);
        Ok(lsn)
    }

    fn iterate_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>> {
        let mut records = Vec::new();
        for (lsn, frame) in self.frames.range(from..) {
            let (record, _) = PageOperationRecord::from_frame(frame)?;
            records.push((*lsn, record));
        }
        Ok(records)
    }

    fn iterate_back_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>> {
        let mut records = Vec::new();
        for (lsn, frame) in self.frames.range(..=from).rev() {
            let (record, _) = PageOperationRecord::from_frame(frame)?;
            records.push((*lsn, record));
        }
        Ok(records)
    }

    fn truncate_before(&mut self, lsn: Lsn) -> WalResult<()> {
        self.frames = self.frames.split_off(&lsn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(unit: u64, old: u64, new: u64) -> PageOperationRecord {
        PageOperationRecord::set_file_size(1, 0, unit, old, new)
    }

    #[test]
    fn test_append_assigns_increasing_lsns() {
        let mut log = MemoryOperationLog::new();
        let a = log.append_and_get_lsn(sample_record(1, 0, 1)).unwrap();
        let b = log.append_and_get_lsn(sample_record(1, 1, 2)).unwrap();
        assert!(a < b);
        assert_eq!(a.segment, b.segment);
    }

    #[test]
    fn test_roll_segment_advances_segment() {
        let mut log = MemoryOperationLog::new();
        let a = log.append_and_get_lsn(sample_record(1, 0, 1)).unwrap();
        log.roll_segment();
        let b = log.append_and_get_lsn(sample_record(1, 1, 2)).unwrap();
        assert_eq!(a.segment + 1, b.segment);
        assert_eq!(b.position, 0);
    }

    #[test]
    fn test_iterate_from_is_inclusive_and_ordered() {
        let mut log = MemoryOperationLog::new();
        let lsns: Vec<Lsn> = (0..5)
            .map(|i| log.append_and_get_lsn(sample_record(1, i, i + 1)).unwrap())
            .collect();

        let from_third = log.iterate_from(lsns[2]).unwrap();
        assert_eq!(from_third.len(), 3);
        assert_eq!(from_third[0].0, lsns[2]);
        assert_eq!(from_third[2].0, lsns[4]);
    }

    #[test]
    fn test_iterate_back_from_is_newest_first() {
        let mut log = MemoryOperationLog::new();
        let lsns: Vec<Lsn> = (0..4)
            .map(|i| log.append_and_get_lsn(sample_record(1, i, i + 1)).unwrap())
            .collect();

        let back = log.iterate_back_from(lsns[2]).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].0, lsns[2]);
        assert_eq!(back[2].0, lsns[0]);
    }

    #[test]
    fn test_iterate_back_from_tail() {
        let mut log = MemoryOperationLog::new();
        for i in 0..3 {
            log.append_and_get_lsn(sample_record(1, i, i + 1)).unwrap();
        }
        let all = log.iterate_back_from(Lsn::MAX).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_truncate_before_discards_strictly_older() {
        let mut log = MemoryOperationLog::new();
        let lsns: Vec<Lsn> = (0..4)
            .map(|i| log.append_and_get_lsn(sample_record(1, i, i + 1)).unwrap())
            .collect();

        log.truncate_before(lsns[2]).unwrap();
        assert_eq!(log.len(), 2);
        let remaining = log.iterate_from(Lsn::ZERO).unwrap();
        assert_eq!(remaining[0].0, lsns[2]);
    }

    #[test]
    fn test_records_roundtrip_through_log() {
        let mut log = MemoryOperationLog::new();
        let record = PageOperationRecord::write_bytes(
            2,
            5,
            10,
            100,
            b"aa".to_vec(),
            b"bb".to_vec(),
        );
        let lsn = log.append_and_get_lsn(record.clone()).unwrap();
        let read = log.iterate_from(lsn).unwrap();
        assert_eq!(read, vec![(lsn, record)]);
    }
}
