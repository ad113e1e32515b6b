//! Crash recovery
//!
//! Replays the operation log forward to bring pages back to their
//! post-crash committed state, and rolls individual operation units back
//! by applying their inverse images in reverse log order. Both walks
//! resolve pages through a caller-supplied [`PageResolver`], so recovery
//! is independent of how the page cache stores its pages.

use std::collections::HashMap;

use crate::observability::Logger;
use crate::page::PageBuffer;
use crate::wal::{Lsn, OperationLog, WalResult};

/// Resolves the in-memory page a log record targets.
///
/// Returning `None` means the page is not resident; replay counts the
/// record as skipped and rollback leaves it untouched. During full
/// recovery the resolver is expected to load pages on demand and never
/// return `None` for a file that still exists.
pub trait PageResolver {
    fn page_mut(&mut self, file_id: u64, page_index: u64) -> Option<&mut PageBuffer>;
}

/// Outcome of a forward replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records whose redo image was applied
    pub applied: u64,
    /// Records targeting a page the resolver did not produce
    pub skipped: u64,
}

/// Replay the log forward from `from`, applying each record's redo image.
///
/// Redo is idempotent, so records whose effect already reached disk before
/// the crash are safe to apply again.
///
/// # Errors
///
/// Propagates log read failures and corrupt records. Recovery halts at the
/// failing record; pages already replayed keep their state.
pub fn replay<L, R>(log: &L, from: Lsn, resolver: &mut R) -> WalResult<ReplayStats>
where
    L: OperationLog,
    R: PageResolver,
{
    let mut stats = ReplayStats::default();
    for (_, record) in log.iterate_from(from)? {
        match resolver.page_mut(record.file_id, record.page_index) {
            Some(page) => {
                record.redo(page)?;
                stats.applied += 1;
            }
            None => stats.skipped += 1,
        }
    }
    Logger::info(
        "REPLAY_COMPLETE",
        &[
            ("applied", &stats.applied.to_string()),
            ("skipped", &stats.skipped.to_string()),
        ],
    );
    Ok(stats)
}

/// Roll back one operation unit by undoing its records newest-first.
///
/// Walks the whole log backward and applies the undo image of every record
/// belonging to `operation_unit_id`. Records of other units are untouched.
/// Returns the number of records undone.
///
/// # Errors
///
/// Propagates log read failures and corrupt records.
pub fn rollback<L, R>(log: &L, operation_unit_id: u64, resolver: &mut R) -> WalResult<u64>
where
    L: OperationLog,
    R: PageResolver,
{
    let mut undone = 0u64;
    for (_, record) in log.iterate_back_from(Lsn::MAX)? {
        if record.operation_unit_id != operation_unit_id {
            continue;
        }
        if let Some(page) = resolver.page_mut(record.file_id, record.page_index) {
            record.undo(page)?;
            undone += 1;
        }
    }
    Logger::info(
        "ROLLBACK_COMPLETE",
        &[
            ("operation_unit_id", &operation_unit_id.to_string()),
            ("undone", &undone.to_string()),
        ],
    );
    Ok(undone)
}

/// In-memory page resolver keyed by `(file_id, page_index)`.
///
/// Pages are created zero-filled on first access at a fixed size.
#[derive(Debug)]
pub struct PageSet {
    page_size: usize,
    pages: HashMap<(u64, u64), PageBuffer>,
}

impl PageSet {
    /// Create an empty set whose pages are all `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: HashMap::new(),
        }
    }

    /// Immutable view of a page, if it was ever touched.
    pub fn page(&self, file_id: u64, page_index: u64) -> Option<&PageBuffer> {
        self.pages.get(&(file_id, page_index))
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no page is resident.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageResolver for PageSet {
    fn page_mut(&mut self, file_id: u64, page_index: u64) -> Option<&mut PageBuffer> {
        let page_size = self.page_size;
        Some(
            self.pages
                .entry((file_id, page_index))
                .or_insert_with(|| PageBuffer::new(page_size)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::FILE_SIZE_OFFSET;
    use crate::wal::{MemoryOperationLog, PageOperationRecord};

    const PAGE_SIZE: usize = 256;

    /// Resolver that only serves pages of one file.
    struct SingleFile {
        file_id: u64,
        inner: PageSet,
    }

    impl PageResolver for SingleFile {
        fn page_mut(&mut self, file_id: u64, page_index: u64) -> Option<&mut PageBuffer> {
            if file_id == self.file_id {
                self.inner.page_mut(file_id, page_index)
            } else {
                None
            }
        }
    }

    #[test]
    fn test_replay_applies_redo_in_order() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(3, 0, 7, 12, 42))
            .unwrap();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(3, 0, 7, 42, 99))
            .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        let stats = replay(&log, Lsn::ZERO, &mut pages).unwrap();
        assert_eq!(stats, ReplayStats { applied: 2, skipped: 0 });

        let page = pages.page(3, 0).unwrap();
        assert_eq!(page.read_u64(FILE_SIZE_OFFSET).unwrap(), 99);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::write_bytes(
            1,
            2,
            7,
            64,
            vec![0, 0, 0],
            vec![9, 8, 7],
        ))
        .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        replay(&log, Lsn::ZERO, &mut pages).unwrap();
        replay(&log, Lsn::ZERO, &mut pages).unwrap();

        let page = pages.page(1, 2).unwrap();
        assert_eq!(page.read_bytes(64, 3).unwrap(), &[9, 8, 7]);
    }

    #[test]
    fn test_replay_counts_nonresident_pages_as_skipped() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 0, 10))
            .unwrap();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(2, 0, 7, 0, 20))
            .unwrap();

        let mut resolver = SingleFile {
            file_id: 1,
            inner: PageSet::new(PAGE_SIZE),
        };
        let stats = replay(&log, Lsn::ZERO, &mut resolver).unwrap();
        assert_eq!(stats, ReplayStats { applied: 1, skipped: 1 });
    }

    #[test]
    fn test_replay_respects_start_lsn() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 0, 10))
            .unwrap();
        let second = log
            .append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 10, 20))
            .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        let stats = replay(&log, second, &mut pages).unwrap();
        assert_eq!(stats.applied, 1);
        // Only the second record ran; its redo overwrote the zeroed page.
        let page = pages.page(1, 0).unwrap();
        assert_eq!(page.read_u64(FILE_SIZE_OFFSET).unwrap(), 20);
    }

    #[test]
    fn test_rollback_undoes_one_unit_newest_first() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 12, 42))
            .unwrap();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 42, 99))
            .unwrap();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 8, 99, 100))
            .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        replay(&log, Lsn::ZERO, &mut pages).unwrap();

        // Undo unit 8, then unit 7: back to the original size.
        assert_eq!(rollback(&log, 8, &mut pages).unwrap(), 1);
        let page = pages.page(1, 0).unwrap();
        assert_eq!(page.read_u64(FILE_SIZE_OFFSET).unwrap(), 99);

        assert_eq!(rollback(&log, 7, &mut pages).unwrap(), 2);
        let page = pages.page(1, 0).unwrap();
        assert_eq!(page.read_u64(FILE_SIZE_OFFSET).unwrap(), 12);
    }

    #[test]
    fn test_rollback_of_unknown_unit_is_a_no_op() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::set_file_size(1, 0, 7, 12, 42))
            .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        replay(&log, Lsn::ZERO, &mut pages).unwrap();
        assert_eq!(rollback(&log, 999, &mut pages).unwrap(), 0);
        let page = pages.page(1, 0).unwrap();
        assert_eq!(page.read_u64(FILE_SIZE_OFFSET).unwrap(), 42);
    }

    #[test]
    fn test_write_bytes_rollback_restores_exact_bytes() {
        let mut log = MemoryOperationLog::new();
        log.append_and_get_lsn(PageOperationRecord::write_bytes(
            1,
            0,
            5,
            16,
            vec![0, 0, 0, 0],
            vec![1, 2, 3, 4],
        ))
        .unwrap();
        log.append_and_get_lsn(PageOperationRecord::write_bytes(
            1,
            0,
            5,
            18,
            vec![3, 4],
            vec![9, 9],
        ))
        .unwrap();

        let mut pages = PageSet::new(PAGE_SIZE);
        replay(&log, Lsn::ZERO, &mut pages).unwrap();
        assert_eq!(pages.page(1, 0).unwrap().read_bytes(16, 4).unwrap(), &[1, 2, 9, 9]);

        rollback(&log, 5, &mut pages).unwrap();
        assert_eq!(pages.page(1, 0).unwrap().read_bytes(16, 4).unwrap(), &[0, 0, 0, 0]);
    }
}
