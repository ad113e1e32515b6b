//! File-backed operation log
//!
//! One file per segment under `<data_dir>/wal/`, named by zero-padded
//! segment number. Every append writes one frame and fsyncs before the
//! assigned LSN is returned; an LSN handed to a caller is durable.
//!
//! Truncation is segment-granular: `truncate_before` unlinks every segment
//! file strictly older than the boundary LSN's segment, because a segment
//! can only be discarded whole.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};
use super::log::OperationLog;
use super::lsn::Lsn;
use super::reader::SegmentReader;
use super::record::PageOperationRecord;

/// Append-only, segment-per-file operation log.
#[derive(Debug)]
pub struct FileOperationLog {
    wal_dir: PathBuf,
    segment: u64,
    file: File,
    next_position: u64,
}

impl FileOperationLog {
    /// Open the log under `<data_dir>/wal`, creating it if missing.
    ///
    /// Reopening scans the newest segment to its end, validating every
    /// frame; a torn or corrupt tail is surfaced as corruption rather than
    /// silently overwritten.
    pub fn open(data_dir: &Path) -> WalResult<Self> {
        let wal_dir = data_dir.join("wal");
        if !wal_dir.exists() {
            fs::create_dir_all(&wal_dir).map_err(|e| {
                WalError::append_failed(
                    format!("failed to create WAL directory {}", wal_dir.display()),
                    e,
                )
            })?;
        }

        let segments = Self::list_segments(&wal_dir)?;
        let segment = segments.last().copied().unwrap_or(0);
        let path = Self::segment_path(&wal_dir, segment);

        let next_position = if path.exists() {
            let mut reader = SegmentReader::open(&path, segment)?;
            while reader.read_next()?.is_some() {}
            reader.offset()
        } else {
            0
        };

        let file = Self::open_segment_file(&path)?;

        Ok(Self {
            wal_dir,
            segment,
            file,
            next_position,
        })
    }

    fn open_segment_file(path: &Path) -> WalResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                WalError::append_failed(
                    format!("failed to open segment file {}", path.display()),
                    e,
                )
            })
    }

    fn segment_path(wal_dir: &Path, segment: u64) -> PathBuf {
        wal_dir.join(format!("{:020}.seg", segment))
    }

    fn parse_segment_name(path: &Path) -> Option<u64> {
        if path.extension()? != "seg" {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }

    /// Segment numbers present on disk, ascending.
    fn list_segments(wal_dir: &Path) -> WalResult<Vec<u64>> {
        let entries = fs::read_dir(wal_dir).map_err(|e| {
            WalError::append_failed(
                format!("failed to list WAL directory {}", wal_dir.display()),
                e,
            )
        })?;

        let mut segments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                WalError::append_failed("failed to read WAL directory entry", e)
            })?;
            if let Some(segment) = Self::parse_segment_name(&entry.path()) {
                segments.push(segment);
            }
        }
        segments.sort_unstable();
        Ok(segments)
    }

    /// The segment new appends go to.
    pub fn current_segment(&self) -> u64 {
        self.segment
    }

    /// Byte position the next frame will be written at.
    pub fn position(&self) -> u64 {
        self.next_position
    }

    /// Close the current segment and start the next one.
    pub fn roll_segment(&mut self) -> WalResult<u64> {
        self.fsync()?;
        let next = self.segment + 1;
        let path = Self::segment_path(&self.wal_dir, next);
        self.file = Self::open_segment_file(&path)?;
        self.segment = next;
        self.next_position = 0;
        Ok(next)
    }

    /// Explicitly fsync the current segment file.
    pub fn fsync(&self) -> WalResult<()> {
        self.file
            .sync_all()
            .map_err(|e| WalError::fsync_failed("segment fsync failed", e))
    }

    fn sync_dir(&self) -> WalResult<()> {
        let dir = File::open(&self.wal_dir).map_err(|e| {
            WalError::fsync_failed(
                format!("failed to open WAL directory {}", self.wal_dir.display()),
                e,
            )
        })?;
        dir.sync_all()
            .map_err(|e| WalError::fsync_failed("WAL directory fsync failed", e))
    }
}

impl OperationLog for FileOperationLog {
    fn append_and_get_lsn(&mut self, record: PageOperationRecord) -> WalResult<Lsn> {
        let frame = record.to_frame();
        let lsn = Lsn::new(self.segment, self.next_position);

        self.file.write_all(&frame).map_err(|e| {
            WalError::append_failed(
                format!("failed to write frame at {}", lsn),
                e,
            )
        })?;

        // fsync before the LSN is handed out; fatal if it fails
        self.file.sync_all().map_err(|e| {
            WalError::fsync_failed(format!("fsync failed after append at {}", lsn), e)
        })?;

        self.next_position += frame.len() as u64;
        Ok(lsn)
    }

    fn iterate_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>> {
        let mut records = Vec::new();
        for segment in Self::list_segments(&self.wal_dir)? {
            if segment < from.segment {
                continue;
            }
            let path = Self::segment_path(&self.wal_dir, segment);
            let mut reader = SegmentReader::open(&path, segment)?;
            while let Some((lsn, record)) = reader.read_next()? {
                if lsn >= from {
                    records.push((lsn, record));
                }
            }
        }
        Ok(records)
    }

    fn iterate_back_from(&self, from: Lsn) -> WalResult<Vec<(Lsn, PageOperationRecord)>> {
        let mut records = self.iterate_from(Lsn::ZERO)?;
        records.retain(|(lsn, _)| *lsn <= from);
        records.reverse();
        Ok(records)
    }

    fn truncate_before(&mut self, lsn: Lsn) -> WalResult<()> {
        for segment in Self::list_segments(&self.wal_dir)? {
            if segment >= lsn.segment {
                break;
            }
            let path = Self::segment_path(&self.wal_dir, segment);
            fs::remove_file(&path).map_err(|e| {
                WalError::append_failed(
                    format!("failed to remove segment file {}", path.display()),
                    e,
                )
            })?;
        }
        self.sync_dir()
    }
}
