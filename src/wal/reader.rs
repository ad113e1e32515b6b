//! Segment reader with strict corruption detection
//!
//! Reads page-operation frames sequentially from one segment file,
//! validating every checksum. Any corruption, including a torn frame at the
//! end of the file, fails the read immediately: no partial replay, no
//! skipping records, no repair attempts.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{WalError, WalResult};
use super::lsn::Lsn;
use super::record::{PageOperationRecord, MIN_FRAME_SIZE};

/// Sequential reader over one log segment file.
pub struct SegmentReader {
    path: PathBuf,
    reader: BufReader<File>,
    segment: u64,
    offset: u64,
    file_size: u64,
}

impl SegmentReader {
    /// Open a segment file for sequential reading.
    pub fn open(path: &Path, segment: u64) -> WalResult<Self> {
        let file = File::open(path).map_err(|e| {
            WalError::corrupt_record(format!(
                "failed to open segment file {}: {}",
                path.display(),
                e
            ))
        })?;
        let metadata = file.metadata().map_err(|e| {
            WalError::corrupt_record(format!(
                "failed to read segment metadata {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            segment,
            offset: 0,
            file_size: metadata.len(),
        })
    }

    /// The segment this reader iterates.
    pub fn segment(&self) -> u64 {
        self.segment
    }

    /// Current byte offset within the segment file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Path of the underlying segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(Some((lsn, record)))` for a valid frame, `Ok(None)` at a
    /// clean end of file, and `FERRO_WAL_CORRUPT_RECORD` for anything else.
    pub fn read_next(&mut self) -> WalResult<Option<(Lsn, PageOperationRecord)>> {
        if self.offset == self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.offset;
        if remaining < MIN_FRAME_SIZE as u64 {
            return Err(WalError::corrupt_at_offset(
                self.offset,
                format!("torn frame at end of segment: {} bytes left", remaining),
            ));
        }

        let mut len_raw = [0u8; 4];
        self.read_exact(&mut len_raw)?;
        let frame_len = u32::from_le_bytes(len_raw) as u64;

        if frame_len < MIN_FRAME_SIZE as u64 || frame_len > remaining {
            return Err(WalError::corrupt_at_offset(
                self.offset,
                format!(
                    "invalid frame length {} with {} bytes remaining",
                    frame_len, remaining
                ),
            ));
        }

        let mut frame = vec![0u8; frame_len as usize];
        frame[0..4].copy_from_slice(&len_raw);
        self.read_exact(&mut frame[4..])?;

        let (record, _) = PageOperationRecord::from_frame(&frame).map_err(|e| {
            WalError::corrupt_at_offset(self.offset, e.message().to_string())
        })?;

        let lsn = Lsn::new(self.segment, self.offset);
        self.offset += frame_len;
        Ok(Some((lsn, record)))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> WalResult<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                WalError::corrupt_at_offset(self.offset, "segment truncated mid-frame")
            } else {
                WalError::corrupt_at_offset(
                    self.offset,
                    format!("segment read failed: {}", e),
                )
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_segment(dir: &Path, name: &str, frames: &[Vec<u8>]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for frame in frames {
            file.write_all(frame).unwrap();
        }
        file.sync_all().unwrap();
        path
    }

    #[test]
    fn test_reads_frames_with_byte_offset_lsns() {
        let dir = TempDir::new().unwrap();
        let first = PageOperationRecord::set_file_size(1, 0, 1, 0, 10);
        let second = PageOperationRecord::set_file_size(1, 0, 1, 10, 20);
        let path = write_segment(
            dir.path(),
            "0.seg",
            &[first.to_frame(), second.to_frame()],
        );

        let mut reader = SegmentReader::open(&path, 0).unwrap();
        let (lsn_a, rec_a) = reader.read_next().unwrap().unwrap();
        assert_eq!(lsn_a, Lsn::new(0, 0));
        assert_eq!(rec_a, first);

        let (lsn_b, rec_b) = reader.read_next().unwrap().unwrap();
        assert_eq!(lsn_b.position, first.to_frame().len() as u64);
        assert_eq!(rec_b, second);

        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_torn_tail_is_corruption() {
        let dir = TempDir::new().unwrap();
        let record = PageOperationRecord::set_file_size(1, 0, 1, 0, 10);
        let mut frame = record.to_frame();
        frame.truncate(frame.len() - 5);
        let path = write_segment(dir.path(), "0.seg", &[frame]);

        let mut reader = SegmentReader::open(&path, 0).unwrap();
        assert!(reader.read_next().is_err());
    }

    #[test]
    fn test_corrupted_frame_is_detected() {
        let dir = TempDir::new().unwrap();
        let record = PageOperationRecord::set_file_size(1, 0, 1, 0, 10);
        let mut frame = record.to_frame();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xff;
        let path = write_segment(dir.path(), "0.seg", &[frame]);

        let mut reader = SegmentReader::open(&path, 0).unwrap();
        let err = reader.read_next().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_segment_reads_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(dir.path(), "0.seg", &[]);
        let mut reader = SegmentReader::open(&path, 0).unwrap();
        assert!(reader.read_next().unwrap().is_none());
    }
}
