//! Page-operation records
//!
//! A page-operation record is a reversible, serializable delta against one
//! page, tagged with the operation unit (transaction) that produced it. The
//! record stores both the prior and the new state of the region it touches:
//! `redo` applies the new state, `undo` restores the prior one, and applying
//! `undo` after `redo` leaves the page byte-identical to where it started.
//!
//! # Wire format
//!
//! Every record shares a fixed envelope, followed by an opcode-specific
//! payload. All integers are fixed-width little-endian; the layout is
//! stable across versions because persisted logs must replay after a crash.
//!
//! ```text
//! envelope: opcode u32 | file_id u64 | page_index u64 | operation_unit_id u64
//! opcode 1 (SetFileSize): old_size u64 | new_size u64
//! opcode 2 (WriteBytes):  offset u32 | len u32 | old bytes | new bytes
//! ```
//!
//! When a record is persisted in a log segment it is wrapped in a frame:
//!
//! ```text
//! frame_len u32 | envelope + payload | crc32 u32
//! ```
//!
//! The checksum covers the length field and the body. A mismatch is
//! corruption and halts reading.

use crate::page::{self, PageBuffer};

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{WalError, WalResult};

/// Envelope size: opcode + file_id + page_index + operation_unit_id.
pub(crate) const ENVELOPE_SIZE: usize = 4 + 8 + 8 + 8;

/// Smallest possible frame: length field, envelope, the smallest payload
/// (WriteBytes with empty runs: offset + len), checksum.
pub(crate) const MIN_FRAME_SIZE: usize = 4 + ENVELOPE_SIZE + 8 + 4;

/// Operation kinds, one per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OperationKind {
    /// Scalar delta to the file-size field of a version-state page
    SetFileSize = 1,
    /// General byte-run delta to arbitrary page content
    WriteBytes = 2,
}

impl OperationKind {
    /// Convert from the wire opcode; `None` for unrecognized values.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(OperationKind::SetFileSize),
            2 => Some(OperationKind::WriteBytes),
            _ => None,
        }
    }

    /// The wire opcode.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Opcode-specific payload of a page-operation record.
///
/// Each variant stores the old and new state of the region it mutates, so
/// the operation is reversible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPayload {
    /// Replace the file-size field: `old_size` before, `new_size` after.
    SetFileSize { old_size: u64, new_size: u64 },
    /// Replace a byte run at `offset`; `old` and `new` have equal length.
    WriteBytes {
        offset: u32,
        old: Vec<u8>,
        new: Vec<u8>,
    },
}

/// A reversible, serializable mutation of one page.
///
/// The LSN is not part of the record: it is assigned by the log on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOperationRecord {
    /// File the page belongs to
    pub file_id: u64,
    /// Index of the page within the file
    pub page_index: u64,
    /// Owning transaction / operation unit
    pub operation_unit_id: u64,
    /// Operation-specific old/new state
    pub payload: OperationPayload,
}

impl PageOperationRecord {
    /// A file-size delta against the version-state page of `file_id`.
    pub fn set_file_size(
        file_id: u64,
        page_index: u64,
        operation_unit_id: u64,
        old_size: u64,
        new_size: u64,
    ) -> Self {
        Self {
            file_id,
            page_index,
            operation_unit_id,
            payload: OperationPayload::SetFileSize { old_size, new_size },
        }
    }

    /// A byte-run delta. `old` and `new` must have equal length; the length
    /// equality is what makes undo the exact inverse of redo.
    pub fn write_bytes(
        file_id: u64,
        page_index: u64,
        operation_unit_id: u64,
        offset: u32,
        old: Vec<u8>,
        new: Vec<u8>,
    ) -> Self {
        assert_eq!(
            old.len(),
            new.len(),
            "old and new byte runs must have equal length"
        );
        assert!(old.len() <= u32::MAX as usize, "byte run too long");
        Self {
            file_id,
            page_index,
            operation_unit_id,
            payload: OperationPayload::WriteBytes { offset, old, new },
        }
    }

    /// The operation kind of this record.
    pub fn kind(&self) -> OperationKind {
        match self.payload {
            OperationPayload::SetFileSize { .. } => OperationKind::SetFileSize,
            OperationPayload::WriteBytes { .. } => OperationKind::WriteBytes,
        }
    }

    /// Apply the new state to the page.
    ///
    /// Safe to call on a page already reflecting the new state: replay
    /// during recovery is idempotent.
    pub fn redo(&self, page: &mut PageBuffer) -> WalResult<()> {
        let result = match &self.payload {
            OperationPayload::SetFileSize { new_size, .. } => {
                page.write_u64(page::FILE_SIZE_OFFSET, *new_size)
            }
            OperationPayload::WriteBytes { offset, new, .. } => {
                page.write_bytes(*offset as usize, new)
            }
        };
        result.map_err(|e| {
            WalError::corrupt_record(format!(
                "redo of {:?} does not fit page {}/{}: {}",
                self.kind(),
                self.file_id,
                self.page_index,
                e
            ))
        })
    }

    /// Apply the old state back; the inverse of [`redo`](Self::redo).
    pub fn undo(&self, page: &mut PageBuffer) -> WalResult<()> {
        let result = match &self.payload {
            OperationPayload::SetFileSize { old_size, .. } => {
                page.write_u64(page::FILE_SIZE_OFFSET, *old_size)
            }
            OperationPayload::WriteBytes { offset, old, .. } => {
                page.write_bytes(*offset as usize, old)
            }
        };
        result.map_err(|e| {
            WalError::corrupt_record(format!(
                "undo of {:?} does not fit page {}/{}: {}",
                self.kind(),
                self.file_id,
                self.page_index,
                e
            ))
        })
    }

    /// Exact byte length of the encoded envelope plus payload.
    pub fn serialized_size(&self) -> usize {
        let payload = match &self.payload {
            OperationPayload::SetFileSize { .. } => 16,
            OperationPayload::WriteBytes { old, .. } => 4 + 4 + old.len() * 2,
        };
        ENVELOPE_SIZE + payload
    }

    /// Encode the record into `buf` starting at `pos`; returns the offset
    /// one past the last byte written.
    ///
    /// The caller must provide at least [`serialized_size`](Self::serialized_size)
    /// bytes from `pos`.
    pub fn write_to(&self, buf: &mut [u8], pos: usize) -> usize {
        let mut pos = put_u32(buf, pos, self.kind().as_u32());
        pos = put_u64(buf, pos, self.file_id);
        pos = put_u64(buf, pos, self.page_index);
        pos = put_u64(buf, pos, self.operation_unit_id);
        match &self.payload {
            OperationPayload::SetFileSize { old_size, new_size } => {
                pos = put_u64(buf, pos, *old_size);
                pos = put_u64(buf, pos, *new_size);
            }
            OperationPayload::WriteBytes { offset, old, new } => {
                pos = put_u32(buf, pos, *offset);
                pos = put_u32(buf, pos, old.len() as u32);
                buf[pos..pos + old.len()].copy_from_slice(old);
                pos += old.len();
                buf[pos..pos + new.len()].copy_from_slice(new);
                pos += new.len();
            }
        }
        pos
    }

    /// Decode a record from `buf` starting at `pos`; returns the record and
    /// the offset one past the last byte read.
    ///
    /// # Errors
    ///
    /// - `FERRO_WAL_CORRUPT_RECORD` for truncated or malformed input
    /// - `FERRO_WAL_UNKNOWN_OPERATION` for an unrecognized opcode
    pub fn read_from(buf: &[u8], pos: usize) -> WalResult<(Self, usize)> {
        let (opcode, pos) = get_u32(buf, pos)?;
        let kind = OperationKind::from_u32(opcode)
            .ok_or_else(|| WalError::unknown_operation(opcode))?;
        let (file_id, pos) = get_u64(buf, pos)?;
        let (page_index, pos) = get_u64(buf, pos)?;
        let (operation_unit_id, pos) = get_u64(buf, pos)?;

        let (payload, pos) = match kind {
            OperationKind::SetFileSize => {
                let (old_size, pos) = get_u64(buf, pos)?;
                let (new_size, pos) = get_u64(buf, pos)?;
                (OperationPayload::SetFileSize { old_size, new_size }, pos)
            }
            OperationKind::WriteBytes => {
                let (offset, pos) = get_u32(buf, pos)?;
                let (len, pos) = get_u32(buf, pos)?;
                let (old, pos) = get_bytes(buf, pos, len as usize)?;
                let (new, pos) = get_bytes(buf, pos, len as usize)?;
                (OperationPayload::WriteBytes { offset, old, new }, pos)
            }
        };

        Ok((
            Self {
                file_id,
                page_index,
                operation_unit_id,
                payload,
            },
            pos,
        ))
    }

    /// Encode the record as a persisted frame: length, body, CRC32.
    pub fn to_frame(&self) -> Vec<u8> {
        let body_len = self.serialized_size();
        let frame_len = 4 + body_len + 4;
        let mut frame = vec![0u8; frame_len];
        frame[0..4].copy_from_slice(&(frame_len as u32).to_le_bytes());
        let written = self.write_to(&mut frame, 4);
        debug_assert_eq!(written, 4 + body_len);
        let checksum = compute_checksum(&frame[..4 + body_len]);
        frame[4 + body_len..].copy_from_slice(&checksum.to_le_bytes());
        frame
    }

    /// Decode a persisted frame, verifying its checksum; returns the record
    /// and the total frame length consumed.
    pub fn from_frame(data: &[u8]) -> WalResult<(Self, usize)> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(WalError::corrupt_record(format!(
                "frame truncated: {} bytes, need at least {}",
                data.len(),
                MIN_FRAME_SIZE
            )));
        }

        let mut raw = [0u8; 4];
        raw.copy_from_slice(&data[0..4]);
        let frame_len = u32::from_le_bytes(raw) as usize;

        if frame_len < MIN_FRAME_SIZE {
            return Err(WalError::corrupt_record(format!(
                "invalid frame length {}",
                frame_len
            )));
        }
        if data.len() < frame_len {
            return Err(WalError::corrupt_record(format!(
                "frame truncated: expected {} bytes, got {}",
                frame_len,
                data.len()
            )));
        }

        let checksum_offset = frame_len - 4;
        raw.copy_from_slice(&data[checksum_offset..frame_len]);
        let stored = u32::from_le_bytes(raw);
        if !verify_checksum(&data[..checksum_offset], stored) {
            return Err(WalError::corrupt_record(format!(
                "frame checksum mismatch: computed {:08x}, stored {:08x}",
                compute_checksum(&data[..checksum_offset]),
                stored
            )));
        }

        let (record, pos) = Self::read_from(data, 4)?;
        if pos != checksum_offset {
            return Err(WalError::corrupt_record(format!(
                "frame length mismatch: body ends at {}, checksum at {}",
                pos, checksum_offset
            )));
        }

        Ok((record, frame_len))
    }
}

fn put_u32(buf: &mut [u8], pos: usize, value: u32) -> usize {
    buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    pos + 4
}

fn put_u64(buf: &mut [u8], pos: usize, value: u64) -> usize {
    buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    pos + 8
}

fn get_u32(buf: &[u8], pos: usize) -> WalResult<(u32, usize)> {
    let slice = pos
        .checked_add(4)
        .and_then(|end| buf.get(pos..end))
        .ok_or_else(|| truncated(pos))?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(slice);
    Ok((u32::from_le_bytes(raw), pos + 4))
}

fn get_u64(buf: &[u8], pos: usize) -> WalResult<(u64, usize)> {
    let slice = pos
        .checked_add(8)
        .and_then(|end| buf.get(pos..end))
        .ok_or_else(|| truncated(pos))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice);
    Ok((u64::from_le_bytes(raw), pos + 8))
}

fn get_bytes(buf: &[u8], pos: usize, len: usize) -> WalResult<(Vec<u8>, usize)> {
    let slice = pos
        .checked_add(len)
        .and_then(|end| buf.get(pos..end))
        .ok_or_else(|| truncated(pos))?;
    Ok((slice.to_vec(), pos + len))
}

fn truncated(pos: usize) -> WalError {
    WalError::corrupt_record(format!("record truncated at byte {}", pos))
}
