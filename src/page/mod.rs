//! Page buffers
//!
//! A page is a fixed-size mutable byte region owned by the page cache; the
//! durability core only applies page-operation records to buffers handed to
//! it. All accessors are bounds-checked and fixed-width little-endian, the
//! same encoding the record codec uses on disk.
//!
//! Version-state pages reserve bytes 0..8 for the page header; the scalar
//! fields mutated by page operations live at the offsets below.

use thiserror::Error;

/// Byte offset of the file-size field on a version-state page.
pub const FILE_SIZE_OFFSET: usize = 8;

/// Result type for page accessors
pub type PageResult<T> = Result<T, PageError>;

/// Errors raised by page accessors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// An access extends past the end of the page
    #[error("page access out of bounds: offset {offset} + len {len} exceeds page size {page_size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        page_size: usize,
    },
}

/// A fixed-size mutable page buffer.
///
/// The size is chosen by the owning page cache at construction and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBuffer {
    bytes: Vec<u8>,
}

impl PageBuffer {
    /// Create a zero-filled page of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Returns the page size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether the page has zero size.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the raw page content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check_range(&self, offset: usize, len: usize) -> PageResult<()> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(PageError::OutOfBounds {
                offset,
                len,
                page_size: self.bytes.len(),
            }),
        }
    }

    /// Read a little-endian u64 at the given offset.
    pub fn read_u64(&self, offset: usize) -> PageResult<u64> {
        self.check_range(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[offset..offset + 8]);
        Ok(u64::from_le_bytes(raw))
    }

    /// Write a little-endian u64 at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) -> PageResult<()> {
        self.check_range(offset, 8)?;
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Read `len` bytes starting at the given offset.
    pub fn read_bytes(&self, offset: usize, len: usize) -> PageResult<&[u8]> {
        self.check_range(offset, len)?;
        Ok(&self.bytes[offset..offset + len])
    }

    /// Write a byte run starting at the given offset.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> PageResult<()> {
        self.check_range(offset, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}
