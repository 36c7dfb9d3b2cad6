//! Byte ranges.
//!
//! A [`ByteRange`] addresses part of a stored value, relative to its start.
//! Chunk locators in a [`Manifest`](crate::manifest::Manifest) point into source files with a byte range,
//! and stores resolve those ranges with [`ReadableStorageTraits::get_byte_range`](crate::storage::ReadableStorageTraits::get_byte_range).

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range from the start of a value.
///
/// If the byte length is [`None`], the range extends to the end of the value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ByteRange {
    offset: ByteOffset,
    length: Option<ByteLength>,
}

impl ByteRange {
    /// The byte range covering an entire value.
    pub const ALL: Self = Self::new(0, None);

    /// Create a new byte range.
    #[must_use]
    pub const fn new(offset: ByteOffset, length: Option<ByteLength>) -> Self {
        Self { offset, length }
    }

    /// Return the start of the byte range.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.offset
    }

    /// Return the exclusive end of a byte range. `size` is the size of the entire value.
    ///
    /// Saturates at [`u64::MAX`].
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        self.length
            .map_or(size, |length| self.offset.saturating_add(length))
    }

    /// Return the length of a byte range. `size` is the size of the entire value.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        self.length
            .unwrap_or_else(|| size.saturating_sub(self.offset))
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub fn to_range(&self, size: u64) -> Range<u64> {
        self.start()..self.end(size)
    }

    /// Returns true if the byte range lies within a value of `size` bytes.
    ///
    /// A range whose end overflows [`u64`] never does.
    #[must_use]
    pub fn is_within(&self, size: u64) -> bool {
        self.offset
            .checked_add(self.length.unwrap_or(0))
            .is_some_and(|end| end <= size)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        if self.offset != 0 {
            write!(f, "{}", self.offset)?;
        }
        f.write_str("..")?;
        if let Some(length) = self.length {
            match self.offset.checked_add(length) {
                Some(end) => write!(f, "{end}")?,
                None => write!(f, "+{length}")?,
            }
        }
        Ok(())
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

/// Extract a byte range from bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] if any bytes are requested beyond the end of `bytes`.
pub fn extract_byte_range(
    bytes: &[u8],
    byte_range: ByteRange,
) -> Result<Vec<u8>, InvalidByteRangeError> {
    let size = bytes.len() as u64;
    if !byte_range.is_within(size) {
        return Err(InvalidByteRangeError(byte_range, size));
    }
    // Both bounds are within `bytes`, so they fit in a usize.
    let range = byte_range.to_range(size);
    let (start, end) = (range.start as usize, range.end as usize);
    Ok(bytes[start..end].to_vec())
}
