//! Per-connection frame buffer.
//!
//! Accumulates the bytes of the in-progress frame. Content is tracked by an
//! explicit length, never by scanning for a terminator, so payloads may carry
//! any byte value including `0x00`.
//!
//! ## Growth
//!
//! Capacity grows through `Vec::try_reserve`, which doubles under the hood, so
//! appends are amortized O(1) per byte. An allocation failure is reported to
//! the caller instead of aborting the process; the buffer is left unchanged.

use std::collections::TryReserveError;

/// Byte that ends a frame. It is part of the frame delivered to other clients.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Capacity reserved for a fresh connection.
pub const INITIAL_CAPACITY: usize = 1024;

/// Growable, length-tracked byte buffer holding one partial frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer with the default starting capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an empty buffer able to hold `capacity` bytes without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Append raw bytes, growing first if needed.
    ///
    /// On allocation failure nothing is copied and the length is unchanged.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), TryReserveError> {
        self.data.try_reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// True iff the buffer is non-empty and its last byte is the terminator.
    pub fn is_complete(&self) -> bool {
        self.data.last() == Some(&FRAME_TERMINATOR)
    }

    /// Valid bytes, terminator included when present.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes the buffer can hold before it has to grow again.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Reset the length to zero, keeping the allocation for the next frame.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
