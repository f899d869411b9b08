//! Fixed-capacity circular byte buffer
//!
//! Read and write indices are stored already wrapped: each advance is
//! masked with `N - 1`, so `N` must be a power of two. One slot is always
//! kept empty to tell a full buffer from an empty one, which gives the
//! invariant `used() + free() == N - 1`.
//!
//! Each index has exactly one writer: the producer moves `write`, the
//! consumer moves `read`. Both run in the poll loop.

/// Returned by [`RingBuffer::enqueue`] when no slot is free
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// Circular byte buffer with power-of-two capacity
pub struct RingBuffer<const N: usize> {
    storage: [u8; N],
    read: usize,
    write: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = N - 1;

    const VALID_CAPACITY: () = assert!(N >= 2 && N.is_power_of_two(), "capacity must be a power of two");

    /// Create an empty buffer
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            storage: [0; N],
            read: 0,
            write: 0,
        }
    }

    /// Total number of slots (one of which is always reserved)
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes waiting to be read
    pub fn used(&self) -> usize {
        self.write.wrapping_sub(self.read) & Self::MASK
    }

    /// Number of bytes that can be written before the buffer is full
    pub fn free(&self) -> usize {
        self.read.wrapping_sub(self.write).wrapping_sub(1) & Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Append one byte.
    ///
    /// Callers gate their source on [`free`](Self::free) first; a full
    /// buffer rejects the byte and leaves the contents untouched.
    pub fn enqueue(&mut self, byte: u8) -> Result<(), BufferFull> {
        if self.is_full() {
            return Err(BufferFull);
        }
        self.storage[self.write] = byte;
        self.write = (self.write + 1) & Self::MASK;
        Ok(())
    }

    /// Append a whole slice, or nothing if it does not fit
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), BufferFull> {
        if data.len() > self.free() {
            return Err(BufferFull);
        }
        for &byte in data {
            self.storage[self.write] = byte;
            self.write = (self.write + 1) & Self::MASK;
        }
        Ok(())
    }

    /// Remove the oldest byte
    pub fn dequeue(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.storage[self.read];
        self.read = (self.read + 1) & Self::MASK;
        Some(byte)
    }

    /// Oldest byte without removing it
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.storage[self.read])
        }
    }

    /// Pending bytes as two contiguous runs.
    ///
    /// The second slice is non-empty only when the pending data wraps past
    /// the end of storage.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        if self.write >= self.read {
            (&self.storage[self.read..self.write], &[])
        } else {
            (&self.storage[self.read..], &self.storage[..self.write])
        }
    }

    /// Drop `count` bytes from the front after they were handed off.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds [`used`](Self::used).
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.used(), "consumed more bytes than pending");
        self.read = (self.read + count) & Self::MASK;
    }

    /// Discard all pending bytes
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
