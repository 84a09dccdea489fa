//! Owned byte region with position/limit cursors.
//!
//! A [`Buffer`] holds received-but-not-yet-consumed bytes. The region between
//! `position` and `limit` is the unconsumed data; the region between `limit`
//! and `capacity` is writable spare space for raw reads. The invariant
//! `position <= limit <= capacity` holds at all times.

/// Owned, resizable byte region with a read position and a write limit.
#[derive(Debug, Default)]
pub struct Buffer {
    storage: Vec<u8>,
    position: usize,
    limit: usize,
}

impl Buffer {
    /// Creates an empty buffer with `capacity` bytes of spare space.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            position: 0,
            limit: 0,
        }
    }

    /// Creates a buffer whose unconsumed region is a copy of `bytes`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            storage: bytes.to_vec(),
            position: 0,
            limit: bytes.len(),
        }
    }

    /// Current read position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Current write limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Total capacity of the underlying storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unconsumed bytes (`limit - position`).
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// True when no unconsumed bytes remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == self.limit
    }

    /// The unconsumed region.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.position..self.limit]
    }

    /// Writable spare space past the limit, for raw reads to fill.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.limit..]
    }

    /// Extends the limit by `n` bytes after a raw read wrote into
    /// [`spare_mut`](Self::spare_mut).
    pub fn fill(&mut self, n: usize) {
        assert!(self.limit + n <= self.storage.len(), "Buffer overflow");
        self.limit += n;
    }

    /// Shrinks the capacity to the limit, releasing spare space.
    pub fn trim(&mut self) {
        self.storage.truncate(self.limit);
    }

    /// Appends bytes to the unconsumed region, growing storage as needed.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let needed = self.limit + bytes.len();
        if needed > self.storage.len() {
            self.storage.resize(needed, 0);
        }
        self.storage[self.limit..needed].copy_from_slice(bytes);
        self.limit = needed;
    }

    /// Advances the read position by `n` consumed bytes.
    pub fn consume(&mut self, n: usize) {
        assert!(self.position + n <= self.limit, "Buffer underflow");
        self.position += n;
    }

    /// Copies unconsumed bytes into `dst`, consuming what was copied.
    /// Returns the number of bytes copied.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.storage[self.position..self.position + n]);
        self.position += n;
        n
    }

    /// Moves the unconsumed region to the front of storage, reclaiming the
    /// consumed prefix as spare space.
    pub fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        self.storage.copy_within(self.position..self.limit, 0);
        self.limit -= self.position;
        self.position = 0;
    }

    /// Takes the unconsumed bytes out, leaving this buffer empty.
    #[must_use]
    pub fn take_remaining(&mut self) -> Vec<u8> {
        let bytes = self.as_slice().to_vec();
        self.position = 0;
        self.limit = 0;
        bytes
    }
}
