//! Reusable buffers for payloads that span several input segments.

use std::ops::{Deref, DerefMut};

/// Pooled buffers kept for reuse at most.
const MAX_POOLED: usize = 4;

/// Size-classed scratch space.
///
/// Requests up to `threshold` bytes share one fixed buffer allocated up front.
/// Larger requests take a heap buffer from a small pool, and the guard returns
/// it when dropped.
#[derive(Debug)]
pub struct ScratchPool {
    small: Box<[u8]>,
    pool: Vec<Vec<u8>>,
}

impl ScratchPool {
    /// Create a pool whose fixed buffer holds `threshold` bytes.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            small: vec![0u8; threshold].into_boxed_slice(),
            pool: Vec::new(),
        }
    }

    /// Largest request served by the fixed buffer.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.small.len()
    }

    /// Number of idle pooled buffers.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Borrow `len` bytes of scratch space.
    pub fn get(&mut self, len: usize) -> ScratchBuffer<'_> {
        if len <= self.small.len() {
            return ScratchBuffer::Small(&mut self.small[..len]);
        }
        let mut buf = self
            .pool
            .iter()
            .position(|b| b.capacity() >= len)
            .map_or_else(|| Vec::with_capacity(len), |i| self.pool.swap_remove(i));
        buf.clear();
        buf.resize(len, 0);
        ScratchBuffer::Pooled {
            buf,
            pool: &mut self.pool,
        }
    }
}

/// Scratch space borrowed from a [`ScratchPool`].
#[derive(Debug)]
pub enum ScratchBuffer<'a> {
    /// A slice of the fixed buffer.
    Small(&'a mut [u8]),
    /// A pooled heap buffer, returned on drop.
    Pooled {
        /// The buffer.
        buf: Vec<u8>,
        /// Where the buffer goes back to.
        pool: &'a mut Vec<Vec<u8>>,
    },
}

impl Deref for ScratchBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Small(slice) => slice,
            Self::Pooled { buf, .. } => buf,
        }
    }
}

impl DerefMut for ScratchBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Small(slice) => slice,
            Self::Pooled { buf, .. } => buf,
        }
    }
}

impl Drop for ScratchBuffer<'_> {
    fn drop(&mut self) {
        if let Self::Pooled { buf, pool } = self {
            if pool.len() < MAX_POOLED {
                pool.push(std::mem::take(buf));
            }
        }
    }
}
