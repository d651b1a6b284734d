//! In-memory input made of one or more byte segments.

use std::collections::VecDeque;

use bytes::Bytes;

use super::scratch::ScratchPool;
use super::ByteSource;
use crate::error::Result;

/// A possibly non-contiguous in-memory buffer.
///
/// More segments can be pushed at any time, so bytes may be delivered
/// incrementally without a stream.
#[derive(Debug)]
pub struct SegmentedBuffer {
    segments: VecDeque<Bytes>,
    /// Consumed bytes of the front segment.
    head: usize,
    available: usize,
    position: u64,
    scratch: ScratchPool,
}

impl SegmentedBuffer {
    /// Create an empty buffer whose scratch space serves payloads up to
    /// `scratch_threshold` bytes without allocating.
    #[must_use]
    pub fn new(scratch_threshold: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            head: 0,
            available: 0,
            position: 0,
            scratch: ScratchPool::new(scratch_threshold),
        }
    }

    /// Append a segment.
    pub fn push(&mut self, segment: impl Into<Bytes>) {
        let segment = segment.into();
        if segment.is_empty() {
            return;
        }
        self.available += segment.len();
        self.segments.push_back(segment);
    }

    /// Number of segments still holding unconsumed bytes.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment index and in-segment offset of `offset` bytes past the cursor.
    fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut offset = offset + self.head;
        for (index, segment) in self.segments.iter().enumerate() {
            if offset < segment.len() {
                return Some((index, offset));
            }
            offset -= segment.len();
        }
        None
    }
}

impl ByteSource for SegmentedBuffer {
    fn fill(&mut self, len: usize) -> Result<bool> {
        Ok(self.available >= len)
    }

    fn available(&self) -> usize {
        self.available
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        let (index, at) = self.locate(offset)?;
        Some(self.segments[index][at])
    }

    fn with_contiguous<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> T,
    ) -> Option<T> {
        if offset + len > self.available {
            return None;
        }
        if len == 0 {
            return Some(f(&[]));
        }
        let (index, at) = self.locate(offset)?;
        let first = &self.segments[index];
        if first.len() - at >= len {
            return Some(f(&first[at..at + len]));
        }

        let mut scratch = self.scratch.get(len);
        let mut copied = 0;
        let mut at = at;
        for segment in self.segments.iter().skip(index) {
            let take = (segment.len() - at).min(len - copied);
            scratch[copied..copied + take].copy_from_slice(&segment[at..at + take]);
            copied += take;
            at = 0;
            if copied == len {
                break;
            }
        }
        Some(f(&scratch))
    }

    fn consume(&mut self, len: usize) {
        let len = len.min(self.available);
        self.available -= len;
        self.position += len as u64;
        let mut remaining = len;
        while remaining > 0 {
            let Some(front) = self.segments.front() else {
                break;
            };
            let left = front.len() - self.head;
            if remaining >= left {
                remaining -= left;
                self.head = 0;
                self.segments.pop_front();
            } else {
                self.head += remaining;
                remaining = 0;
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(parts: &[&'static [u8]]) -> SegmentedBuffer {
        let mut buf = SegmentedBuffer::new(8);
        for part in parts {
            buf.push(Bytes::from_static(part));
        }
        buf
    }

    #[test]
    fn test_fill_reports_availability() {
        let mut buf = buffer(&[b"abc", b"de"]);
        assert!(buf.fill(5).unwrap());
        assert!(!buf.fill(6).unwrap());
        buf.push(&b"f"[..]);
        assert!(buf.fill(6).unwrap());
    }

    #[test]
    fn test_byte_at_across_segments() {
        let buf = buffer(&[b"ab", b"", b"cd"]);
        assert_eq!(buf.byte_at(0), Some(b'a'));
        assert_eq!(buf.byte_at(2), Some(b'c'));
        assert_eq!(buf.byte_at(3), Some(b'd'));
        assert_eq!(buf.byte_at(4), None);
        assert_eq!(buf.segment_count(), 2);
    }

    #[test]
    fn test_contiguous_span_is_borrowed() {
        let mut buf = buffer(&[b"abcdef"]);
        let out = buf.with_contiguous(1, 3, <[u8]>::to_vec).unwrap();
        assert_eq!(out, b"bcd");
    }

    #[test]
    fn test_straddling_span_is_materialized() {
        let mut buf = buffer(&[b"ab", b"cd", b"ef"]);
        let out = buf.with_contiguous(1, 4, <[u8]>::to_vec).unwrap();
        assert_eq!(out, b"bcde");
        // larger than the fixed scratch buffer
        let mut buf = buffer(&[b"0123456", b"789abcdef"]);
        let out = buf.with_contiguous(0, 16, <[u8]>::to_vec).unwrap();
        assert_eq!(out, b"0123456789abcdef");
    }

    #[test]
    fn test_span_beyond_available() {
        let mut buf = buffer(&[b"ab"]);
        assert!(buf.with_contiguous(1, 2, <[u8]>::to_vec).is_none());
    }

    #[test]
    fn test_consume_drops_segments() {
        let mut buf = buffer(&[b"ab", b"cd", b"ef"]);
        buf.consume(3);
        assert_eq!(buf.position(), 3);
        assert_eq!(buf.available(), 3);
        assert_eq!(buf.byte_at(0), Some(b'd'));
        assert_eq!(buf.segment_count(), 2);
        buf.consume(3);
        assert_eq!(buf.available(), 0);
        assert_eq!(buf.segment_count(), 0);
    }
}
