//! Input pulled incrementally from a [`Read`] implementation.

use std::io::{ErrorKind, Read};

use tracing::trace;

use super::ByteSource;
use crate::error::Result;

/// A growable window over a byte stream.
///
/// Consumed bytes are compacted away before the window grows, so the
/// unconsumed region is always one contiguous slice.
#[derive(Debug)]
pub struct StreamWindow<R> {
    inner: R,
    buf: Vec<u8>,
    start: usize,
    chunk_size: usize,
    position: u64,
    exhausted: bool,
}

impl<R: Read> StreamWindow<R> {
    /// Wrap a stream.
    #[must_use]
    pub fn new(inner: R, initial_capacity: usize, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(initial_capacity),
            start: 0,
            chunk_size: chunk_size.max(1),
            position: 0,
            exhausted: false,
        }
    }

    /// Whether the last read hit the end of the stream.
    ///
    /// A later call may still find more bytes if the stream grows.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the stream. Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.drain(..self.start);
        self.start = 0;
    }
}

impl<R: Read> ByteSource for StreamWindow<R> {
    fn fill(&mut self, len: usize) -> Result<bool> {
        while self.available() < len {
            if self.start > 0 && self.buf.len() + self.chunk_size > self.buf.capacity() {
                self.compact();
            }
            let old_len = self.buf.len();
            let want = self.chunk_size.max(len - self.available());
            self.buf.resize(old_len + want, 0);
            match self.inner.read(&mut self.buf[old_len..]) {
                Ok(0) => {
                    self.buf.truncate(old_len);
                    self.exhausted = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.buf.truncate(old_len + n);
                    self.exhausted = false;
                    trace!("Read {} bytes from stream", n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    self.buf.truncate(old_len);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.buf.truncate(old_len);
                    return Ok(false);
                }
                Err(e) => {
                    self.buf.truncate(old_len);
                    return Err(e.into());
                }
            }
        }
        Ok(true)
    }

    fn available(&self) -> usize {
        self.buf.len() - self.start
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.start + offset).copied()
    }

    fn with_contiguous<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> T,
    ) -> Option<T> {
        let from = self.start + offset;
        self.buf.get(from..from + len).map(f)
    }

    fn consume(&mut self, len: usize) {
        let len = len.min(self.available());
        self.start += len;
        self.position += len as u64;
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most one byte per read call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    #[test]
    fn test_fill_reads_until_available() {
        let mut window = StreamWindow::new(Cursor::new(b"abcdef".to_vec()), 4, 2);
        assert!(window.fill(5).unwrap());
        assert!(window.available() >= 5);
        assert_eq!(window.byte_at(4), Some(b'e'));
    }

    #[test]
    fn test_fill_past_end() {
        let mut window = StreamWindow::new(Cursor::new(b"abc".to_vec()), 4, 2);
        assert!(!window.fill(4).unwrap());
        assert!(window.is_exhausted());
        assert_eq!(window.available(), 3);
    }

    #[test]
    fn test_single_byte_reads() {
        let mut window = StreamWindow::new(Trickle(Cursor::new(b"hello".to_vec())), 1, 16);
        assert!(window.fill(5).unwrap());
        let text = window.with_contiguous(0, 5, <[u8]>::to_vec).unwrap();
        assert_eq!(text, b"hello");
    }

    #[test]
    fn test_consume_and_compact() {
        let mut window = StreamWindow::new(Cursor::new((0u8..64).collect::<Vec<_>>()), 8, 8);
        assert!(window.fill(8).unwrap());
        window.consume(6);
        assert_eq!(window.position(), 6);
        assert!(window.fill(20).unwrap());
        assert_eq!(window.byte_at(0), Some(6));
        let span = window.with_contiguous(2, 3, <[u8]>::to_vec).unwrap();
        assert_eq!(span, vec![8, 9, 10]);
    }

    #[test]
    fn test_span_beyond_window() {
        let mut window = StreamWindow::new(Cursor::new(b"ab".to_vec()), 4, 4);
        assert!(window.fill(2).unwrap());
        assert!(window.with_contiguous(1, 4, <[u8]>::to_vec).is_none());
        assert_eq!(window.get_ref().position(), 2);
    }

    #[test]
    fn test_consume_everything_resets_window() {
        let mut window = StreamWindow::new(Cursor::new(b"abcd".to_vec()), 4, 4);
        assert!(window.fill(4).unwrap());
        window.consume(4);
        assert_eq!(window.available(), 0);
        assert_eq!(window.position(), 4);
        assert!(!window.fill(1).unwrap());
        let cursor = window.into_inner();
        assert_eq!(cursor.position(), 4);
    }
}
