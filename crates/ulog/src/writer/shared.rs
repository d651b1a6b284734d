//! A token writer shared between threads.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{TokenWriter, WriterState};
use crate::error::Result;
use crate::token::{FileHeader, FlagBits, Token};

/// A cloneable handle to one [`TokenWriter`].
///
/// Every call holds the lock for the whole frame, including an injected
/// sync frame, so frames from different threads never interleave. Tokens
/// appear in the order the calls acquire the lock.
#[derive(Debug)]
pub struct SharedTokenWriter<W> {
    inner: Arc<Mutex<TokenWriter<W>>>,
}

impl<W> Clone for SharedTokenWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> SharedTokenWriter<W> {
    /// Share `writer`.
    pub fn new(writer: TokenWriter<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// See [`TokenWriter::write_header`].
    ///
    /// # Errors
    ///
    /// See [`TokenWriter::write_header`].
    pub fn write_header(&self, header: FileHeader, flags: FlagBits) -> Result<()> {
        self.inner.lock().write_header(header, flags)
    }

    /// See [`TokenWriter::append`].
    ///
    /// # Errors
    ///
    /// See [`TokenWriter::append`].
    pub fn append(&self, token: &Token) -> Result<()> {
        self.inner.lock().append(token)
    }

    /// Append tokens as one uninterrupted run.
    ///
    /// # Errors
    ///
    /// See [`TokenWriter::append`]. Tokens before the failing one stay written.
    pub fn append_batch(&self, tokens: &[Token]) -> Result<()> {
        self.inner.lock().append_all(tokens)
    }

    /// Flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to flush.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// Current state of the writer.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.inner.lock().state()
    }

    /// Tokens written so far.
    #[must_use]
    pub fn tokens_written(&self) -> u64 {
        self.inner.lock().tokens_written()
    }

    /// Run `f` with exclusive access to the writer.
    pub fn with_writer<T>(&self, f: impl FnOnce(&mut TokenWriter<W>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// Take the writer back once no other handle exists.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged while other clones are alive.
    pub fn into_inner(self) -> std::result::Result<TokenWriter<W>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
