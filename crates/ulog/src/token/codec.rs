//! Bounds-checked payload cursor shared by all token codecs.

use bytes::Buf;

use super::TokenKind;
use crate::error::{Error, Result};

/// A cursor over one frame payload that reports shortfalls as
/// [`Error::MalformedPayload`] for the token being decoded.
#[derive(Debug)]
pub(crate) struct PayloadReader<'a> {
    kind: TokenKind,
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(kind: TokenKind, buf: &'a [u8]) -> Self {
        Self { kind, buf }
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.kind
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, len: usize, what: &str) -> Result<()> {
        if self.buf.len() < len {
            return Err(Error::malformed(
                self.kind,
                format!(
                    "{what} needs {len} bytes, {} remaining",
                    self.buf.len()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    pub(crate) fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        self.need(N, what)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        self.need(len, what)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Everything left in the payload.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn text(&mut self, len: usize, what: &str) -> Result<&'a str> {
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw)
            .map_err(|e| Error::malformed(self.kind, format!("{what} is not valid UTF-8: {e}")))
    }

    pub(crate) fn rest_text(&mut self, what: &str) -> Result<&'a str> {
        let len = self.buf.len();
        self.text(len, what)
    }

    /// Fail unless the payload was consumed exactly.
    pub(crate) fn finish(self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(
                self.kind,
                format!("{} trailing bytes after payload", self.buf.len()),
            ))
        }
    }
}
