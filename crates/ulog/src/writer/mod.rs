//! Token writer.
//!
//! [`TokenWriter`] frames tokens onto any [`Write`] sink and enforces the
//! section order of a log: the header and flag bits first, then
//! definitions, then data. [`SharedTokenWriter`] lets several threads append
//! to one writer, and [`LogRecorder`] is a session-level front end that
//! assigns message ids.

mod recorder;
mod shared;

use std::io::Write;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::config::WriterOptions;
use crate::error::{Error, Result};
use crate::token::{FileHeader, FlagBits, Synchronization, Token, TokenKind};

pub use recorder::LogRecorder;
pub use shared::SharedTokenWriter;

/// Where the writer is in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterState {
    /// Nothing written yet.
    AwaitingHeader,
    /// Header and flag bits written; definitions are accepted.
    AcceptingDefinitions,
    /// Data has been written; definition-only tokens are rejected.
    AcceptingData,
}

impl WriterState {
    /// Check if a state transition is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: WriterState) -> bool {
        matches!(
            (self, target),
            (Self::AwaitingHeader, Self::AcceptingDefinitions)
                | (Self::AcceptingDefinitions, Self::AcceptingData)
        )
    }
}

/// Frames tokens onto a byte sink in section order.
///
/// Each call encodes into an internal buffer first, so a token that fails
/// to encode or breaks the section order leaves the sink untouched.
#[derive(Debug)]
pub struct TokenWriter<W> {
    inner: W,
    state: WriterState,
    options: WriterOptions,
    buf: BytesMut,
    /// Data tokens appended since the last sync frame.
    since_sync: u32,
    tokens_written: u64,
    bytes_written: u64,
}

impl<W: Write> TokenWriter<W> {
    /// Create a writer with default options.
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, WriterOptions::default())
    }

    /// Create a writer with explicit options.
    pub fn with_options(inner: W, options: WriterOptions) -> Self {
        Self {
            inner,
            state: WriterState::AwaitingHeader,
            options,
            buf: BytesMut::new(),
            since_sync: 0,
            tokens_written: 0,
            bytes_written: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// The writer options.
    #[must_use]
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Tokens written, injected sync frames included.
    #[must_use]
    pub fn tokens_written(&self) -> u64 {
        self.tokens_written
    }

    /// Bytes handed to the sink.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the sink without flushing it.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to flush.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Write the file header and the flag bits that must follow it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolOrderViolation`] if a header was already
    /// written, or an I/O error of the sink.
    pub fn write_header(&mut self, header: FileHeader, flags: FlagBits) -> Result<()> {
        if self.state != WriterState::AwaitingHeader {
            return Err(Error::order_violation(
                TokenKind::FileHeader,
                "the file header has already been written",
            ));
        }
        self.buf.clear();
        Token::from(header).encode(&mut self.buf)?;
        Token::from(flags).encode(&mut self.buf)?;
        self.commit()?;
        self.tokens_written += 2;
        self.transition(WriterState::AcceptingDefinitions);
        Ok(())
    }

    /// Append one framed token.
    ///
    /// The first data-only token moves the writer into the data section.
    /// With a sync interval configured, a sync frame follows every N-th data
    /// token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolOrderViolation`] for a header or flag bits
    /// token, for any token before the header, and for a definition-only
    /// token once data has been written. Encode errors and I/O errors of the
    /// sink are returned as they are. Nothing reaches the sink on an order
    /// or encode error.
    pub fn append(&mut self, token: &Token) -> Result<()> {
        let kind = token.kind();
        self.check_order(kind)?;

        let next_state = if kind.is_data_only() {
            WriterState::AcceptingData
        } else {
            self.state
        };

        self.buf.clear();
        token.encode(&mut self.buf)?;
        let mut written = 1;
        let mut since_sync = self.since_sync;
        if next_state == WriterState::AcceptingData {
            if kind == TokenKind::Synchronization {
                since_sync = 0;
            } else {
                since_sync += 1;
                if let Some(interval) = self.options.effective_sync_interval() {
                    if since_sync >= interval {
                        Token::from(Synchronization).encode(&mut self.buf)?;
                        trace!("Injected sync frame after {} data tokens", since_sync);
                        since_sync = 0;
                        written += 1;
                    }
                }
            }
        }

        self.commit()?;
        self.since_sync = since_sync;
        self.tokens_written += written;
        trace!("Wrote {} token: {}", kind, token);
        if next_state != self.state {
            self.transition(next_state);
        }
        Ok(())
    }

    /// Append several tokens in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// See [`TokenWriter::append`].
    pub fn append_all<'a, I>(&mut self, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Token>,
    {
        for token in tokens {
            self.append(token)?;
        }
        Ok(())
    }

    fn check_order(&self, kind: TokenKind) -> Result<()> {
        match (self.state, kind) {
            (_, TokenKind::FileHeader | TokenKind::FlagBits) => Err(Error::order_violation(
                kind,
                "the header and flag bits are written together by write_header",
            )),
            (WriterState::AwaitingHeader, _) => Err(Error::order_violation(
                kind,
                "the file header has not been written",
            )),
            (WriterState::AcceptingData, _) if kind.is_definition_only() => {
                Err(Error::order_violation(
                    kind,
                    "definitions are closed once data has been written",
                ))
            }
            _ => Ok(()),
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.write_all(&self.buf)?;
        self.bytes_written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    fn transition(&mut self, target: WriterState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid writer transition {:?} -> {:?}",
            self.state,
            target
        );
        debug!("Writer state {:?} -> {:?}", self.state, target);
        self.state = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_all;
    use crate::token::{Format, LoggedData, Subscription, SYNC_FRAME};
    use std::io;

    fn started() -> TokenWriter<Vec<u8>> {
        let mut writer = TokenWriter::new(Vec::new());
        writer
            .write_header(FileHeader::new(1, 42), FlagBits::default())
            .unwrap();
        writer
    }

    fn format() -> Token {
        Format::parse("a:uint8_t x;").unwrap().into()
    }

    fn data(n: u8) -> Token {
        LoggedData::new(0, vec![n]).into()
    }

    /// Fails every write.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_state_transitions() {
        use WriterState::*;
        assert!(AwaitingHeader.can_transition_to(AcceptingDefinitions));
        assert!(AcceptingDefinitions.can_transition_to(AcceptingData));
        assert!(!AcceptingData.can_transition_to(AcceptingDefinitions));
        assert!(!AwaitingHeader.can_transition_to(AcceptingData));
    }

    #[test]
    fn test_header_is_written_once() {
        let mut writer = started();
        assert_eq!(writer.state(), WriterState::AcceptingDefinitions);
        assert_eq!(writer.bytes_written(), 16 + 3 + 40);
        let err = writer
            .write_header(FileHeader::new(1, 0), FlagBits::default())
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolOrderViolation { .. }));
    }

    #[test]
    fn test_append_before_header_fails() {
        let mut writer = TokenWriter::new(Vec::new());
        let err = writer.append(&format()).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolOrderViolation {
                kind: TokenKind::Format,
                ..
            }
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn test_header_tokens_rejected_by_append() {
        let mut writer = started();
        let err = writer.append(&FlagBits::default().into()).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolOrderViolation {
                kind: TokenKind::FlagBits,
                ..
            }
        ));
    }

    #[test]
    fn test_first_data_token_flips_state() {
        let mut writer = started();
        writer.append(&format()).unwrap();
        writer
            .append(&Subscription::new(0, "a", 0).unwrap().into())
            .unwrap();
        assert_eq!(writer.state(), WriterState::AcceptingDefinitions);
        writer.append(&data(1)).unwrap();
        assert_eq!(writer.state(), WriterState::AcceptingData);
    }

    #[test]
    fn test_definition_after_data_fails_without_output() {
        let mut writer = started();
        writer.append(&format()).unwrap();
        writer.append(&data(1)).unwrap();
        let len = writer.get_ref().len();

        let err = writer.append(&format()).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolOrderViolation {
                kind: TokenKind::Format,
                ..
            }
        ));
        assert_eq!(writer.get_ref().len(), len);
        assert_eq!(writer.state(), WriterState::AcceptingData);

        // definition and data tokens are still accepted
        writer
            .append(&Subscription::new(1, "a", 1).unwrap().into())
            .unwrap();
    }

    #[test]
    fn test_sync_injection() {
        let options = WriterOptions::default().with_sync_interval(2);
        let mut writer = TokenWriter::with_options(Vec::new(), options);
        writer
            .write_header(FileHeader::new(1, 0), FlagBits::default())
            .unwrap();
        writer.append(&format()).unwrap();
        for n in 0..5 {
            writer.append(&data(n)).unwrap();
        }
        assert_eq!(writer.tokens_written(), 2 + 1 + 5 + 2);

        let tokens = read_all(writer.into_inner()).unwrap();
        let kinds: Vec<_> = tokens.iter().skip(3).map(Token::kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LoggedData,
                TokenKind::LoggedData,
                TokenKind::Synchronization,
                TokenKind::LoggedData,
                TokenKind::LoggedData,
                TokenKind::Synchronization,
                TokenKind::LoggedData,
            ]
        );
    }

    #[test]
    fn test_explicit_sync_resets_interval() {
        let options = WriterOptions::default().with_sync_interval(2);
        let mut writer = TokenWriter::with_options(Vec::new(), options);
        writer
            .write_header(FileHeader::new(1, 0), FlagBits::default())
            .unwrap();
        writer.append(&data(0)).unwrap();
        writer.append(&Synchronization.into()).unwrap();
        writer.append(&data(1)).unwrap();
        assert_eq!(writer.tokens_written(), 2 + 3);
        let bytes = writer.into_inner();
        assert_eq!(
            bytes.windows(SYNC_FRAME.len()).filter(|w| *w == SYNC_FRAME).count(),
            1
        );
    }

    #[test]
    fn test_no_sync_without_interval() {
        let mut writer = started();
        for n in 0..100 {
            writer.append(&data(n)).unwrap();
        }
        assert_eq!(writer.tokens_written(), 102);
    }

    #[test]
    fn test_failed_write_keeps_state() {
        let mut writer = TokenWriter::new(BrokenSink);
        let err = writer
            .write_header(FileHeader::new(1, 0), FlagBits::default())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(writer.state(), WriterState::AwaitingHeader);
        assert_eq!(writer.tokens_written(), 0);
    }

    #[test]
    fn test_round_trip() {
        let mut writer = started();
        let tokens = vec![
            format(),
            Subscription::new(0, "a", 0).unwrap().into(),
            data(7),
            data(8),
        ];
        writer.append_all(&tokens).unwrap();
        writer.flush().unwrap();

        let read = read_all(writer.into_inner()).unwrap();
        assert_eq!(read.len(), tokens.len() + 2);
        assert_eq!(&read[2..], &tokens[..]);
        assert_eq!(read[0], Token::from(FileHeader::new(1, 42)));
    }
}
