//! Token reader.
//!
//! One automaton drives both input variants: [`SequenceReader`] over
//! in-memory segments and [`StreamReader`] over any [`Read`]. Every call to
//! [`TokenReader::read_token`] either yields exactly one token or consumes
//! nothing and returns `Ok(None)`, so bytes may arrive in any split.
//!
//! Inside the data section, frames with an unknown type id, frames that may
//! not appear there, and frames whose payload fails to decode put the reader
//! into [`ReaderState::Corrupted`]. It then scans for the next
//! synchronization frame and reports the recovery as a
//! [`Token::Synchronization`].

mod scratch;
mod sequence;
mod stream;

use std::io::Read;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::ReaderOptions;
use crate::error::{Error, Result};
use crate::token::{
    Catalog, FileHeader, Section, Synchronization, Token, TokenCodec, TokenKind,
    FRAME_HEADER_SIZE, HEADER_SIZE, SYNC_FRAME,
};

pub use scratch::{ScratchBuffer, ScratchPool};
pub use sequence::SegmentedBuffer;
pub use stream::StreamWindow;

/// Bytes the reader pulls tokens from.
///
/// Offsets are relative to the first unconsumed byte.
pub trait ByteSource {
    /// Try to make at least `len` bytes available.
    ///
    /// Returns `false` when fewer are available and no more can be had right
    /// now.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying input fails.
    fn fill(&mut self, len: usize) -> Result<bool>;

    /// Unconsumed bytes currently buffered.
    fn available(&self) -> usize;

    /// The byte at `offset`, if buffered.
    fn byte_at(&self, offset: usize) -> Option<u8>;

    /// Run `f` over `len` buffered bytes starting at `offset` as one slice.
    ///
    /// Returns `None` if the span is not buffered.
    fn with_contiguous<T>(
        &mut self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> T,
    ) -> Option<T>;

    /// Drop `len` bytes from the front.
    fn consume(&mut self, len: usize);

    /// Total bytes consumed so far.
    fn position(&self) -> u64;
}

/// Where the reader is in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderState {
    /// Waiting for the 16-byte file header.
    HeaderSection,
    /// Waiting for the flag bits that must follow the header.
    FlagBitsMessage,
    /// Reading definitions.
    DefinitionSection,
    /// Reading data.
    DataSection,
    /// Scanning for a synchronization frame after corruption.
    Corrupted,
}

impl ReaderState {
    /// Check if a state transition is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: ReaderState) -> bool {
        matches!(
            (self, target),
            (Self::HeaderSection, Self::FlagBitsMessage)
                | (Self::FlagBitsMessage, Self::DefinitionSection)
                | (Self::DefinitionSection, Self::DataSection)
                | (Self::DataSection, Self::Corrupted)
                | (Self::Corrupted, Self::DataSection)
        )
    }

    /// The section tokens are checked against in this state.
    #[must_use]
    pub fn section(&self) -> Section {
        match self {
            Self::HeaderSection => Section::HEADER,
            Self::FlagBitsMessage | Self::DefinitionSection => Section::DEFINITION,
            Self::DataSection | Self::Corrupted => Section::DATA,
        }
    }
}

/// Length and type id of a frame.
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    payload_len: usize,
    type_id: u8,
}

/// The reader automaton over some [`ByteSource`].
#[derive(Debug)]
pub struct TokenReader<S> {
    source: S,
    state: ReaderState,
    /// Length of the sync frame prefix found at the front while corrupted.
    matched: usize,
    /// Position where the current corruption started.
    corrupted_at: u64,
    skipped_bytes: u64,
    resyncs: u64,
    tokens_read: u64,
    failed: bool,
}

/// Reader over in-memory segments.
pub type SequenceReader = TokenReader<SegmentedBuffer>;

/// Reader over a byte stream.
pub type StreamReader<R> = TokenReader<StreamWindow<R>>;

impl<S: ByteSource> TokenReader<S> {
    /// Create a reader positioned before the file header.
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: ReaderState::HeaderSection,
            matched: 0,
            corrupted_at: 0,
            skipped_bytes: 0,
            resyncs: 0,
            tokens_read: 0,
            failed: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Bytes consumed so far, including skipped garbage.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.source.position()
    }

    /// Bytes discarded while resynchronizing.
    #[must_use]
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Completed resynchronizations.
    #[must_use]
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Tokens yielded so far, synthetic synchronization tokens included.
    #[must_use]
    pub fn tokens_read(&self) -> u64 {
        self.tokens_read
    }

    /// The byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The byte source, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Unwrap the byte source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Read the next token.
    ///
    /// Returns `Ok(None)` when more input is needed. Nothing is consumed in
    /// that case, except garbage skipped while corrupted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeader`] for a bad magic,
    /// [`Error::ProtocolOrderViolation`] if flag bits do not follow the
    /// header, any codec error of a frame, and I/O errors of the source. The
    /// failing frame is not consumed. Unknown and wrong-section frames in the
    /// data section are never returned; the reader resynchronizes instead.
    pub fn read_token(&mut self) -> Result<Option<Token>> {
        let token = match self.state {
            ReaderState::HeaderSection => self.read_header()?,
            ReaderState::FlagBitsMessage => self.read_flag_bits()?,
            ReaderState::DefinitionSection => self.read_definition()?,
            ReaderState::DataSection => match self.read_data() {
                Err(err) if err.is_recoverable() => {
                    self.mark_corrupted(&err);
                    self.resync()?
                }
                other => other?,
            },
            ReaderState::Corrupted => self.resync()?,
        };
        if let Some(token) = &token {
            self.tokens_read += 1;
            trace!(
                "Read {} token at offset {}: {}",
                token.kind(),
                self.source.position(),
                token
            );
        }
        Ok(token)
    }

    fn transition(&mut self, target: ReaderState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid reader transition {:?} -> {:?}",
            self.state,
            target
        );
        debug!("Reader state {:?} -> {:?}", self.state, target);
        self.state = target;
    }

    fn read_header(&mut self) -> Result<Option<Token>> {
        if !self.source.fill(HEADER_SIZE)? {
            return Ok(None);
        }
        let Some(header) = self.source.with_contiguous(0, HEADER_SIZE, FileHeader::decode) else {
            return Ok(None);
        };
        let header = header?;
        self.source.consume(HEADER_SIZE);
        self.transition(ReaderState::FlagBitsMessage);
        Ok(Some(header.into()))
    }

    fn read_frame_header(&mut self) -> Result<Option<FrameHeader>> {
        if !self.source.fill(FRAME_HEADER_SIZE)? {
            return Ok(None);
        }
        let (Some(lo), Some(hi), Some(type_id)) = (
            self.source.byte_at(0),
            self.source.byte_at(1),
            self.source.byte_at(2),
        ) else {
            return Ok(None);
        };
        Ok(Some(FrameHeader {
            payload_len: usize::from(u16::from_le_bytes([lo, hi])),
            type_id,
        }))
    }

    /// Decode the payload of `frame` without consuming it.
    fn decode_frame(&mut self, frame: FrameHeader) -> Result<Option<Token>> {
        if !self.source.fill(FRAME_HEADER_SIZE + frame.payload_len)? {
            return Ok(None);
        }
        match self
            .source
            .with_contiguous(FRAME_HEADER_SIZE, frame.payload_len, |payload| {
                Catalog::standard().decode(frame.type_id, payload)
            }) {
            Some(token) => token.map(Some),
            None => Ok(None),
        }
    }

    fn read_frame(&mut self) -> Result<Option<(FrameHeader, Token)>> {
        let Some(frame) = self.read_frame_header()? else {
            return Ok(None);
        };
        let Some(token) = self.decode_frame(frame)? else {
            return Ok(None);
        };
        self.source.consume(FRAME_HEADER_SIZE + frame.payload_len);
        Ok(Some((frame, token)))
    }

    fn read_flag_bits(&mut self) -> Result<Option<Token>> {
        let Some(frame) = self.read_frame_header()? else {
            return Ok(None);
        };
        let kind = Catalog::standard().kind(frame.type_id);
        if kind != TokenKind::FlagBits {
            return Err(Error::order_violation(
                kind,
                "flag bits must immediately follow the file header",
            ));
        }
        let Some(token) = self.decode_frame(frame)? else {
            return Ok(None);
        };
        self.source.consume(FRAME_HEADER_SIZE + frame.payload_len);
        self.transition(ReaderState::DefinitionSection);
        Ok(Some(token))
    }

    fn read_definition(&mut self) -> Result<Option<Token>> {
        let Some((_, token)) = self.read_frame()? else {
            return Ok(None);
        };
        if token.kind().is_data_only() {
            self.transition(ReaderState::DataSection);
        }
        Ok(Some(token))
    }

    fn read_data(&mut self) -> Result<Option<Token>> {
        let Some(frame) = self.read_frame_header()? else {
            return Ok(None);
        };
        let kind = Catalog::standard().kind(frame.type_id);
        let section = self.state.section();
        if kind == TokenKind::Unknown {
            return Err(Error::UnknownTokenType {
                type_id: frame.type_id,
                section,
            });
        }
        if !kind.section().contains(section) {
            return Err(Error::WrongSectionForToken { kind, section });
        }
        let Some(token) = self.decode_frame(frame)? else {
            return Ok(None);
        };
        self.source.consume(FRAME_HEADER_SIZE + frame.payload_len);
        Ok(Some(token))
    }

    fn mark_corrupted(&mut self, err: &Error) {
        warn!(
            "Corruption at offset {}: {}; scanning for sync frame",
            self.source.position(),
            err
        );
        self.matched = 0;
        self.corrupted_at = self.source.position();
        self.transition(ReaderState::Corrupted);
    }

    /// Scan for the sync frame. Bytes that cannot start a match are dropped;
    /// a partial match at the end of the input is kept for the next call.
    fn resync(&mut self) -> Result<Option<Token>> {
        loop {
            if !self.source.fill(self.matched + 1)? {
                return Ok(None);
            }
            let Some(byte) = self.source.byte_at(self.matched) else {
                return Ok(None);
            };
            if byte == SYNC_FRAME[self.matched] {
                self.matched += 1;
                if self.matched == SYNC_FRAME.len() {
                    break;
                }
            } else if byte == SYNC_FRAME[0] {
                self.source.consume(self.matched);
                self.matched = 1;
            } else {
                self.source.consume(self.matched + 1);
                self.matched = 0;
            }
        }

        let skipped = self.source.position() - self.corrupted_at;
        self.source.consume(SYNC_FRAME.len());
        self.skipped_bytes += skipped;
        self.resyncs += 1;
        self.matched = 0;
        warn!(
            "Resynchronized at offset {} after skipping {} bytes",
            self.source.position(),
            skipped
        );
        self.transition(ReaderState::DataSection);
        Ok(Some(Synchronization.into()))
    }
}

impl SequenceReader {
    /// Reader over one in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_segments([bytes.into()])
    }

    /// Reader over several in-memory segments, read as one sequence.
    pub fn from_segments<I>(segments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self::with_options(segments, &ReaderOptions::default())
    }

    /// Reader over in-memory segments with explicit options.
    pub fn with_options<I>(segments: I, options: &ReaderOptions) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let mut buffer = SegmentedBuffer::new(options.scratch_threshold);
        for segment in segments {
            buffer.push(segment);
        }
        Self::new(buffer)
    }

    /// Append more input.
    pub fn push(&mut self, segment: impl Into<Bytes>) {
        self.source.push(segment);
    }
}

impl<R: Read> StreamReader<R> {
    /// Reader pulling from `reader`.
    pub fn from_reader(reader: R, options: &ReaderOptions) -> Self {
        Self::new(StreamWindow::new(
            reader,
            options.initial_buffer_size,
            options.read_chunk_size,
        ))
    }
}

/// Iterating stops at the end of the input and after the first error.
impl<S: ByteSource> Iterator for TokenReader<S> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Decode every token of a complete in-memory log.
///
/// Trailing bytes that do not form a complete token are ignored.
///
/// # Errors
///
/// Returns the first error the reader reports.
pub fn read_all(bytes: impl Into<Bytes>) -> Result<Vec<Token>> {
    SequenceReader::from_bytes(bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{
        Dropout, FlagBits, Format, Information, KeyValue, LoggedData, Parameter, ParameterValue,
        Subscription,
    };
    use std::io::Cursor;

    fn header() -> Token {
        FileHeader::new(1, 20_309_082).into()
    }

    fn definitions() -> Vec<Token> {
        vec![
            header(),
            FlagBits::default().into(),
            Format::parse("pos:uint64_t timestamp;float[2] xy;").unwrap().into(),
            Information {
                entry: KeyValue::string("sys_name", "PX4").unwrap(),
            }
            .into(),
            Parameter::new("MC_ROLL_P", ParameterValue::Float(6.5))
                .unwrap()
                .into(),
            Subscription::new(0, "pos", 0).unwrap().into(),
        ]
    }

    fn data(n: u8) -> Token {
        LoggedData::new(0, vec![n; 16]).into()
    }

    fn encode(tokens: &[Token]) -> Vec<u8> {
        let mut out = Vec::new();
        for token in tokens {
            out.extend_from_slice(&token.to_bytes().unwrap());
        }
        out
    }

    #[test]
    fn test_state_transitions() {
        use ReaderState::*;
        assert!(HeaderSection.can_transition_to(FlagBitsMessage));
        assert!(FlagBitsMessage.can_transition_to(DefinitionSection));
        assert!(DefinitionSection.can_transition_to(DataSection));
        assert!(DataSection.can_transition_to(Corrupted));
        assert!(Corrupted.can_transition_to(DataSection));
        assert!(!DataSection.can_transition_to(DefinitionSection));
        assert!(!DefinitionSection.can_transition_to(Corrupted));
        assert!(!HeaderSection.can_transition_to(DataSection));
    }

    #[test]
    fn test_read_header_vector() {
        let mut bytes = vec![0x55, 0x4c, 0x6f, 0x67, 0x01, 0x12, 0x35, 0x01];
        bytes.extend_from_slice(&20_309_082u64.to_le_bytes());
        let mut reader = SequenceReader::from_bytes(bytes);
        let token = reader.read_token().unwrap().unwrap();
        assert_eq!(token, Token::FileHeader(FileHeader::new(1, 20_309_082)));
        assert_eq!(reader.state(), ReaderState::FlagBitsMessage);
        assert_eq!(reader.offset(), 16);
        assert!(reader.read_token().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bytes = header().to_bytes().unwrap().to_vec();
        bytes[2] = 0;
        let mut reader = SequenceReader::from_bytes(bytes);
        let err = reader.read_token().unwrap_err();
        assert!(matches!(err, Error::MalformedHeader { index: 2, .. }));
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_missing_flag_bits() {
        let bytes = encode(&[header(), Format::parse("a:uint8_t x;").unwrap().into()]);
        let mut reader = SequenceReader::from_bytes(bytes);
        reader.read_token().unwrap();
        let err = reader.read_token().unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolOrderViolation {
                kind: TokenKind::Format,
                ..
            }
        ));
    }

    #[test]
    fn test_sections_advance() {
        let mut tokens = definitions();
        tokens.push(data(1));
        tokens.push(Subscription::new(1, "pos", 1).unwrap().into());
        tokens.push(Dropout { duration_ms: 12 }.into());
        let mut reader = SequenceReader::from_bytes(encode(&tokens));
        let mut read = Vec::new();
        while let Some(token) = reader.read_token().unwrap() {
            if token.kind() == TokenKind::LoggedData {
                assert_eq!(reader.state(), ReaderState::DataSection);
            }
            read.push(token);
        }
        assert_eq!(read, tokens);
        assert_eq!(reader.state(), ReaderState::DataSection);
        assert_eq!(reader.tokens_read(), tokens.len() as u64);
    }

    #[test]
    fn test_corruption_recovery() {
        let mut before = definitions();
        before.push(data(1));
        let after = vec![data(2), data(3)];

        let mut bytes = encode(&before);
        bytes.extend_from_slice(&[0xee; 37]);
        bytes.extend_from_slice(&SYNC_FRAME);
        bytes.extend_from_slice(&encode(&after));

        let tokens = read_all(bytes).unwrap();
        let mut expected = before;
        expected.push(Synchronization.into());
        expected.extend(after);
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_garbage_length_does_not_change_token_count() {
        for garbage in [1usize, 2, 10, 200] {
            let mut bytes = encode(&definitions());
            bytes.extend_from_slice(&encode(&[data(1)]));
            bytes.extend(std::iter::repeat(0xee).take(garbage));
            bytes.extend_from_slice(&SYNC_FRAME);
            bytes.extend_from_slice(&encode(&[data(2)]));

            let mut reader = SequenceReader::from_bytes(bytes);
            let count = reader.by_ref().map(Result::unwrap).count();
            assert_eq!(count, definitions().len() + 3);
            assert_eq!(reader.skipped_bytes(), garbage as u64);
            assert_eq!(reader.resync_count(), 1);
        }
    }

    #[test]
    fn test_wrong_section_token_triggers_resync() {
        let mut bytes = encode(&definitions());
        bytes.extend_from_slice(&encode(&[
            data(1),
            Format::parse("late:uint8_t x;").unwrap().into(),
        ]));
        bytes.extend_from_slice(&SYNC_FRAME);
        bytes.extend_from_slice(&encode(&[data(2)]));

        let tokens = read_all(bytes).unwrap();
        let kinds: Vec<_> = tokens.iter().skip(definitions().len()).map(Token::kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LoggedData,
                TokenKind::Synchronization,
                TokenKind::LoggedData
            ]
        );
    }

    #[test]
    fn test_malformed_data_frame_is_reported() {
        let mut bytes = encode(&definitions());
        bytes.extend_from_slice(&encode(&[data(1)]));
        // a dropout frame one byte short
        bytes.extend_from_slice(&[1, 0, b'O', 7]);
        bytes.extend_from_slice(&encode(&[data(2)]));

        let mut reader = SequenceReader::from_bytes(bytes);
        for _ in 0..=definitions().len() {
            assert!(reader.read_token().unwrap().is_some());
        }
        let offset = reader.offset();
        let err = reader.read_token().unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                kind: TokenKind::Dropout,
                ..
            }
        ));
        assert_eq!(reader.offset(), offset);
        assert_eq!(reader.state(), ReaderState::DataSection);
        assert_eq!(reader.resync_count(), 0);
    }

    #[test]
    fn test_partial_sync_frame_across_calls() {
        let mut bytes = encode(&definitions());
        bytes.extend_from_slice(&encode(&[data(1)]));
        bytes.extend_from_slice(&[0xee, 0xee, SYNC_FRAME[0], 0xee]);
        let prefix_len = definitions().len() + 1;

        let mut reader = SequenceReader::from_bytes(bytes);
        for _ in 0..prefix_len {
            assert!(reader.read_token().unwrap().is_some());
        }
        reader.push(SYNC_FRAME[..5].to_vec());
        assert!(reader.read_token().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::Corrupted);
        reader.push(SYNC_FRAME[5..].to_vec());
        reader.push(encode(&[data(9)]));

        assert_eq!(
            reader.read_token().unwrap().unwrap().kind(),
            TokenKind::Synchronization
        );
        assert_eq!(reader.skipped_bytes(), 4);
        assert_eq!(reader.read_token().unwrap().unwrap(), data(9));
    }

    #[test]
    fn test_unknown_token_in_definitions_passes_through() {
        let mut tokens = definitions();
        tokens.insert(3, crate::token::UnknownToken::new(b'z', vec![1, 2, 3]).into());
        let read = read_all(encode(&tokens)).unwrap();
        assert_eq!(read, tokens);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut tokens = definitions();
        tokens.extend((0..5).map(data));
        let bytes = encode(&tokens);

        let mut reader = SequenceReader::from_segments(Vec::<Bytes>::new());
        let mut read = Vec::new();
        for byte in bytes {
            reader.push(vec![byte]);
            if let Some(token) = reader.read_token().unwrap() {
                read.push(token);
            }
        }
        assert_eq!(read, tokens);
    }

    #[test]
    fn test_stream_reader_matches_sequence_reader() {
        let mut tokens = definitions();
        tokens.extend((0..50).map(data));
        let mut bytes = encode(&tokens);
        bytes.extend_from_slice(&[0x01, 0x02, 0x03]);
        bytes.extend_from_slice(&SYNC_FRAME);

        let options = ReaderOptions {
            initial_buffer_size: 256,
            scratch_threshold: 4,
            read_chunk_size: 7,
        };
        let stream: Vec<_> = StreamReader::from_reader(Cursor::new(bytes.clone()), &options)
            .collect::<Result<_>>()
            .unwrap();
        let sequence: Vec<_> = SequenceReader::with_options(
            bytes.chunks(5).map(<[u8]>::to_vec),
            &options,
        )
        .collect::<Result<_>>()
        .unwrap();
        assert_eq!(stream, sequence);
        assert_eq!(stream.len(), tokens.len() + 1);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut reader = SequenceReader::from_bytes(vec![0u8; 32]);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_incomplete_trailing_frame_is_not_consumed() {
        let mut bytes = encode(&definitions());
        let frame = encode(&[data(4)]);
        bytes.extend_from_slice(&frame[..frame.len() - 1]);
        let mut reader = SequenceReader::from_bytes(bytes);
        let read = reader.by_ref().count();
        assert_eq!(read, definitions().len());
        let position = reader.offset();
        assert!(reader.read_token().unwrap().is_none());
        assert_eq!(reader.offset(), position);
        reader.push(vec![frame[frame.len() - 1]]);
        assert_eq!(reader.read_token().unwrap().unwrap(), data(4));
    }
}
