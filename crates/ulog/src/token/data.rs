//! Data section tokens: logged data, log strings, dropouts, sync markers and
//! the opaque fallback for unknown type ids.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes};

use super::codec::PayloadReader;
use super::{TokenCodec, TokenKind};
use crate::error::{Error, Result};

/// `'D'`: one serialized message instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoggedData {
    /// Subscription the payload belongs to.
    pub msg_id: u16,
    /// The message bytes, laid out by the subscribed format.
    pub data: Bytes,
}

impl LoggedData {
    /// Create a logged data token.
    #[must_use]
    pub fn new(msg_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            data: data.into(),
        }
    }
}

impl TokenCodec for LoggedData {
    const KIND: TokenKind = TokenKind::LoggedData;

    fn byte_size(&self) -> usize {
        2 + self.data.len()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let msg_id = r.u16("message id")?;
        let data = Bytes::copy_from_slice(r.rest());
        Ok(Self { msg_id, data })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16_le(self.msg_id);
        buf.put_slice(&self.data);
        Ok(())
    }
}

/// Severity of a logged string, following the Linux kernel levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// System is unusable.
    Emergency,
    /// Action must be taken immediately.
    Alert,
    /// Critical conditions.
    Critical,
    /// Error conditions.
    Error,
    /// Warning conditions.
    Warning,
    /// Normal but significant condition.
    Notice,
    /// Informational.
    Info,
    /// Debug-level messages.
    Debug,
}

impl LogLevel {
    const ORDERED: [LogLevel; 8] = [
        LogLevel::Emergency,
        LogLevel::Alert,
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    /// Level from its numeric value `0..=7`.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ORDERED.get(raw as usize).copied()
    }

    /// Numeric value of the level.
    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    /// Level from an ASCII digit `'0'..='7'`.
    #[must_use]
    pub fn from_ascii(byte: u8) -> Option<Self> {
        byte.checked_sub(b'0').and_then(Self::from_raw)
    }

    /// The level as an ASCII digit.
    #[must_use]
    pub fn to_ascii(self) -> u8 {
        b'0' + self.to_raw()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Emergency => "EMERG",
            Self::Alert => "ALERT",
            Self::Critical => "CRIT",
            Self::Error => "ERROR",
            Self::Warning => "WARN",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        })
    }
}

/// Display helper for a level byte that may be out of range.
struct LevelDisplay(Option<LogLevel>, u8);

impl fmt::Display for LevelDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(level) => fmt::Display::fmt(&level, f),
            None => write!(f, "LEVEL({:#04x})", self.1),
        }
    }
}

/// `'L'`: a printf-style log message.
///
/// The level byte and the message bytes are kept exactly as read, so
/// unknown levels and text that is not UTF-8 survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoggedString {
    /// Level as an ASCII digit.
    raw_level: u8,
    /// Time in microseconds.
    pub timestamp: u64,
    /// The message bytes.
    pub message: Bytes,
}

impl LoggedString {
    /// Create a log message.
    #[must_use]
    pub fn new(level: LogLevel, timestamp: u64, message: impl Into<Bytes>) -> Self {
        Self {
            raw_level: level.to_ascii(),
            timestamp,
            message: message.into(),
        }
    }

    /// The level, `None` if the stored byte is not `'0'..='7'`.
    #[must_use]
    pub fn level(&self) -> Option<LogLevel> {
        LogLevel::from_ascii(self.raw_level)
    }

    /// The level byte as stored on the wire.
    #[must_use]
    pub fn raw_level(&self) -> u8 {
        self.raw_level
    }

    /// The message as text, invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

impl TokenCodec for LoggedString {
    const KIND: TokenKind = TokenKind::LoggedString;

    fn byte_size(&self) -> usize {
        1 + 8 + self.message.len()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let raw_level = r.u8("log level")?;
        let timestamp = r.u64("timestamp")?;
        let message = Bytes::copy_from_slice(r.rest());
        Ok(Self {
            raw_level,
            timestamp,
            message,
        })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(self.raw_level);
        buf.put_u64_le(self.timestamp);
        buf.put_slice(&self.message);
        Ok(())
    }
}

impl fmt::Display for LoggedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            LevelDisplay(self.level(), self.raw_level),
            self.timestamp,
            self.text()
        )
    }
}

/// `'C'`: a log message carrying a tag that identifies its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedLoggedString {
    /// Level as a number.
    raw_level: u8,
    /// Source tag.
    pub tag: u16,
    /// Time in microseconds.
    pub timestamp: u64,
    /// The message bytes.
    pub message: Bytes,
}

impl TaggedLoggedString {
    /// Create a tagged log message.
    #[must_use]
    pub fn new(level: LogLevel, tag: u16, timestamp: u64, message: impl Into<Bytes>) -> Self {
        Self {
            raw_level: level.to_raw(),
            tag,
            timestamp,
            message: message.into(),
        }
    }

    /// The level, `None` if the stored byte is not `0..=7`.
    #[must_use]
    pub fn level(&self) -> Option<LogLevel> {
        LogLevel::from_raw(self.raw_level)
    }

    /// The level byte as stored on the wire.
    #[must_use]
    pub fn raw_level(&self) -> u8 {
        self.raw_level
    }

    /// The message as text, invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

impl TokenCodec for TaggedLoggedString {
    const KIND: TokenKind = TokenKind::TaggedLoggedString;

    fn byte_size(&self) -> usize {
        1 + 2 + 8 + self.message.len()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let raw_level = r.u8("log level")?;
        let tag = r.u16("tag")?;
        let timestamp = r.u64("timestamp")?;
        let message = Bytes::copy_from_slice(r.rest());
        Ok(Self {
            raw_level,
            tag,
            timestamp,
            message,
        })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(self.raw_level);
        buf.put_u16_le(self.tag);
        buf.put_u64_le(self.timestamp);
        buf.put_slice(&self.message);
        Ok(())
    }
}

impl fmt::Display for TaggedLoggedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] tag={} {} {}",
            LevelDisplay(self.level(), self.raw_level),
            self.tag,
            self.timestamp,
            self.text()
        )
    }
}

/// `'O'`: the logger lost data for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dropout {
    /// Length of the gap in milliseconds.
    pub duration_ms: u16,
}

impl TokenCodec for Dropout {
    const KIND: TokenKind = TokenKind::Dropout;

    fn byte_size(&self) -> usize {
        2
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let duration_ms = r.u16("duration")?;
        r.finish()?;
        Ok(Self { duration_ms })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16_le(self.duration_ms);
        Ok(())
    }
}

/// Payload of every synchronization token.
pub const SYNC_MAGIC: [u8; 8] = [0x2f, 0x73, 0x13, 0x20, 0x25, 0x0c, 0xbb, 0x12];

/// A complete synchronization frame: length 8, type `'S'`, magic.
pub const SYNC_FRAME: [u8; 11] = [
    0x08, 0x00, b'S', 0x2f, 0x73, 0x13, 0x20, 0x25, 0x0c, 0xbb, 0x12,
];

/// `'S'`: a fixed marker a reader can search for after corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Synchronization;

impl TokenCodec for Synchronization {
    const KIND: TokenKind = TokenKind::Synchronization;

    fn byte_size(&self) -> usize {
        SYNC_MAGIC.len()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        if payload != SYNC_MAGIC {
            return Err(Error::malformed(Self::KIND, "sync magic mismatch"));
        }
        Ok(Self)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(&SYNC_MAGIC);
        Ok(())
    }
}

/// A frame whose type id is not in the catalog, preserved byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownToken {
    /// The type id as read.
    pub type_id: u8,
    /// The raw payload.
    pub payload: Bytes,
}

impl UnknownToken {
    /// Wrap an unrecognized frame.
    #[must_use]
    pub fn new(type_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            payload: payload.into(),
        }
    }

    /// Payload size.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }

    pub(crate) fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_data() {
        let token = LoggedData::decode(&[0x05, 0x00, 1, 2, 3]).unwrap();
        assert_eq!(token.msg_id, 5);
        assert_eq!(&token.data[..], &[1, 2, 3]);
        assert_eq!(token.byte_size(), 5);
        assert!(LoggedData::decode(&[0x05]).is_err());
    }

    #[test]
    fn test_logged_string_ascii_level() {
        let mut payload = vec![b'3'];
        payload.extend_from_slice(&1234u64.to_le_bytes());
        payload.extend_from_slice(b"[commander] armed");
        let token = LoggedString::decode(&payload).unwrap();
        assert_eq!(token.level(), Some(LogLevel::Error));
        assert_eq!(token.raw_level(), b'3');
        assert_eq!(token.timestamp, 1234);
        assert_eq!(token.text(), "[commander] armed");

        let mut out = Vec::new();
        token.encode(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_logged_string_unknown_level_round_trips() {
        let mut payload = vec![b'x'];
        payload.extend_from_slice(&0u64.to_le_bytes());
        let token = LoggedString::decode(&payload).unwrap();
        assert_eq!(token.level(), None);
        assert_eq!(token.raw_level(), b'x');
        assert!(token.to_string().starts_with("[LEVEL(0x78)]"));
        let mut out = Vec::new();
        token.encode(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_logged_string_keeps_invalid_utf8() {
        let mut payload = vec![b'6'];
        payload.extend_from_slice(&7u64.to_le_bytes());
        payload.extend_from_slice(b"temp 40\xb0C");
        let token = LoggedString::decode(&payload).unwrap();
        assert_eq!(&token.message[..], b"temp 40\xb0C");
        assert_eq!(token.text(), "temp 40\u{fffd}C");

        let mut out = Vec::new();
        token.encode(&mut out).unwrap();
        assert_eq!(out, payload);

        let mut payload = vec![2, 1, 0];
        payload.extend_from_slice(&7u64.to_le_bytes());
        payload.extend_from_slice(&[0xff, b'!']);
        let token = TaggedLoggedString::decode(&payload).unwrap();
        assert_eq!(token.text(), "\u{fffd}!");
        assert_eq!(token.level(), Some(LogLevel::Critical));
    }

    #[test]
    fn test_tagged_logged_string_raw_level() {
        let token = TaggedLoggedString::new(LogLevel::Warning, 7, 99, "low battery");
        let mut out = Vec::new();
        token.encode(&mut out).unwrap();
        assert_eq!(out[0], 4);
        assert_eq!(&out[1..3], &[7, 0]);
        assert_eq!(out.len(), token.byte_size());
        assert_eq!(TaggedLoggedString::decode(&out).unwrap(), token);
    }

    #[test]
    fn test_levels_round_trip_for_both_encodings() {
        for level in LogLevel::ORDERED {
            let plain = LoggedString::new(level, 1, "m");
            let mut out = Vec::new();
            plain.encode(&mut out).unwrap();
            assert_eq!(LoggedString::decode(&out).unwrap(), plain);

            let tagged = TaggedLoggedString::new(level, 2, 1, "m");
            let mut out = Vec::new();
            tagged.encode(&mut out).unwrap();
            assert_eq!(TaggedLoggedString::decode(&out).unwrap(), tagged);
        }

        // an ASCII-range byte in a tagged string is simply out of range
        let mut payload = vec![b'3', 0, 0];
        payload.extend_from_slice(&0u64.to_le_bytes());
        let tagged = TaggedLoggedString::decode(&payload).unwrap();
        assert_eq!(tagged.level(), None);
        assert_eq!(tagged.raw_level(), b'3');
    }

    #[test]
    fn test_log_level_mapping() {
        for raw in 0..8u8 {
            let level = LogLevel::from_raw(raw).unwrap();
            assert_eq!(level.to_raw(), raw);
            assert_eq!(LogLevel::from_ascii(level.to_ascii()), Some(level));
        }
        assert_eq!(LogLevel::from_raw(9), None);
        assert_eq!(LogLevel::from_ascii(b'8'), None);
        assert_eq!(LogLevel::from_ascii(0), None);
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }

    #[test]
    fn test_dropout() {
        let token = Dropout::decode(&[0xe8, 0x03]).unwrap();
        assert_eq!(token.duration_ms, 1000);
    }

    #[test]
    fn test_sync_magic() {
        assert!(Synchronization::decode(&SYNC_MAGIC).is_ok());
        assert!(Synchronization::decode(&[0u8; 8]).is_err());
        assert_eq!(&SYNC_FRAME[3..], &SYNC_MAGIC);
        assert_eq!(SYNC_FRAME[0] as usize, SYNC_MAGIC.len());
    }

    #[test]
    fn test_unknown_token_preserves_payload() {
        let token = UnknownToken::new(b'Z', vec![9, 8, 7]);
        let mut out = Vec::new();
        token.encode(&mut out);
        assert_eq!(out, vec![9, 8, 7]);
        assert_eq!(token.byte_size(), 3);
    }
}
