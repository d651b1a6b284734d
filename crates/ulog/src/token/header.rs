//! The file header and the flag bits token that must follow it.

use bytes::BufMut;
use chrono::{DateTime, Utc};

use super::codec::PayloadReader;
use super::{TokenCodec, TokenKind};
use crate::error::{Error, Result};

/// Magic bytes opening every log: `ULog` followed by `01 12 35`.
pub const HEADER_MAGIC: [u8; 7] = [0x55, 0x4c, 0x6f, 0x67, 0x01, 0x12, 0x35];

/// Size of the file header. It has no frame.
pub const HEADER_SIZE: usize = 16;

/// Header version written by default.
pub const DEFAULT_VERSION: u8 = 1;

/// The 16-byte record at offset 0 of every log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHeader {
    /// Format version.
    pub version: u8,
    /// Logging start time in microseconds.
    pub timestamp: u64,
}

impl FileHeader {
    /// Create a header.
    #[must_use]
    pub fn new(version: u8, timestamp: u64) -> Self {
        Self { version, timestamp }
    }

    /// Create a version 1 header stamped with a wall-clock time.
    ///
    /// Times before the Unix epoch are clamped to 0.
    #[must_use]
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        let micros = u64::try_from(time.timestamp_micros()).unwrap_or(0);
        Self::new(DEFAULT_VERSION, micros)
    }

    /// The timestamp as a wall-clock time, if it is representable.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(DateTime::from_timestamp_micros)
    }
}

impl TokenCodec for FileHeader {
    const KIND: TokenKind = TokenKind::FileHeader;

    fn byte_size(&self) -> usize {
        HEADER_SIZE
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let magic: [u8; 7] = r.array("magic")?;
        if let Some(index) = (0..HEADER_MAGIC.len()).find(|&i| magic[i] != HEADER_MAGIC[i]) {
            return Err(Error::MalformedHeader {
                index,
                expected: HEADER_MAGIC[index],
                actual: magic[index],
            });
        }
        let version = r.u8("version")?;
        let timestamp = r.u64("timestamp")?;
        r.finish()?;
        Ok(Self { version, timestamp })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(&HEADER_MAGIC);
        buf.put_u8(self.version);
        buf.put_u64_le(self.timestamp);
        Ok(())
    }
}

/// Size of the flag bits payload.
pub const FLAG_BITS_SIZE: usize = 40;

/// Incompatible flag bit 0 of byte 0: the log has appended data sections.
pub const INCOMPAT_DATA_APPENDED: u8 = 1;

/// `'B'`: compatibility flags, written right after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlagBits {
    /// Flags a reader may ignore.
    pub compat_flags: [u8; 8],
    /// Flags a reader must understand to parse the log.
    pub incompat_flags: [u8; 8],
    /// File offsets of appended data sections, 0 when unused.
    pub appended_offsets: [u64; 3],
}

impl FlagBits {
    /// Whether the log declares appended data sections.
    #[must_use]
    pub fn has_appended_data(&self) -> bool {
        self.incompat_flags[0] & INCOMPAT_DATA_APPENDED != 0
    }

    /// Whether any incompatible flag other than appended data is set.
    #[must_use]
    pub fn has_unknown_incompat_flags(&self) -> bool {
        self.incompat_flags[0] & !INCOMPAT_DATA_APPENDED != 0
            || self.incompat_flags[1..].iter().any(|&b| b != 0)
    }
}

impl TokenCodec for FlagBits {
    const KIND: TokenKind = TokenKind::FlagBits;

    fn byte_size(&self) -> usize {
        FLAG_BITS_SIZE
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let compat_flags = r.array("compat flags")?;
        let incompat_flags = r.array("incompat flags")?;
        let mut appended_offsets = [0u64; 3];
        for offset in &mut appended_offsets {
            *offset = r.u64("appended offset")?;
        }
        r.finish()?;
        Ok(Self {
            compat_flags,
            incompat_flags,
            appended_offsets,
        })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(&self.compat_flags);
        buf.put_slice(&self.incompat_flags);
        for offset in self.appended_offsets {
            buf.put_u64_le(offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u8, timestamp: u64) -> Vec<u8> {
        let mut bytes = HEADER_MAGIC.to_vec();
        bytes.push(version);
        bytes.extend_from_slice(&timestamp.to_le_bytes());
        bytes
    }

    #[test]
    fn test_decode_header() {
        let header = FileHeader::decode(&header_bytes(1, 20_309_082)).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.timestamp, 20_309_082);
    }

    #[test]
    fn test_encode_header() {
        let mut out = Vec::new();
        FileHeader::new(1, 20_309_082).encode(&mut out).unwrap();
        assert_eq!(out, header_bytes(1, 20_309_082));
        assert_eq!(out.len(), HEADER_SIZE);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = header_bytes(1, 0);
        bytes[3] = b'X';
        let err = FileHeader::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedHeader {
                index: 3,
                expected: 0x67,
                actual: b'X'
            }
        ));
    }

    #[test]
    fn test_header_datetime() {
        let time = DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap();
        let header = FileHeader::from_datetime(time);
        assert_eq!(header.version, DEFAULT_VERSION);
        assert_eq!(header.timestamp, 1_700_000_000_123_456);
        assert_eq!(header.datetime(), Some(time));
    }

    #[test]
    fn test_header_before_epoch_clamps() {
        let time = DateTime::from_timestamp(-10, 0).unwrap();
        assert_eq!(FileHeader::from_datetime(time).timestamp, 0);
    }

    #[test]
    fn test_flag_bits_layout() {
        let flags = FlagBits {
            compat_flags: [1, 0, 0, 0, 0, 0, 0, 0],
            incompat_flags: [INCOMPAT_DATA_APPENDED, 0, 0, 0, 0, 0, 0, 0],
            appended_offsets: [0x1000, 0, 0],
        };
        let mut out = Vec::new();
        flags.encode(&mut out).unwrap();
        assert_eq!(out.len(), FLAG_BITS_SIZE);
        assert_eq!(out[0], 1);
        assert_eq!(out[8], 1);
        assert_eq!(&out[16..24], &0x1000u64.to_le_bytes());
        assert_eq!(FlagBits::decode(&out).unwrap(), flags);
        assert!(flags.has_appended_data());
        assert!(!flags.has_unknown_incompat_flags());
    }

    #[test]
    fn test_flag_bits_unknown_incompat() {
        let flags = FlagBits {
            incompat_flags: [0, 4, 0, 0, 0, 0, 0, 0],
            ..FlagBits::default()
        };
        assert!(flags.has_unknown_incompat_flags());
        assert!(!flags.has_appended_data());
    }

    #[test]
    fn test_flag_bits_wrong_size() {
        assert!(FlagBits::decode(&[0u8; 39]).is_err());
        assert!(FlagBits::decode(&[0u8; 41]).is_err());
    }
}
