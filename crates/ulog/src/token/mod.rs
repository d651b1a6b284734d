//! Token catalog and per-token wire codecs.
//!
//! A log is a 16-byte [`FileHeader`] followed by frames:
//! `u16 payload length (LE) | u8 type id | payload`. Each token kind declares
//! the [`Section`]s it may appear in.

mod catalog;
pub(crate) mod codec;
mod data;
mod format;
mod header;
pub mod identifier;
mod key_value;
mod subscription;
mod types;

use std::fmt;
use std::ops::BitOr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

pub use catalog::{Catalog, CatalogEntry};
pub use data::{
    Dropout, LogLevel, LoggedData, LoggedString, Synchronization, TaggedLoggedString,
    UnknownToken, SYNC_FRAME, SYNC_MAGIC,
};
pub use format::Format;
pub use header::{
    FileHeader, FlagBits, DEFAULT_VERSION, FLAG_BITS_SIZE, HEADER_MAGIC, HEADER_SIZE,
    INCOMPAT_DATA_APPENDED,
};
pub use key_value::{
    DefaultParameter, DefaultTypes, Information, KeyValue, MultiInformation, Parameter,
    ParameterValue, MAX_KEY_LEN,
};
pub use subscription::{Subscription, Unsubscription};
pub use types::{BaseType, FieldDefinition, TypeDefinition, PADDING_PREFIX};

/// Size of the length and type prefix of every frame.
pub const FRAME_HEADER_SIZE: usize = 3;

/// Largest payload a frame can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// The log sections a token may appear in, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Section(u8);

impl Section {
    /// The file header.
    pub const HEADER: Self = Self(1 << 0);
    /// Format, parameter and information definitions.
    pub const DEFINITION: Self = Self(1 << 1);
    /// Subscriptions and logged data.
    pub const DATA: Self = Self(1 << 2);

    /// Whether all sections of `other` are in this set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Section {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::HEADER, "Header"),
            (Self::DEFINITION, "Definition"),
            (Self::DATA, "Data"),
        ];
        let mut first = true;
        for (section, name) in names {
            if self.contains(section) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("None")?;
        }
        Ok(())
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Every kind of token, including the opaque fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TokenKind {
    /// The 16-byte file header.
    FileHeader,
    /// `'B'`
    FlagBits,
    /// `'F'`
    Format,
    /// `'I'`
    Information,
    /// `'M'`
    MultiInformation,
    /// `'P'`
    Parameter,
    /// `'Q'`
    DefaultParameter,
    /// `'A'`
    Subscription,
    /// `'R'`
    Unsubscription,
    /// `'D'`
    LoggedData,
    /// `'L'`
    LoggedString,
    /// `'C'`
    TaggedLoggedString,
    /// `'S'`
    Synchronization,
    /// `'O'`
    Dropout,
    /// Any type id outside the catalog.
    Unknown,
}

impl TokenKind {
    /// The frame type id, `None` for the header and unknown tokens.
    #[must_use]
    pub fn type_id(self) -> Option<u8> {
        Some(match self {
            Self::FlagBits => b'B',
            Self::Format => b'F',
            Self::Information => b'I',
            Self::MultiInformation => b'M',
            Self::Parameter => b'P',
            Self::DefaultParameter => b'Q',
            Self::Subscription => b'A',
            Self::Unsubscription => b'R',
            Self::LoggedData => b'D',
            Self::LoggedString => b'L',
            Self::TaggedLoggedString => b'C',
            Self::Synchronization => b'S',
            Self::Dropout => b'O',
            Self::FileHeader | Self::Unknown => return None,
        })
    }

    /// The sections this kind may appear in.
    #[must_use]
    pub fn section(self) -> Section {
        match self {
            Self::FileHeader => Section::HEADER,
            Self::FlagBits | Self::Format => Section::DEFINITION,
            Self::Information
            | Self::MultiInformation
            | Self::Parameter
            | Self::DefaultParameter
            | Self::Subscription
            | Self::Unknown => Section::DEFINITION | Section::DATA,
            Self::Unsubscription
            | Self::LoggedData
            | Self::LoggedString
            | Self::TaggedLoggedString
            | Self::Synchronization
            | Self::Dropout => Section::DATA,
        }
    }

    /// Whether this kind only appears in the data section.
    #[must_use]
    pub fn is_data_only(self) -> bool {
        let section = self.section();
        section.contains(Section::DATA) && !section.contains(Section::DEFINITION)
    }

    /// Whether this kind only appears in the definition section.
    #[must_use]
    pub fn is_definition_only(self) -> bool {
        let section = self.section();
        section.contains(Section::DEFINITION) && !section.contains(Section::DATA)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The binary contract every catalogued token type implements.
pub trait TokenCodec: Sized {
    /// The kind this type decodes.
    const KIND: TokenKind;

    /// Encoded payload size in bytes (the header's full size for [`FileHeader`]).
    fn byte_size(&self) -> usize;

    /// Decode from exactly one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid encoding of this type.
    fn decode(payload: &[u8]) -> Result<Self>;

    /// Append the payload to `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value violates a constraint of the wire format.
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()>;
}

/// One decoded record of a log.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// The file header.
    FileHeader(FileHeader),
    /// Flag bits.
    FlagBits(FlagBits),
    /// A message format.
    Format(Format),
    /// An information entry.
    Information(Information),
    /// A multi information entry.
    MultiInformation(MultiInformation),
    /// A parameter value.
    Parameter(Parameter),
    /// A default parameter value.
    DefaultParameter(DefaultParameter),
    /// A subscription.
    Subscription(Subscription),
    /// An unsubscription.
    Unsubscription(Unsubscription),
    /// Logged message data.
    LoggedData(LoggedData),
    /// A log message.
    LoggedString(LoggedString),
    /// A tagged log message.
    TaggedLoggedString(TaggedLoggedString),
    /// A synchronization marker.
    Synchronization(Synchronization),
    /// A dropout marker.
    Dropout(Dropout),
    /// A frame with an unrecognized type id.
    Unknown(UnknownToken),
}

macro_rules! token_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Token {
                fn from(token: $variant) -> Self {
                    Self::$variant(token)
                }
            }
        )*
    };
}

token_from!(
    FileHeader,
    FlagBits,
    Format,
    Information,
    MultiInformation,
    Parameter,
    DefaultParameter,
    Subscription,
    Unsubscription,
    LoggedData,
    LoggedString,
    TaggedLoggedString,
    Synchronization,
    Dropout,
);

impl From<UnknownToken> for Token {
    fn from(token: UnknownToken) -> Self {
        Self::Unknown(token)
    }
}

impl Token {
    /// The kind of this token.
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::FileHeader(_) => TokenKind::FileHeader,
            Self::FlagBits(_) => TokenKind::FlagBits,
            Self::Format(_) => TokenKind::Format,
            Self::Information(_) => TokenKind::Information,
            Self::MultiInformation(_) => TokenKind::MultiInformation,
            Self::Parameter(_) => TokenKind::Parameter,
            Self::DefaultParameter(_) => TokenKind::DefaultParameter,
            Self::Subscription(_) => TokenKind::Subscription,
            Self::Unsubscription(_) => TokenKind::Unsubscription,
            Self::LoggedData(_) => TokenKind::LoggedData,
            Self::LoggedString(_) => TokenKind::LoggedString,
            Self::TaggedLoggedString(_) => TokenKind::TaggedLoggedString,
            Self::Synchronization(_) => TokenKind::Synchronization,
            Self::Dropout(_) => TokenKind::Dropout,
            Self::Unknown(_) => TokenKind::Unknown,
        }
    }

    /// The sections this token may appear in.
    #[must_use]
    pub fn section(&self) -> Section {
        self.kind().section()
    }

    /// The frame type id.
    #[must_use]
    pub fn type_id(&self) -> Option<u8> {
        match self {
            Self::Unknown(token) => Some(token.type_id),
            other => other.kind().type_id(),
        }
    }

    /// Payload size, or the full 16 bytes for the header.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::FileHeader(t) => t.byte_size(),
            Self::FlagBits(t) => t.byte_size(),
            Self::Format(t) => t.byte_size(),
            Self::Information(t) => t.byte_size(),
            Self::MultiInformation(t) => t.byte_size(),
            Self::Parameter(t) => t.byte_size(),
            Self::DefaultParameter(t) => t.byte_size(),
            Self::Subscription(t) => t.byte_size(),
            Self::Unsubscription(t) => t.byte_size(),
            Self::LoggedData(t) => t.byte_size(),
            Self::LoggedString(t) => t.byte_size(),
            Self::TaggedLoggedString(t) => t.byte_size(),
            Self::Synchronization(t) => t.byte_size(),
            Self::Dropout(t) => t.byte_size(),
            Self::Unknown(t) => t.byte_size(),
        }
    }

    /// Size on the wire including the frame prefix.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        match self {
            Self::FileHeader(_) => HEADER_SIZE,
            other => FRAME_HEADER_SIZE + other.byte_size(),
        }
    }

    /// Append the payload only.
    ///
    /// # Errors
    ///
    /// Returns an error if the token violates a constraint of the wire format.
    pub fn encode_payload<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::FileHeader(t) => t.encode(buf),
            Self::FlagBits(t) => t.encode(buf),
            Self::Format(t) => t.encode(buf),
            Self::Information(t) => t.encode(buf),
            Self::MultiInformation(t) => t.encode(buf),
            Self::Parameter(t) => t.encode(buf),
            Self::DefaultParameter(t) => t.encode(buf),
            Self::Subscription(t) => t.encode(buf),
            Self::Unsubscription(t) => t.encode(buf),
            Self::LoggedData(t) => t.encode(buf),
            Self::LoggedString(t) => t.encode(buf),
            Self::TaggedLoggedString(t) => t.encode(buf),
            Self::Synchronization(t) => t.encode(buf),
            Self::Dropout(t) => t.encode(buf),
            Self::Unknown(t) => {
                t.encode(buf);
                Ok(())
            }
        }
    }

    /// Append the full wire form: the bare header, or a framed payload.
    ///
    /// Nothing is appended when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload exceeds the frame
    /// limit, or the error of the payload codec.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        let result = self.encode_frame(buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    fn encode_frame(&self, buf: &mut BytesMut) -> Result<()> {
        if let Self::FileHeader(header) = self {
            return header.encode(buf);
        }
        let size = self.byte_size();
        if size > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                kind: self.kind(),
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let type_id = self
            .type_id()
            .ok_or_else(|| Error::malformed(self.kind(), "token has no frame type id"))?;
        buf.reserve(FRAME_HEADER_SIZE + size);
        buf.put_u16_le(size as u16);
        buf.put_u8(type_id);
        let payload_start = buf.len();
        self.encode_payload(buf)?;
        let written = buf.len() - payload_start;
        if written != size {
            return Err(Error::malformed(
                self.kind(),
                format!("encoded {written} bytes but declared {size}"),
            ));
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`Token::encode`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.frame_size());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one frame payload through the standard catalog.
    ///
    /// # Errors
    ///
    /// Returns the error of the payload codec. Unknown type ids never fail.
    pub fn decode(type_id: u8, payload: &[u8]) -> Result<Self> {
        Catalog::standard().decode(type_id, payload)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileHeader(t) => write!(f, "version={} timestamp={}", t.version, t.timestamp),
            Self::FlagBits(t) => write!(
                f,
                "compat={:02x?} incompat={:02x?} appended={:?}",
                t.compat_flags, t.incompat_flags, t.appended_offsets
            ),
            Self::Format(t) => write!(f, "{t}"),
            Self::Information(t) => write!(f, "{}", t.entry),
            Self::MultiInformation(t) => {
                write!(f, "{} continued={}", t.entry, t.is_continued)
            }
            Self::Parameter(t) => match t.value() {
                Ok(value) => write!(f, "{} = {value}", t.entry.name()),
                Err(_) => write!(f, "{}", t.entry),
            },
            Self::DefaultParameter(t) => match t.value() {
                Ok(value) => write!(
                    f,
                    "{} = {value} types={:#04b}",
                    t.entry.name(),
                    t.default_types.bits()
                ),
                Err(_) => write!(f, "{}", t.entry),
            },
            Self::Subscription(t) => write!(
                f,
                "msg_id={} name={} multi_id={}",
                t.msg_id,
                t.message_name(),
                t.multi_id
            ),
            Self::Unsubscription(t) => write!(f, "msg_id={}", t.msg_id),
            Self::LoggedData(t) => write!(f, "msg_id={} bytes={}", t.msg_id, t.data.len()),
            Self::LoggedString(t) => write!(f, "{t}"),
            Self::TaggedLoggedString(t) => write!(f, "{t}"),
            Self::Synchronization(_) => f.write_str("sync"),
            Self::Dropout(t) => write!(f, "{} ms", t.duration_ms),
            Self::Unknown(t) => {
                write!(f, "type={:#04x} bytes={}", t.type_id, t.payload.len())
            }
        }
    }
}
