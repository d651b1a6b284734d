//! The type id → decoder table.
//!
//! Built once on first use and never mutated afterwards, so one instance is
//! shared by every reader.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{
    DefaultParameter, Dropout, FlagBits, Format, Information, LoggedData, LoggedString,
    MultiInformation, Parameter, Subscription, Synchronization, TaggedLoggedString, Token,
    TokenCodec, TokenKind, UnknownToken, Unsubscription,
};
use crate::error::Result;

/// Decodes one payload into a token.
pub type DecodeFn = fn(&[u8]) -> Result<Token>;

/// One catalogued token type.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    /// The kind produced by `decode`.
    pub kind: TokenKind,
    /// The payload decoder.
    pub decode: DecodeFn,
}

/// Maps frame type ids to token decoders.
#[derive(Debug)]
pub struct Catalog {
    entries: HashMap<u8, CatalogEntry>,
}

fn decode_as<T>(payload: &[u8]) -> Result<Token>
where
    T: TokenCodec + Into<Token>,
{
    T::decode(payload).map(Into::into)
}

fn entry<T>() -> Option<(u8, CatalogEntry)>
where
    T: TokenCodec + Into<Token>,
{
    let type_id = T::KIND.type_id()?;
    Some((
        type_id,
        CatalogEntry {
            kind: T::KIND,
            decode: decode_as::<T>,
        },
    ))
}

static STANDARD: Lazy<Catalog> = Lazy::new(|| Catalog {
    entries: [
        entry::<FlagBits>(),
        entry::<Format>(),
        entry::<Information>(),
        entry::<MultiInformation>(),
        entry::<Parameter>(),
        entry::<DefaultParameter>(),
        entry::<Subscription>(),
        entry::<Unsubscription>(),
        entry::<LoggedData>(),
        entry::<LoggedString>(),
        entry::<TaggedLoggedString>(),
        entry::<Synchronization>(),
        entry::<Dropout>(),
    ]
    .into_iter()
    .flatten()
    .collect(),
});

impl Catalog {
    /// The catalog of all standard token types.
    #[must_use]
    pub fn standard() -> &'static Catalog {
        &STANDARD
    }

    /// Look up a type id.
    #[must_use]
    pub fn get(&self, type_id: u8) -> Option<&CatalogEntry> {
        self.entries.get(&type_id)
    }

    /// The kind a type id decodes to, [`TokenKind::Unknown`] when not catalogued.
    #[must_use]
    pub fn kind(&self, type_id: u8) -> TokenKind {
        self.get(type_id).map_or(TokenKind::Unknown, |entry| entry.kind)
    }

    /// Number of catalogued types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a payload. Unknown type ids produce an [`UnknownToken`].
    ///
    /// # Errors
    ///
    /// Returns the error of the payload codec.
    pub fn decode(&self, type_id: u8, payload: &[u8]) -> Result<Token> {
        match self.get(type_id) {
            Some(entry) => (entry.decode)(payload),
            None => Ok(UnknownToken::new(type_id, payload.to_vec()).into()),
        }
    }
}
