//! `'F'`: message format definitions.
//!
//! The payload is text: `message_name:type field;type[N] field;...` with a
//! `;` after every field, including the last.

use std::fmt;

use bytes::BufMut;

use super::codec::PayloadReader;
use super::identifier::MESSAGE_NAME;
use super::types::FieldDefinition;
use super::{TokenCodec, TokenKind};
use crate::error::{Error, Result};

/// Defines the field layout of one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Format {
    message_name: String,
    fields: Vec<FieldDefinition>,
}

impl Format {
    /// Create a format after validating the message name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name fails the message-name grammar.
    pub fn new(message_name: impl Into<String>, fields: Vec<FieldDefinition>) -> Result<Self> {
        let message_name = message_name.into();
        MESSAGE_NAME.check(TokenKind::Format, &message_name)?;
        Ok(Self {
            message_name,
            fields,
        })
    }

    /// Parse the textual form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] when a separator is missing and
    /// [`Error::InvalidIdentifier`] when a name fails its grammar.
    pub fn parse(text: &str) -> Result<Self> {
        let kind = TokenKind::Format;
        let Some((message_name, mut rest)) = text.split_once(':') else {
            return Err(Error::malformed(kind, format!("missing ':' in '{text}'")));
        };
        MESSAGE_NAME.check(kind, message_name)?;

        let mut fields = Vec::new();
        while !rest.is_empty() {
            let Some((field, tail)) = rest.split_once(';') else {
                return Err(Error::malformed(
                    kind,
                    format!("field '{rest}' is not terminated by ';'"),
                ));
            };
            fields.push(FieldDefinition::parse(kind, field)?);
            rest = tail;
        }

        Ok(Self {
            message_name: message_name.to_string(),
            fields,
        })
    }

    /// The message name.
    #[must_use]
    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    /// Fields in wire order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Append a field.
    pub fn push_field(&mut self, field: FieldDefinition) {
        self.fields.push(field);
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.message_name)?;
        for field in &self.fields {
            write!(f, "{field};")?;
        }
        Ok(())
    }
}

impl TokenCodec for Format {
    const KIND: TokenKind = TokenKind::Format;

    fn byte_size(&self) -> usize {
        self.message_name.len()
            + 1
            + self
                .fields
                .iter()
                .map(|field| field.text_len() + 1)
                .sum::<usize>()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let text = r.rest_text("format")?;
        Self::parse(text)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(self.to_string().as_bytes());
        Ok(())
    }
}
