//! `'A'` subscriptions and `'R'` unsubscriptions.

use bytes::BufMut;

use super::codec::PayloadReader;
use super::identifier::MESSAGE_NAME;
use super::{TokenCodec, TokenKind};
use crate::error::Result;

/// Binds a message id to a format name and instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Instance of the message when several publish the same format.
    pub multi_id: u8,
    /// Id used by later logged data.
    pub msg_id: u16,
    message_name: String,
}

impl Subscription {
    /// Create a subscription after validating the message name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentifier`] if the name fails the
    /// message-name grammar.
    pub fn new(msg_id: u16, message_name: impl Into<String>, multi_id: u8) -> Result<Self> {
        let message_name = message_name.into();
        MESSAGE_NAME.check(Self::KIND, &message_name)?;
        Ok(Self {
            multi_id,
            msg_id,
            message_name,
        })
    }

    /// The subscribed format name.
    #[must_use]
    pub fn message_name(&self) -> &str {
        &self.message_name
    }
}

impl TokenCodec for Subscription {
    const KIND: TokenKind = TokenKind::Subscription;

    fn byte_size(&self) -> usize {
        1 + 2 + self.message_name.len()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let multi_id = r.u8("multi id")?;
        let msg_id = r.u16("message id")?;
        let name = r.rest_text("message name")?;
        Self::new(msg_id, name, multi_id)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        MESSAGE_NAME.check(Self::KIND, &self.message_name)?;
        buf.put_u8(self.multi_id);
        buf.put_u16_le(self.msg_id);
        buf.put_slice(self.message_name.as_bytes());
        Ok(())
    }
}

/// Ends a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unsubscription {
    /// The message id that is no longer logged.
    pub msg_id: u16,
}

impl TokenCodec for Unsubscription {
    const KIND: TokenKind = TokenKind::Unsubscription;

    fn byte_size(&self) -> usize {
        2
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let msg_id = r.u16("message id")?;
        r.finish()?;
        Ok(Self { msg_id })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16_le(self.msg_id);
        Ok(())
    }
}
