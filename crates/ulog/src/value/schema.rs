//! Format and subscription tables collected while reading a log.

use std::collections::HashMap;

use tracing::debug;

use super::{ValueNode, ValueTreeBuilder};
use crate::error::Result;
use crate::token::{Format, LoggedData, Subscription, Token};

/// Tracks the formats and subscriptions seen so far and decodes logged data
/// against them.
#[derive(Debug, Default)]
pub struct LogSchema {
    formats: HashMap<String, Format>,
    subscriptions: HashMap<u16, Subscription>,
    builder: ValueTreeBuilder,
}

impl LogSchema {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a format, subscription or unsubscription. Other tokens are ignored.
    pub fn observe(&mut self, token: &Token) {
        match token {
            Token::Format(format) => {
                let name = format.message_name().to_string();
                if self.formats.insert(name, format.clone()).is_some() {
                    // nested templates may embed the old definition
                    self.builder.clear();
                }
            }
            Token::Subscription(subscription) => {
                debug!(
                    "Subscribed msg_id {} to '{}'",
                    subscription.msg_id,
                    subscription.message_name()
                );
                self.subscriptions
                    .insert(subscription.msg_id, subscription.clone());
            }
            Token::Unsubscription(unsubscription) => {
                self.subscriptions.remove(&unsubscription.msg_id);
            }
            _ => {}
        }
    }

    /// Decode a logged data payload.
    ///
    /// # Errors
    ///
    /// See [`ValueTreeBuilder::decode`].
    pub fn decode(&mut self, data: &LoggedData) -> Result<ValueNode> {
        self.builder
            .decode(data, &self.formats, &self.subscriptions)
    }

    /// The message name subscribed under `msg_id`.
    #[must_use]
    pub fn message_name(&self, msg_id: u16) -> Option<&str> {
        self.subscriptions
            .get(&msg_id)
            .map(Subscription::message_name)
    }

    /// Known formats by message name.
    #[must_use]
    pub fn formats(&self) -> &HashMap<String, Format> {
        &self.formats
    }

    /// Active subscriptions by message id.
    #[must_use]
    pub fn subscriptions(&self) -> &HashMap<u16, Subscription> {
        &self.subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::token::{FieldDefinition, TypeDefinition, Unsubscription};
    use crate::value::Scalar;

    #[test]
    fn test_observe_and_decode() {
        let mut schema = LogSchema::new();
        schema.observe(&Format::parse("a:int16_t x;").unwrap().into());
        schema.observe(&Subscription::new(2, "a", 0).unwrap().into());
        assert_eq!(schema.message_name(2), Some("a"));

        let node = schema
            .decode(&LoggedData::new(2, (-5i16).to_le_bytes().to_vec()))
            .unwrap();
        assert_eq!(node.get("x").unwrap().as_scalar(), Some(&Scalar::Int16(-5)));
    }

    #[test]
    fn test_unsubscription_removes_binding() {
        let mut schema = LogSchema::new();
        schema.observe(&Subscription::new(2, "a", 0).unwrap().into());
        schema.observe(&Unsubscription { msg_id: 2 }.into());
        assert!(schema.message_name(2).is_none());
        assert!(schema.subscriptions().is_empty());
    }

    #[test]
    fn test_redefined_format_rebuilds_template() {
        let mut schema = LogSchema::new();
        schema.observe(&Format::parse("a:uint8_t x;").unwrap().into());
        schema.observe(&Subscription::new(1, "a", 0).unwrap().into());
        assert!(schema.decode(&LoggedData::new(1, vec![1])).is_ok());

        schema.observe(&Format::parse("a:uint16_t x;").unwrap().into());
        assert!(schema.decode(&LoggedData::new(1, vec![1])).is_err());
        assert!(schema.decode(&LoggedData::new(1, vec![1, 0])).is_ok());
        assert_eq!(schema.formats().len(), 1);
    }

    #[test]
    fn test_huge_array_fails_instead_of_allocating() {
        let field = FieldDefinition::new(
            "x",
            TypeDefinition::UINT8.with_array_size(1_152_921_504_606_846_975),
        )
        .unwrap();
        let mut schema = LogSchema::new();
        schema.observe(&Format::new("m", vec![field]).unwrap().into());
        schema.observe(&Subscription::new(0, "m", 0).unwrap().into());
        let err = schema.decode(&LoggedData::new(0, vec![0u8; 4])).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }
}
