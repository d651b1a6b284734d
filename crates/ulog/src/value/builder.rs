//! Builds and caches decode templates from format definitions.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{check_template_size, ObjectNode, Scalar, ValueNode};
use crate::error::{Error, Result};
use crate::token::{BaseType, Format, LoggedData, Subscription, TokenKind, TypeDefinition};

#[derive(Debug, Clone)]
struct Template {
    root: ValueNode,
    byte_size: usize,
}

/// Compiles format definitions into value templates, once per message name.
///
/// The format and subscription tables stay with the caller and are passed in
/// on every call.
#[derive(Debug, Default)]
pub struct ValueTreeBuilder {
    templates: HashMap<String, Template>,
}

impl ValueTreeBuilder {
    /// Create a builder with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The template for `message_name`, built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFormat`] if the message or a type it references
    /// has no format, [`Error::RecursiveFormat`] if a format contains itself,
    /// and [`Error::MalformedPayload`] if the template cannot fit in a frame.
    pub fn template(
        &mut self,
        message_name: &str,
        formats: &HashMap<String, Format>,
    ) -> Result<&ValueNode> {
        self.cached(message_name, formats).map(|t| &t.root)
    }

    fn cached(
        &mut self,
        message_name: &str,
        formats: &HashMap<String, Format>,
    ) -> Result<&Template> {
        if !self.templates.contains_key(message_name) {
            let mut stack = Vec::new();
            let root = build_object(message_name, formats, &mut stack)?;
            let byte_size = root.byte_size();
            debug!(
                "Built value template for '{}' ({} bytes)",
                message_name, byte_size
            );
            self.templates
                .insert(message_name.to_string(), Template { root, byte_size });
        }
        self.templates
            .get(message_name)
            .ok_or_else(|| Error::UnknownFormat(message_name.to_string()))
    }

    /// Decode a logged data payload into a value tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessageId`] if the message id has no
    /// subscription, the errors of [`ValueTreeBuilder::template`], and
    /// [`Error::FramingError`] unless the payload is exactly as long as the
    /// template.
    pub fn decode(
        &mut self,
        data: &LoggedData,
        formats: &HashMap<String, Format>,
        subscriptions: &HashMap<u16, Subscription>,
    ) -> Result<ValueNode> {
        let subscription = subscriptions
            .get(&data.msg_id)
            .ok_or(Error::UnknownMessageId(data.msg_id))?;
        let message_name = subscription.message_name();
        let template = self.cached(message_name, formats)?;

        let framing_error = || Error::FramingError {
            message_name: message_name.to_string(),
            expected: template.byte_size,
            actual: data.data.len(),
        };

        let mut node = template.root.clone();
        let mut buf = &data.data[..];
        node.decode(TokenKind::LoggedData, &mut buf)
            .map_err(|_| framing_error())?;
        if !buf.is_empty() {
            return Err(framing_error());
        }
        trace!("Decoded {} bytes of '{}'", data.data.len(), message_name);
        Ok(node)
    }

    /// Drop the cached template of one message.
    pub fn invalidate(&mut self, message_name: &str) {
        self.templates.remove(message_name);
    }

    /// Drop all cached templates.
    pub fn clear(&mut self) {
        self.templates.clear();
    }

    /// Number of cached templates.
    #[must_use]
    pub fn cached_templates(&self) -> usize {
        self.templates.len()
    }
}

fn build_object(
    message_name: &str,
    formats: &HashMap<String, Format>,
    stack: &mut Vec<String>,
) -> Result<ValueNode> {
    if stack.iter().any(|name| name == message_name) {
        return Err(Error::RecursiveFormat(message_name.to_string()));
    }
    let format = formats
        .get(message_name)
        .ok_or_else(|| Error::UnknownFormat(message_name.to_string()))?;

    stack.push(message_name.to_string());
    let mut object = ObjectNode::new();
    let (mut bytes, mut nodes) = (0usize, 1usize);
    let last = format.fields().len().saturating_sub(1);
    for (i, field) in format.fields().iter().enumerate() {
        let node = build_field(field.type_def(), formats, stack)?;
        bytes = bytes.saturating_add(node.byte_size());
        nodes = nodes.saturating_add(node.node_count());
        check_template_size(TokenKind::LoggedData, Some(bytes), Some(nodes))?;
        // only a trailing filler is hidden
        if i == last && field.is_padding() {
            object.set_padding(node.byte_size());
        } else {
            object.push(field.name(), node);
        }
    }
    stack.pop();

    Ok(ValueNode::Object(object))
}

fn build_field(
    type_def: &TypeDefinition,
    formats: &HashMap<String, Format>,
    stack: &mut Vec<String>,
) -> Result<ValueNode> {
    let element = match type_def.base_type() {
        BaseType::Reference => build_object(type_def.type_name(), formats, stack)?,
        base => ValueNode::Scalar(
            Scalar::zero(base).ok_or_else(|| Error::UnknownFormat(type_def.to_string()))?,
        ),
    };
    ValueNode::repeat(TokenKind::LoggedData, element, type_def.array_size())
}
