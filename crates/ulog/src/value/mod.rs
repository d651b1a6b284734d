//! Dynamic value trees for message payloads.
//!
//! A [`ValueNode`] is both the decode template for a message and the decoded
//! value: templates hold zeroed scalars, decoding overwrites them in field
//! order.

mod builder;
mod schema;

use std::fmt;

use bytes::{Buf, BufMut};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::token::{BaseType, TokenKind, TypeDefinition, MAX_PAYLOAD_SIZE};

pub use builder::ValueTreeBuilder;
pub use schema::LogSchema;

/// One primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// `int8_t`
    Int8(i8),
    /// `uint8_t`
    UInt8(u8),
    /// `int16_t`
    Int16(i16),
    /// `uint16_t`
    UInt16(u16),
    /// `int32_t`
    Int32(i32),
    /// `uint32_t`
    UInt32(u32),
    /// `int64_t`
    Int64(i64),
    /// `uint64_t`
    UInt64(u64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `bool`
    Bool(bool),
    /// `char`, one byte.
    Char(u8),
}

impl Scalar {
    /// The zero value of a primitive kind.
    #[must_use]
    pub fn zero(base_type: BaseType) -> Option<Self> {
        Some(match base_type {
            BaseType::Int8 => Self::Int8(0),
            BaseType::UInt8 => Self::UInt8(0),
            BaseType::Int16 => Self::Int16(0),
            BaseType::UInt16 => Self::UInt16(0),
            BaseType::Int32 => Self::Int32(0),
            BaseType::UInt32 => Self::UInt32(0),
            BaseType::Int64 => Self::Int64(0),
            BaseType::UInt64 => Self::UInt64(0),
            BaseType::Float => Self::Float(0.0),
            BaseType::Double => Self::Double(0.0),
            BaseType::Bool => Self::Bool(false),
            BaseType::Char => Self::Char(0),
            BaseType::Reference => return None,
        })
    }

    /// The primitive kind.
    #[must_use]
    pub fn base_type(&self) -> BaseType {
        match self {
            Self::Int8(_) => BaseType::Int8,
            Self::UInt8(_) => BaseType::UInt8,
            Self::Int16(_) => BaseType::Int16,
            Self::UInt16(_) => BaseType::UInt16,
            Self::Int32(_) => BaseType::Int32,
            Self::UInt32(_) => BaseType::UInt32,
            Self::Int64(_) => BaseType::Int64,
            Self::UInt64(_) => BaseType::UInt64,
            Self::Float(_) => BaseType::Float,
            Self::Double(_) => BaseType::Double,
            Self::Bool(_) => BaseType::Bool,
            Self::Char(_) => BaseType::Char,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Int8(_) | Self::UInt8(_) | Self::Bool(_) | Self::Char(_) => 1,
            Self::Int16(_) | Self::UInt16(_) => 2,
            Self::Int32(_) | Self::UInt32(_) | Self::Float(_) => 4,
            Self::Int64(_) | Self::UInt64(_) | Self::Double(_) => 8,
        }
    }

    /// The value widened to `f64`, `None` for `bool` and `char`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            Self::Int8(v) => f64::from(v),
            Self::UInt8(v) => f64::from(v),
            Self::Int16(v) => f64::from(v),
            Self::UInt16(v) => f64::from(v),
            Self::Int32(v) => f64::from(v),
            Self::UInt32(v) => f64::from(v),
            Self::Int64(v) => v as f64,
            Self::UInt64(v) => v as f64,
            Self::Float(v) => f64::from(v),
            Self::Double(v) => v,
            Self::Bool(_) | Self::Char(_) => return None,
        })
    }

    fn read(&mut self, kind: TokenKind, buf: &mut &[u8]) -> Result<()> {
        if buf.remaining() < self.size() {
            return Err(Error::malformed(
                kind,
                format!(
                    "{:?} value needs {} bytes, {} remaining",
                    self.base_type(),
                    self.size(),
                    buf.remaining()
                ),
            ));
        }
        match self {
            Self::Int8(v) => *v = buf.get_i8(),
            Self::UInt8(v) => *v = buf.get_u8(),
            Self::Int16(v) => *v = buf.get_i16_le(),
            Self::UInt16(v) => *v = buf.get_u16_le(),
            Self::Int32(v) => *v = buf.get_i32_le(),
            Self::UInt32(v) => *v = buf.get_u32_le(),
            Self::Int64(v) => *v = buf.get_i64_le(),
            Self::UInt64(v) => *v = buf.get_u64_le(),
            Self::Float(v) => *v = buf.get_f32_le(),
            Self::Double(v) => *v = buf.get_f64_le(),
            Self::Bool(v) => *v = buf.get_u8() != 0,
            Self::Char(v) => *v = buf.get_u8(),
        }
        Ok(())
    }

    fn write<B: BufMut>(&self, buf: &mut B) {
        match *self {
            Self::Int8(v) => buf.put_i8(v),
            Self::UInt8(v) => buf.put_u8(v),
            Self::Int16(v) => buf.put_i16_le(v),
            Self::UInt16(v) => buf.put_u16_le(v),
            Self::Int32(v) => buf.put_i32_le(v),
            Self::UInt32(v) => buf.put_u32_le(v),
            Self::Int64(v) => buf.put_i64_le(v),
            Self::UInt64(v) => buf.put_u64_le(v),
            Self::Float(v) => buf.put_f32_le(v),
            Self::Double(v) => buf.put_f64_le(v),
            Self::Bool(v) => buf.put_u8(u8::from(v)),
            Self::Char(v) => buf.put_u8(v),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "{:?}", char::from(*v)),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match *self {
            Self::Int8(v) => serializer.serialize_i8(v),
            Self::UInt8(v) => serializer.serialize_u8(v),
            Self::Int16(v) => serializer.serialize_i16(v),
            Self::UInt16(v) => serializer.serialize_u16(v),
            Self::Int32(v) => serializer.serialize_i32(v),
            Self::UInt32(v) => serializer.serialize_u32(v),
            Self::Int64(v) => serializer.serialize_i64(v),
            Self::UInt64(v) => serializer.serialize_u64(v),
            Self::Float(v) => serializer.serialize_f32(v),
            Self::Double(v) => serializer.serialize_f64(v),
            Self::Bool(v) => serializer.serialize_bool(v),
            Self::Char(v) => serializer.serialize_char(char::from(v)),
        }
    }
}

/// The fields of a message, in wire order.
///
/// A trailing alignment field is not visible as a field; only its size is
/// kept so decoding still skips it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectNode {
    fields: Vec<(String, ValueNode)>,
    padding: usize,
}

impl ObjectNode {
    /// An object without fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a visible field.
    pub fn push(&mut self, name: impl Into<String>, node: ValueNode) {
        self.fields.push((name.into(), node));
    }

    /// Set the number of hidden trailing filler bytes.
    pub fn set_padding(&mut self, bytes: usize) {
        self.padding = bytes;
    }

    /// Hidden trailing filler bytes.
    #[must_use]
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Look up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ValueNode> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, node)| node)
    }

    /// Look up a field by name for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ValueNode> {
        self.fields
            .iter_mut()
            .find(|(field, _)| field == name)
            .map(|(_, node)| node)
    }

    /// Visible fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ValueNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Number of visible fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no visible fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A scalar, an array of nodes, or an object of named nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    /// A primitive value.
    Scalar(Scalar),
    /// Fixed-size array; every element owns its own value.
    Array(Vec<ValueNode>),
    /// Named fields.
    Object(ObjectNode),
}

impl ValueNode {
    /// The template for a primitive type or array of primitives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] for references, which need format
    /// definitions, and for arrays too large for any frame.
    pub fn primitive_template(kind: TokenKind, type_def: &TypeDefinition) -> Result<Self> {
        let scalar = Scalar::zero(type_def.base_type()).ok_or_else(|| {
            Error::malformed(kind, format!("type '{type_def}' is not primitive"))
        })?;
        Self::repeat(kind, Self::Scalar(scalar), type_def.array_size())
    }

    /// Wrap `element` in an array of `array_size` independent copies; zero
    /// returns the element itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the array would hold more bytes
    /// or nodes than a frame payload can carry.
    pub fn repeat(kind: TokenKind, element: Self, array_size: usize) -> Result<Self> {
        if array_size == 0 {
            return Ok(element);
        }
        check_template_size(
            kind,
            element.byte_size().checked_mul(array_size),
            element.node_count().checked_mul(array_size),
        )?;
        Ok(Self::Array(vec![element; array_size]))
    }

    /// Number of nodes in the tree, this one included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Array(items) => 1 + items.iter().map(Self::node_count).sum::<usize>(),
            Self::Object(object) => {
                1 + object
                    .fields
                    .iter()
                    .map(|(_, node)| node.node_count())
                    .sum::<usize>()
            }
        }
    }

    /// Encoded size in bytes, hidden padding included.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Scalar(scalar) => scalar.size(),
            Self::Array(items) => items.iter().map(Self::byte_size).sum(),
            Self::Object(object) => {
                object
                    .fields
                    .iter()
                    .map(|(_, node)| node.byte_size())
                    .sum::<usize>()
                    + object.padding
            }
        }
    }

    /// Overwrite this node with values read from `buf`, in field order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] for `kind` if `buf` runs out.
    pub fn decode(&mut self, kind: TokenKind, buf: &mut &[u8]) -> Result<()> {
        match self {
            Self::Scalar(scalar) => scalar.read(kind, buf),
            Self::Array(items) => items.iter_mut().try_for_each(|item| item.decode(kind, buf)),
            Self::Object(object) => {
                for (_, node) in &mut object.fields {
                    node.decode(kind, buf)?;
                }
                if buf.remaining() < object.padding {
                    return Err(Error::malformed(
                        kind,
                        format!(
                            "padding needs {} bytes, {} remaining",
                            object.padding,
                            buf.remaining()
                        ),
                    ));
                }
                buf.advance(object.padding);
                Ok(())
            }
        }
    }

    /// Append the encoded value; hidden padding is written as zeros.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Scalar(scalar) => scalar.write(buf),
            Self::Array(items) => items.iter().for_each(|item| item.encode(buf)),
            Self::Object(object) => {
                for (_, node) in &object.fields {
                    node.encode(buf);
                }
                buf.put_bytes(0, object.padding);
            }
        }
    }

    /// The scalar, if this is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[ValueNode]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The elements for modification, if this is an array.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<ValueNode>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The object, if this is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Field of an object by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ValueNode> {
        self.as_object().and_then(|object| object.get(name))
    }

    /// Field of an object by name, for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ValueNode> {
        match self {
            Self::Object(object) => object.get_mut(name),
            _ => None,
        }
    }

    /// A `char` array as text, cut at the first NUL.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        let items = self.as_array().filter(|items| !items.is_empty())?;
        let bytes: Option<Vec<u8>> = items
            .iter()
            .map(|item| match item {
                Self::Scalar(Scalar::Char(c)) => Some(*c),
                _ => None,
            })
            .collect();
        let bytes = bytes?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Fail unless a template of `bytes` bytes and `nodes` nodes fits in one frame
/// payload. `None` stands for an overflowed count.
pub(crate) fn check_template_size(
    kind: TokenKind,
    bytes: Option<usize>,
    nodes: Option<usize>,
) -> Result<()> {
    match (bytes, nodes) {
        (Some(bytes), Some(nodes)) if bytes <= MAX_PAYLOAD_SIZE && nodes <= MAX_PAYLOAD_SIZE => {
            Ok(())
        }
        _ => Err(Error::malformed(
            kind,
            format!("value template exceeds the frame limit of {MAX_PAYLOAD_SIZE} bytes"),
        )),
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.as_text() {
            return write!(f, "{text:?}");
        }
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(object) => {
                f.write_str("{")?;
                for (i, (name, node)) in object.fields().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {node}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for ValueNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if let Some(text) = self.as_text() {
            return serializer.serialize_str(&text);
        }
        match self {
            Self::Scalar(scalar) => scalar.serialize(serializer),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (name, node) in object.fields() {
                    map.serialize_entry(name, node)?;
                }
                map.end()
            }
        }
    }
}
