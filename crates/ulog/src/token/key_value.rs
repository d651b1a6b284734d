//! Key-value tokens: information, multi information, parameters and defaults.
//!
//! All four share one body: `u8 key_len`, the key text `type[N] name`, then
//! the raw value bytes up to the end of the payload. Each token composes
//! [`KeyValue`] and adds its own prefix or restriction.

use std::fmt;

use bytes::{BufMut, Bytes};

use super::codec::PayloadReader;
use super::types::{BaseType, FieldDefinition, TypeDefinition};
use super::{TokenCodec, TokenKind};
use crate::error::{Error, Result};
use crate::value::ValueNode;

/// Largest key text a `u8` length prefix can describe.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// A typed key and its raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    /// The key: value type and name.
    pub key: FieldDefinition,
    /// The value as stored on the wire.
    pub value: Bytes,
}

impl KeyValue {
    /// Create an entry from a key and raw value bytes.
    #[must_use]
    pub fn new(key: FieldDefinition, value: impl Into<Bytes>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Create a `char[N]` entry holding a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name fails the field-name grammar.
    pub fn string(name: &str, value: &str) -> Result<Self> {
        let key = FieldDefinition::new(name, TypeDefinition::CHAR.with_array_size(value.len()))?;
        Ok(Self::new(key, Bytes::copy_from_slice(value.as_bytes())))
    }

    /// The key name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Interpret the value bytes through the key type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the key type is a reference, is
    /// too large for a frame, or the value bytes do not match its size.
    pub fn value_node(&self, kind: TokenKind) -> Result<ValueNode> {
        let mut node = ValueNode::primitive_template(kind, self.key.type_def())?;
        let mut buf = &self.value[..];
        node.decode(kind, &mut buf)?;
        if !buf.is_empty() {
            return Err(Error::malformed(
                kind,
                format!("{} bytes left after value '{}'", buf.len(), self.key),
            ));
        }
        Ok(node)
    }

    /// The value rendered as text when it is a `char` array.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        let type_def = self.key.type_def();
        if type_def.base_type() != BaseType::Char {
            return None;
        }
        Some(String::from_utf8_lossy(&self.value).into_owned())
    }

    pub(crate) fn byte_size(&self) -> usize {
        1 + self.key.text_len() + self.value.len()
    }

    pub(crate) fn decode(r: &mut PayloadReader<'_>) -> Result<Self> {
        let kind = r.kind();
        let key_len = r.u8("key length")? as usize;
        let key_text = r.text(key_len, "key")?;
        let key = FieldDefinition::parse(kind, key_text)?;
        let value = Bytes::copy_from_slice(r.rest());
        Ok(Self { key, value })
    }

    pub(crate) fn encode<B: BufMut>(&self, kind: TokenKind, buf: &mut B) -> Result<()> {
        let key_text = self.key.to_string();
        if key_text.len() > MAX_KEY_LEN {
            return Err(Error::PayloadTooLarge {
                kind,
                size: key_text.len(),
                max: MAX_KEY_LEN,
            });
        }
        buf.put_u8(key_text.len() as u8);
        buf.put_slice(key_text.as_bytes());
        buf.put_slice(&self.value);
        Ok(())
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{} = {text:?}", self.key),
            None => match self.value_node(TokenKind::Information) {
                Ok(node) => write!(f, "{} = {node}", self.key),
                Err(_) => write!(f, "{} = <{} bytes>", self.key, self.value.len()),
            },
        }
    }
}

/// `'I'`: one key-value pair describing the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Information {
    /// The entry.
    pub entry: KeyValue,
}

impl TokenCodec for Information {
    const KIND: TokenKind = TokenKind::Information;

    fn byte_size(&self) -> usize {
        self.entry.byte_size()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let entry = KeyValue::decode(&mut r)?;
        Ok(Self { entry })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.entry.encode(Self::KIND, buf)
    }
}

/// `'M'`: information that may be split across several tokens with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiInformation {
    /// Set when this token continues the previous one with the same key.
    pub is_continued: bool,
    /// The entry.
    pub entry: KeyValue,
}

impl TokenCodec for MultiInformation {
    const KIND: TokenKind = TokenKind::MultiInformation;

    fn byte_size(&self) -> usize {
        1 + self.entry.byte_size()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let is_continued = match r.u8("is_continued")? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::malformed(
                    Self::KIND,
                    format!("is_continued must be 0 or 1, got {other}"),
                ))
            }
        };
        let entry = KeyValue::decode(&mut r)?;
        Ok(Self {
            is_continued,
            entry,
        })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.is_continued));
        self.entry.encode(Self::KIND, buf)
    }
}

/// A parameter value: parameters are restricted to `int32_t` and `float`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// `int32_t`
    Int32(i32),
    /// `float`
    Float(f32),
}

impl ParameterValue {
    fn type_def(self) -> TypeDefinition {
        match self {
            Self::Int32(_) => TypeDefinition::INT32,
            Self::Float(_) => TypeDefinition::FLOAT,
        }
    }

    fn to_bytes(self) -> Bytes {
        match self {
            Self::Int32(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Self::Float(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

fn check_parameter_type(kind: TokenKind, entry: &KeyValue) -> Result<()> {
    let type_def = entry.key.type_def();
    match type_def.base_type() {
        BaseType::Int32 | BaseType::Float => Ok(()),
        _ => Err(Error::InvalidParameterValueType {
            kind,
            type_name: type_def.to_string(),
        }),
    }
}

fn parameter_entry(name: &str, value: ParameterValue) -> Result<KeyValue> {
    let key = FieldDefinition::new(name, value.type_def())?;
    Ok(KeyValue::new(key, value.to_bytes()))
}

fn read_parameter_value(kind: TokenKind, entry: &KeyValue) -> Result<ParameterValue> {
    let raw: [u8; 4] = entry.value[..].try_into().map_err(|_| {
        Error::malformed(
            kind,
            format!("parameter value has {} bytes, expected 4", entry.value.len()),
        )
    })?;
    match entry.key.type_def().base_type() {
        BaseType::Int32 => Ok(ParameterValue::Int32(i32::from_le_bytes(raw))),
        BaseType::Float => Ok(ParameterValue::Float(f32::from_le_bytes(raw))),
        _ => Err(Error::InvalidParameterValueType {
            kind,
            type_name: entry.key.type_def().to_string(),
        }),
    }
}

/// `'P'`: a parameter value, at start-up or when it changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// The entry. Its type is `int32_t` or `float`.
    pub entry: KeyValue,
}

impl Parameter {
    /// Create a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name fails the field-name grammar.
    pub fn new(name: &str, value: ParameterValue) -> Result<Self> {
        Ok(Self {
            entry: parameter_entry(name, value)?,
        })
    }

    /// The typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not a 4-byte `int32_t` or `float`.
    pub fn value(&self) -> Result<ParameterValue> {
        read_parameter_value(Self::KIND, &self.entry)
    }
}

impl TokenCodec for Parameter {
    const KIND: TokenKind = TokenKind::Parameter;

    fn byte_size(&self) -> usize {
        self.entry.byte_size()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let entry = KeyValue::decode(&mut r)?;
        check_parameter_type(Self::KIND, &entry)?;
        Ok(Self { entry })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        check_parameter_type(Self::KIND, &self.entry)?;
        self.entry.encode(Self::KIND, buf)
    }
}

/// Bitfield naming the group(s) a default parameter value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefaultTypes(u8);

impl DefaultTypes {
    /// System-wide default.
    pub const SYSTEM_WIDE: Self = Self(1 << 0);
    /// Default for the current configuration, such as an airframe.
    pub const CURRENT_CONFIGURATION: Self = Self(1 << 1);

    /// Wrap raw bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefaultParameterType`] when no bit is set.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits == 0 {
            return Err(Error::InvalidDefaultParameterType);
        }
        Ok(Self(bits))
    }

    /// The raw bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether all bits of `other` are set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DefaultTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// `'Q'`: the default value of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefaultParameter {
    /// Which defaults this value is.
    pub default_types: DefaultTypes,
    /// The entry. Its type is `int32_t` or `float`.
    pub entry: KeyValue,
}

impl DefaultParameter {
    /// Create a default parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name fails the field-name grammar.
    pub fn new(name: &str, value: ParameterValue, default_types: DefaultTypes) -> Result<Self> {
        Ok(Self {
            default_types,
            entry: parameter_entry(name, value)?,
        })
    }

    /// The typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is not a 4-byte `int32_t` or `float`.
    pub fn value(&self) -> Result<ParameterValue> {
        read_parameter_value(Self::KIND, &self.entry)
    }
}

impl TokenCodec for DefaultParameter {
    const KIND: TokenKind = TokenKind::DefaultParameter;

    fn byte_size(&self) -> usize {
        1 + self.entry.byte_size()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(Self::KIND, payload);
        let default_types = DefaultTypes::from_bits(r.u8("default types")?)?;
        let entry = KeyValue::decode(&mut r)?;
        check_parameter_type(Self::KIND, &entry)?;
        Ok(Self {
            default_types,
            entry,
        })
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        check_parameter_type(Self::KIND, &self.entry)?;
        buf.put_u8(self.default_types.bits());
        self.entry.encode(Self::KIND, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_value_payload(key: &str, value: &[u8]) -> Vec<u8> {
        let mut out = vec![key.len() as u8];
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_information_string() {
        let payload = key_value_payload("char[5] sys_name", b"PX4_1");
        let info = Information::decode(&payload).unwrap();
        assert_eq!(info.entry.name(), "sys_name");
        assert_eq!(info.entry.as_text().as_deref(), Some("PX4_1"));
        assert_eq!(info.byte_size(), payload.len());

        let mut out = Vec::new();
        info.encode(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_information_numeric_value() {
        let payload = key_value_payload("uint32_t ver_hw_subtype", &7u32.to_le_bytes());
        let info = Information::decode(&payload).unwrap();
        assert_eq!(info.entry.as_text(), None);
        let node = info.entry.value_node(TokenKind::Information).unwrap();
        assert_eq!(node.to_string(), "7");
    }

    #[test]
    fn test_information_key_overrun() {
        let mut payload = key_value_payload("char[3] a", b"abc");
        payload[0] = 200;
        assert!(matches!(
            Information::decode(&payload).unwrap_err(),
            Error::MalformedPayload { .. }
        ));
    }

    #[test]
    fn test_key_too_long() {
        let name = "n".repeat(260);
        let key = FieldDefinition::new(name, TypeDefinition::UINT8).unwrap();
        let info = Information {
            entry: KeyValue::new(key, vec![0u8]),
        };
        let mut out = Vec::new();
        assert!(matches!(
            info.encode(&mut out).unwrap_err(),
            Error::PayloadTooLarge { max: 255, .. }
        ));
    }

    #[test]
    fn test_multi_information_continued() {
        let mut payload = vec![1u8];
        payload.extend(key_value_payload("char[3] perf_top", b"abc"));
        let multi = MultiInformation::decode(&payload).unwrap();
        assert!(multi.is_continued);
        assert_eq!(multi.byte_size(), payload.len());

        let mut out = Vec::new();
        multi.encode(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_multi_information_bad_flag() {
        let mut payload = vec![7u8];
        payload.extend(key_value_payload("char[1] x", b"a"));
        assert!(MultiInformation::decode(&payload).is_err());
    }

    #[test]
    fn test_parameter_round_trip() {
        let param = Parameter::new("MC_ROLL_P", ParameterValue::Float(6.5)).unwrap();
        let mut out = Vec::new();
        param.encode(&mut out).unwrap();
        assert_eq!(out.len(), param.byte_size());
        let decoded = Parameter::decode(&out).unwrap();
        assert_eq!(decoded, param);
        assert_eq!(decoded.value().unwrap(), ParameterValue::Float(6.5));
    }

    #[test]
    fn test_parameter_rejects_other_types() {
        let payload = key_value_payload("uint8_t SYS_AUTOSTART", &[1]);
        let err = Parameter::decode(&payload).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameterValueType {
                kind: TokenKind::Parameter,
                ..
            }
        ));

        let key = FieldDefinition::new("X", TypeDefinition::DOUBLE).unwrap();
        let param = Parameter {
            entry: KeyValue::new(key, vec![0u8; 8]),
        };
        let mut out = Vec::new();
        assert!(param.encode(&mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_default_parameter_round_trip() {
        let param = DefaultParameter::new(
            "SYS_AUTOSTART",
            ParameterValue::Int32(4001),
            DefaultTypes::SYSTEM_WIDE | DefaultTypes::CURRENT_CONFIGURATION,
        )
        .unwrap();
        let mut out = Vec::new();
        param.encode(&mut out).unwrap();
        assert_eq!(out[0], 3);
        let decoded = DefaultParameter::decode(&out).unwrap();
        assert_eq!(decoded, param);
        assert!(decoded.default_types.contains(DefaultTypes::SYSTEM_WIDE));
        assert_eq!(decoded.value().unwrap(), ParameterValue::Int32(4001));
    }

    #[test]
    fn test_default_parameter_none_rejected() {
        let mut payload = vec![0u8];
        payload.extend(key_value_payload("int32_t X", &1i32.to_le_bytes()));
        assert!(matches!(
            DefaultParameter::decode(&payload).unwrap_err(),
            Error::InvalidDefaultParameterType
        ));
        assert!(DefaultTypes::from_bits(0).is_err());
    }

    #[test]
    fn test_key_value_display() {
        let entry = KeyValue::string("sys_name", "PX4").unwrap();
        assert_eq!(entry.to_string(), "char[3] sys_name = \"PX4\"");
    }

    #[test]
    fn test_oversized_value_type_displays_raw_bytes() {
        let key = FieldDefinition::new("blob", TypeDefinition::INT32.with_array_size(1 << 40)).unwrap();
        let entry = KeyValue::new(key, vec![1, 2, 3, 4]);
        assert!(entry.value_node(TokenKind::Information).is_err());
        assert!(entry.to_string().ends_with("= <4 bytes>"));
    }
}
