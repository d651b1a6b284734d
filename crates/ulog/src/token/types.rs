//! Type and field definitions used by format and key-value tokens.
//!
//! A type is written as `name` or `name[N]`; a field as `type name`.

use std::borrow::Cow;
use std::fmt;

use super::identifier::FIELD_NAME;
use super::{TokenKind, MAX_PAYLOAD_SIZE};
use crate::error::{Error, Result};

/// The primitive kinds a field can have, plus references to other formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// `int8_t`
    Int8,
    /// `uint8_t`
    UInt8,
    /// `int16_t`
    Int16,
    /// `uint16_t`
    UInt16,
    /// `int32_t`
    Int32,
    /// `uint32_t`
    UInt32,
    /// `int64_t`
    Int64,
    /// `uint64_t`
    UInt64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `bool`
    Bool,
    /// `char`
    Char,
    /// Any other name: a nested message defined by its own format.
    Reference,
}

impl BaseType {
    /// All primitive kinds, in declaration order.
    pub const PRIMITIVES: [BaseType; 12] = [
        BaseType::Int8,
        BaseType::UInt8,
        BaseType::Int16,
        BaseType::UInt16,
        BaseType::Int32,
        BaseType::UInt32,
        BaseType::Int64,
        BaseType::UInt64,
        BaseType::Float,
        BaseType::Double,
        BaseType::Bool,
        BaseType::Char,
    ];

    /// Resolve a type name. Unknown names are references.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "int8_t" => Self::Int8,
            "uint8_t" => Self::UInt8,
            "int16_t" => Self::Int16,
            "uint16_t" => Self::UInt16,
            "int32_t" => Self::Int32,
            "uint32_t" => Self::UInt32,
            "int64_t" => Self::Int64,
            "uint64_t" => Self::UInt64,
            "float" => Self::Float,
            "double" => Self::Double,
            "bool" => Self::Bool,
            "char" => Self::Char,
            _ => Self::Reference,
        }
    }

    /// Wire name of a primitive kind.
    #[must_use]
    pub fn type_name(self) -> Option<&'static str> {
        Some(match self {
            Self::Int8 => "int8_t",
            Self::UInt8 => "uint8_t",
            Self::Int16 => "int16_t",
            Self::UInt16 => "uint16_t",
            Self::Int32 => "int32_t",
            Self::UInt32 => "uint32_t",
            Self::Int64 => "int64_t",
            Self::UInt64 => "uint64_t",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Reference => return None,
        })
    }

    /// Encoded size of one value, `None` for references.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        Some(match self {
            Self::Int8 | Self::UInt8 | Self::Bool | Self::Char => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
            Self::Reference => return None,
        })
    }

    /// Whether this is a primitive kind.
    #[must_use]
    pub fn is_primitive(self) -> bool {
        self != Self::Reference
    }
}

/// A field type such as `float`, `uint8_t[16]` or `vehicle_attitude`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDefinition {
    base_type: BaseType,
    type_name: Cow<'static, str>,
    array_size: usize,
}

impl TypeDefinition {
    /// `int8_t`
    pub const INT8: Self = Self::builtin(BaseType::Int8, "int8_t");
    /// `uint8_t`
    pub const UINT8: Self = Self::builtin(BaseType::UInt8, "uint8_t");
    /// `int16_t`
    pub const INT16: Self = Self::builtin(BaseType::Int16, "int16_t");
    /// `uint16_t`
    pub const UINT16: Self = Self::builtin(BaseType::UInt16, "uint16_t");
    /// `int32_t`
    pub const INT32: Self = Self::builtin(BaseType::Int32, "int32_t");
    /// `uint32_t`
    pub const UINT32: Self = Self::builtin(BaseType::UInt32, "uint32_t");
    /// `int64_t`
    pub const INT64: Self = Self::builtin(BaseType::Int64, "int64_t");
    /// `uint64_t`
    pub const UINT64: Self = Self::builtin(BaseType::UInt64, "uint64_t");
    /// `float`
    pub const FLOAT: Self = Self::builtin(BaseType::Float, "float");
    /// `double`
    pub const DOUBLE: Self = Self::builtin(BaseType::Double, "double");
    /// `bool`
    pub const BOOL: Self = Self::builtin(BaseType::Bool, "bool");
    /// `char`
    pub const CHAR: Self = Self::builtin(BaseType::Char, "char");

    const fn builtin(base_type: BaseType, name: &'static str) -> Self {
        Self {
            base_type,
            type_name: Cow::Borrowed(name),
            array_size: 0,
        }
    }

    /// The scalar definition of a primitive kind, `None` for references.
    #[must_use]
    pub fn primitive(base_type: BaseType) -> Option<Self> {
        base_type
            .type_name()
            .map(|name| Self::builtin(base_type, name))
    }

    /// A definition referring to another format by message name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name is not a valid type name.
    pub fn reference(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        FIELD_NAME.check(TokenKind::Format, &name)?;
        Ok(Self {
            base_type: BaseType::from_type_name(&name),
            type_name: Cow::Owned(name),
            array_size: 0,
        })
    }

    /// The same type as a fixed-size array. Zero means scalar.
    #[must_use]
    pub fn with_array_size(mut self, array_size: usize) -> Self {
        self.array_size = array_size;
        self
    }

    /// Parse `name` or `name[N]`, surrounding whitespace ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the array size is not a number in
    /// `1..=MAX_PAYLOAD_SIZE` or the name fails the field-name grammar.
    pub fn parse(kind: TokenKind, text: &str) -> Result<Self> {
        let text = text.trim();
        let (name, array_size) = match (text.find('['), text.find(']')) {
            (Some(open), Some(close)) if open < close => {
                let size = text[open + 1..close].trim();
                let size = match size.parse::<usize>() {
                    Ok(n) if (1..=MAX_PAYLOAD_SIZE).contains(&n) => n,
                    _ => {
                        return Err(Error::malformed(
                            kind,
                            format!("invalid array size '{size}' in '{text}'"),
                        ))
                    }
                };
                (text[..open].trim(), size)
            }
            (None, None) => (text, 0),
            _ => {
                return Err(Error::malformed(
                    kind,
                    format!("unbalanced array brackets in '{text}'"),
                ))
            }
        };
        FIELD_NAME.check(kind, name)?;
        let base_type = BaseType::from_type_name(name);
        let type_name = match base_type.type_name() {
            Some(builtin) => Cow::Borrowed(builtin),
            None => Cow::Owned(name.to_string()),
        };
        Ok(Self {
            base_type,
            type_name,
            array_size,
        })
    }

    /// The resolved kind.
    #[must_use]
    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    /// The name as written on the wire, without the array suffix.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Number of elements, 0 for scalars.
    #[must_use]
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    /// Whether this is an array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.array_size > 0
    }

    /// Length of the textual form in bytes.
    #[must_use]
    pub fn text_len(&self) -> usize {
        if self.is_array() {
            self.type_name.len() + 2 + decimal_len(self.array_size)
        } else {
            self.type_name.len()
        }
    }
}

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array() {
            write!(f, "{}[{}]", self.type_name, self.array_size)
        } else {
            f.write_str(&self.type_name)
        }
    }
}

/// A named field: `type name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDefinition {
    name: String,
    type_def: TypeDefinition,
}

/// Prefix that marks an alignment filler field.
pub const PADDING_PREFIX: &str = "_padding";

impl FieldDefinition {
    /// Create a field after validating its name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name fails the field-name grammar.
    pub fn new(name: impl Into<String>, type_def: TypeDefinition) -> Result<Self> {
        let name = name.into();
        FIELD_NAME.check(TokenKind::Format, &name)?;
        Ok(Self { name, type_def })
    }

    /// Parse `type[N] name`. The type ends at the first space.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no separating space or either part is invalid.
    pub fn parse(kind: TokenKind, text: &str) -> Result<Self> {
        let Some((type_text, name)) = text.split_once(' ') else {
            return Err(Error::malformed(
                kind,
                format!("field '{text}' has no space between type and name"),
            ));
        };
        let type_def = TypeDefinition::parse(kind, type_text)?;
        let name = name.trim();
        FIELD_NAME.check(kind, name)?;
        Ok(Self {
            name: name.to_string(),
            type_def,
        })
    }

    /// The field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field type.
    #[must_use]
    pub fn type_def(&self) -> &TypeDefinition {
        &self.type_def
    }

    /// Whether the name marks an alignment filler.
    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.name.starts_with(PADDING_PREFIX)
    }

    /// Length of the textual form in bytes.
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.type_def.text_len() + 1 + self.name.len()
    }
}

impl fmt::Display for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_def, self.name)
    }
}

fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}
