//! Error types for ulog.
//!
//! This module defines all error types used throughout the ulog crate. Errors
//! that concern a single token carry the token kind and, where it matters, the
//! log section the token was seen in.

use thiserror::Error;

use crate::token::{Section, TokenKind};

/// The main error type for ulog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Framing Errors ===
    /// The 16-byte file header does not start with the ULog magic.
    #[error("malformed header: magic byte {index} is {actual:#04x}, expected {expected:#04x}")]
    MalformedHeader {
        /// Offset of the first mismatching magic byte.
        index: usize,
        /// The byte the format requires.
        expected: u8,
        /// The byte that was found.
        actual: u8,
    },

    /// Tokens arrived (or were appended) in an order the format forbids.
    #[error("protocol order violation at {kind} token: {message}")]
    ProtocolOrderViolation {
        /// The token that broke the ordering.
        kind: TokenKind,
        /// Description of the violated rule.
        message: String,
    },

    /// A frame carried a type id that the catalog does not know.
    #[error("unknown token type {type_id:#04x} in {section} section")]
    UnknownTokenType {
        /// The raw type id byte.
        type_id: u8,
        /// The section the frame was read in.
        section: Section,
    },

    /// A known token showed up in a section it may not appear in.
    #[error("{kind} token is not allowed in the {section} section")]
    WrongSectionForToken {
        /// The offending token.
        kind: TokenKind,
        /// The section the token was read in.
        section: Section,
    },

    // === Token Payload Errors ===
    /// A name failed its identifier grammar.
    #[error("invalid {grammar} '{value}' in {kind} token")]
    InvalidIdentifier {
        /// The token holding the name.
        kind: TokenKind,
        /// Which grammar was violated.
        grammar: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A parameter value was neither `float` nor `int32_t`.
    #[error("{kind} value must be float or int32_t, got '{type_name}'")]
    InvalidParameterValueType {
        /// `Parameter` or `DefaultParameter`.
        kind: TokenKind,
        /// The declared value type.
        type_name: String,
    },

    /// A default parameter declared no default group at all.
    #[error("default parameter type bitfield must not be empty")]
    InvalidDefaultParameterType,

    /// A token payload could not be parsed.
    #[error("malformed {kind} payload: {message}")]
    MalformedPayload {
        /// The token being decoded.
        kind: TokenKind,
        /// What went wrong.
        message: String,
    },

    /// An encoded payload does not fit the 16-bit frame length.
    #[error("{kind} payload of {size} bytes exceeds the frame limit of {max} bytes")]
    PayloadTooLarge {
        /// The token being encoded.
        kind: TokenKind,
        /// Encoded payload size.
        size: usize,
        /// Largest payload a frame can describe.
        max: usize,
    },

    // === Value Tree Errors ===
    /// A logged-data payload did not match the size of its message template.
    #[error("framing error in message '{message_name}': template needs {expected} bytes, payload has {actual}")]
    FramingError {
        /// The message being decoded.
        message_name: String,
        /// Bytes the template consumes.
        expected: usize,
        /// Bytes the payload carried.
        actual: usize,
    },

    /// Logged data referenced a message id with no subscription.
    #[error("no subscription for message id {0}")]
    UnknownMessageId(u16),

    /// A write targeted a message that was never subscribed.
    #[error("no subscription for message '{message_name}' (multi id {multi_id})")]
    UnknownSubscription {
        /// The message name.
        message_name: String,
        /// The instance id.
        multi_id: u8,
    },

    /// A message name has no format definition.
    #[error("no format definition for message '{0}'")]
    UnknownFormat(String),

    /// A format definition references itself and can never terminate.
    #[error("format '{0}' references itself")]
    RecursiveFormat(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// Reading from or writing to the underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for ulog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a malformed payload error.
    #[must_use]
    pub fn malformed(kind: TokenKind, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            kind,
            message: message.into(),
        }
    }

    /// Create a protocol order violation.
    #[must_use]
    pub fn order_violation(kind: TokenKind, message: impl Into<String>) -> Self {
        Self::ProtocolOrderViolation {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(
        kind: TokenKind,
        grammar: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidIdentifier {
            kind,
            grammar,
            value: value.into(),
        }
    }

    /// Check if this error is one the reader recovers from by resynchronizing.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTokenType { .. } | Self::WrongSectionForToken { .. }
        )
    }

    /// Check if this error ends reading or writing for good.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidDefaultParameterType;
        assert_eq!(
            err.to_string(),
            "default parameter type bitfield must not be empty"
        );

        let err = Error::malformed(TokenKind::Format, "missing ':'");
        assert_eq!(err.to_string(), "malformed Format payload: missing ':'");
    }

    #[test]
    fn test_malformed_header_display() {
        let err = Error::MalformedHeader {
            index: 2,
            expected: 0x6f,
            actual: 0x00,
        };
        let msg = err.to_string();
        assert!(msg.contains("magic byte 2"));
        assert!(msg.contains("0x6f"));
    }

    #[test]
    fn test_unknown_token_type_display() {
        let err = Error::UnknownTokenType {
            type_id: b'Z',
            section: Section::DATA,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x5a"));
        assert!(msg.contains("Data"));
    }

    #[test]
    fn test_wrong_section_display() {
        let err = Error::WrongSectionForToken {
            kind: TokenKind::Format,
            section: Section::DATA,
        };
        assert_eq!(
            err.to_string(),
            "Format token is not allowed in the Data section"
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::UnknownTokenType {
            type_id: 0,
            section: Section::DATA
        }
        .is_recoverable());
        assert!(Error::WrongSectionForToken {
            kind: TokenKind::FlagBits,
            section: Section::DATA
        }
        .is_recoverable());
        assert!(!Error::InvalidDefaultParameterType.is_recoverable());
        assert!(!Error::order_violation(TokenKind::Format, "late").is_recoverable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::order_violation(TokenKind::FlagBits, "missing").is_fatal());
        assert!(Error::ConfigValidation {
            message: "bad".to_string()
        }
        .is_fatal());
        assert!(Error::malformed(TokenKind::Dropout, "short").is_fatal());
        assert!(Error::invalid_identifier(TokenKind::Subscription, "message name", "a b").is_fatal());
        assert!(Error::InvalidDefaultParameterType.is_fatal());
        assert!(!Error::UnknownTokenType {
            type_id: b'Z',
            section: Section::DATA
        }
        .is_fatal());
    }

    #[test]
    fn test_order_violation_display() {
        let err = Error::order_violation(TokenKind::Format, "definitions are closed");
        let msg = err.to_string();
        assert!(msg.contains("Format"));
        assert!(msg.contains("definitions are closed"));
    }

    #[test]
    fn test_framing_error_display() {
        let err = Error::FramingError {
            message_name: "vehicle_status".to_string(),
            expected: 12,
            actual: 14,
        };
        let msg = err.to_string();
        assert!(msg.contains("vehicle_status"));
        assert!(msg.contains("12"));
        assert!(msg.contains("14"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("stream closed"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "initial_buffer_size too small".to_string(),
        };
        assert!(err.to_string().contains("initial_buffer_size"));
    }
}
