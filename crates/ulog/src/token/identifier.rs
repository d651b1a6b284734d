//! Identifier grammars for names carried inside tokens.
//!
//! Field and type names use `[a-zA-Z0-9_]+`. Message names additionally allow
//! `-` and `/`. Both grammars must match the whole name.

use once_cell::sync::Lazy;
use regex::Regex;

use super::TokenKind;
use crate::error::{Error, Result};

/// A compiled identifier grammar.
#[derive(Debug)]
pub struct Grammar {
    /// Human readable name used in error messages.
    pub name: &'static str,

    /// The pattern the identifier has to match, as written in the format docs.
    pub pattern: &'static str,

    regex: Regex,
}

impl Grammar {
    /// Compile a new grammar.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    #[must_use]
    pub fn new(name: &'static str, pattern: &'static str) -> Self {
        Self {
            name,
            pattern,
            regex: Regex::new(&format!("^{pattern}$")).expect("Invalid regex pattern"),
        }
    }

    /// Check if the whole value matches this grammar.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Validate a value, reporting the token it was found in on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the value is empty or does not match.
    pub fn check(&self, kind: TokenKind, value: &str) -> Result<()> {
        if self.matches(value) {
            Ok(())
        } else {
            Err(Error::invalid_identifier(kind, self.name, value))
        }
    }
}

/// Grammar for field names and type names.
pub static FIELD_NAME: Lazy<Grammar> = Lazy::new(|| Grammar::new("field name", r"[a-zA-Z0-9_]+"));

/// Grammar for message names.
pub static MESSAGE_NAME: Lazy<Grammar> =
    Lazy::new(|| Grammar::new("message name", r"[a-zA-Z0-9_\-/]+"));
