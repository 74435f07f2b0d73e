//! The record key: a validated chemical identifier.
//!
//! An [`Identifier`] can only be built through [`Identifier::new`] (or the
//! codec functions that call it), so holding one proves the string is
//! normalized and free of control bytes.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidKeyError;

/// A chemical identifier (typically an InChI string).
///
/// Case-sensitive and compared byte for byte. Leading and trailing ASCII
/// whitespace is stripped on construction; nothing else is rewritten.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Normalize and validate a raw identifier string.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidKeyError> {
        let raw = raw.into();
        let trimmed = trim(&raw);
        let value = if trimmed.len() == raw.len() {
            raw
        } else {
            trimmed.to_owned()
        };
        validate(&value)?;
        Ok(Self(value))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as raw UTF-8 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Re-apply trimming. A no-op for any value built through `new`.
    pub(crate) fn renormalized(self) -> Self {
        let trimmed = trim(&self.0);
        if trimmed.len() == self.0.len() {
            self
        } else {
            Self(trimmed.to_owned())
        }
    }
}

pub(crate) fn trim(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_ascii_whitespace())
}

fn validate(value: &str) -> Result<(), InvalidKeyError> {
    if value.is_empty() {
        return Err(InvalidKeyError::Empty);
    }
    if let Some(position) = value.bytes().position(|b| b.is_ascii_control()) {
        return Err(InvalidKeyError::ControlCharacter { position });
    }
    Ok(())
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({:?})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = InvalidKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}
