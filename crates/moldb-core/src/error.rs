//! Error types for moldb core.

use thiserror::Error;

/// A malformed or undecodable identifier. Always a caller error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidKeyError {
    #[error("invalid key: identifier is empty")]
    Empty,

    #[error("invalid key: control character at byte {position}")]
    ControlCharacter { position: usize },

    #[error("invalid key: percent-decoded bytes are not valid UTF-8")]
    InvalidUtf8,
}
