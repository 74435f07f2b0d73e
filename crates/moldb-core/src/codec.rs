//! Key codec: transport form <-> storage identifier.
//!
//! The HTTP layer receives identifiers percent-encoded in the URL path. These
//! functions undo that encoding and apply the one normalization rule
//! (trimming), so lookups never depend on how a client chose to escape.
//!
//! `+` is left alone when decoding: InChI charge layers (`/p+1`) use it
//! literally.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::InvalidKeyError;
use crate::identifier::Identifier;

/// Everything except unreserved URL characters gets escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Decode a percent-encoded identifier into its storage form.
pub fn decode(external: &str) -> Result<Identifier, InvalidKeyError> {
    let decoded = percent_decode_str(external)
        .decode_utf8()
        .map_err(|_| InvalidKeyError::InvalidUtf8)?;
    Identifier::new(decoded.into_owned())
}

/// Percent-encode an identifier for use as a single URL path segment.
pub fn encode(id: &Identifier) -> String {
    utf8_percent_encode(id.as_str(), COMPONENT).to_string()
}

/// Idempotent normalization. Identifiers are case-sensitive, so this only
/// strips surrounding ASCII whitespace.
pub fn normalize(id: Identifier) -> Identifier {
    id.renormalized()
}
