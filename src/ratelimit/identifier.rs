//! Identifier validation and handling.

use crate::error::ValidationError;

/// A validated identifier under which request budgets are tracked.
///
/// The identifier is opaque to the limiter: a user id, API key, and client
/// IP are all equally valid. Accepted identifiers are trimmed of surrounding
/// whitespace and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate a raw caller-supplied identifier.
    ///
    /// Fails with [`ValidationError::EmptyIdentifier`] when `raw` is empty
    /// or whitespace-only after trimming, and with
    /// [`ValidationError::IdentifierTooLong`] when the trimmed identifier
    /// exceeds `max_len` bytes. Pure: no limiter state is touched.
    pub fn validate(raw: &str, max_len: usize) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }
        if trimmed.len() > max_len {
            return Err(ValidationError::IdentifierTooLong {
                length: trimmed.len(),
                max: max_len,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
