//! Identifier types for platform entities
//!
//! Order and user identifiers are owned by the authoritative relational
//! store and arrive here as opaque keys. Lifecycle identifiers are the
//! allocator-issued numeric strings tracked by the ledger; they carry an
//! optional short alphabetic type tag followed by a digit body.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted type-tag prefix on a lifecycle id.
pub const MAX_TAG_LEN: usize = 4;

/// Longest accepted digit body of a lifecycle id.
pub const MAX_DIGITS_LEN: usize = 28;

/// Key of an order row in the authoritative store.
///
/// Opaque to this crate; the ledger only groups lifecycle records by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create from the authoritative store's order key.
    ///
    /// # Panics
    /// Panics if the key is empty.
    pub fn new(key: impl Into<String>) -> Self {
        let s = key.into();
        assert!(!s.is_empty(), "OrderId must not be empty");
        Self(s)
    }

    /// Try to create an OrderId, rejecting empty keys.
    pub fn try_new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let s = key.into();
        if s.is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self(s))
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Key of a user row in the authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// An allocator-issued lifecycle identifier.
///
/// Canonical form is a pure digit string; non-order identifiers may carry a
/// short ASCII-alphabetic type tag prefix (e.g. `TXN` on a wallet
/// transaction id). Construction goes through [`LifecycleId::parse`], which
/// rejects malformed input; the exact field widths are enforced by the
/// allocator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleId(String);

impl LifecycleId {
    /// Parse an identifier: optional alphabetic tag, then at least one digit.
    pub fn parse(id: impl Into<String>) -> Result<Self, ValidationError> {
        let s = id.into();
        if s.is_empty() {
            return Err(ValidationError::Empty);
        }

        let tag_len = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        if tag_len > MAX_TAG_LEN {
            return Err(ValidationError::TagTooLong {
                tag: s[..tag_len].to_string(),
            });
        }

        let digits = &s[tag_len..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NonNumeric { id: s });
        }
        if digits.len() > MAX_DIGITS_LEN {
            return Err(ValidationError::UnexpectedLength {
                id: s.clone(),
                expected: MAX_DIGITS_LEN,
                actual: digits.len(),
            });
        }

        Ok(Self(s))
    }

    /// Full identifier string, tag included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The alphabetic type-tag prefix, empty for order identifiers.
    pub fn tag(&self) -> &str {
        let tag_len = self
            .0
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        &self.0[..tag_len]
    }

    /// The digit body with any tag stripped.
    pub fn digits(&self) -> &str {
        &self.0[self.tag().len()..]
    }
}

impl fmt::Display for LifecycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_parse_splits_tag_and_digits(
            tag in proptest::option::of("[a-zA-Z]{1,4}"),
            digits in "[0-9]{1,28}",
        ) {
            let raw = match &tag {
                Some(t) => format!("{t}{digits}"),
                None => digits.clone(),
            };

            let id = LifecycleId::parse(raw).unwrap();
            prop_assert_eq!(id.tag(), tag.as_deref().unwrap_or(""));
            prop_assert_eq!(id.digits(), digits);
        }

        #[test]
        fn prop_parse_rejects_interior_letters(
            digits in "[0-9]{1,10}",
            suffix in "[a-zA-Z]{1,3}",
        ) {
            // letters are only legal as a leading tag
            let raw = format!("{digits}{suffix}");
            prop_assert!(LifecycleId::parse(raw).is_err());
        }
    }
}
