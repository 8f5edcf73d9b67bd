//! Implementation of [`RecordUuid`].

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Maximum stored length of a record uuid, in bytes.
pub const MAX_RECORD_UUID_LEN: usize = 38;

/// A validated record identifier.
///
/// Once constructed the value is guaranteed to be non-empty, at most
/// [`MAX_RECORD_UUID_LEN`] bytes long and made of printable ASCII without whitespace.
/// Equality is exact: `ABC` and `abc` are different identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordUuid(String);

impl Default for RecordUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordUuid {
    /// Generates a fresh identifier in hyphenated v4 form.
    pub fn new() -> Self {
        Self::from(Uuid::new_v4())
    }

    /// Validates a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is empty, too long, or contains
    /// whitespace or non-printable characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if Self::is_valid(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(UuidError::InvalidInput(format!(
            "record uuid must be 1-{MAX_RECORD_UUID_LEN} printable ASCII characters without whitespace, got: '{input}'"
        )))
    }

    /// Returns true if `input` would be accepted by [`RecordUuid::parse`].
    pub fn is_valid(input: &str) -> bool {
        !input.is_empty()
            && input.len() <= MAX_RECORD_UUID_LEN
            && input.bytes().all(|b| b.is_ascii_graphic())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier as a standard UUID when it is one.
    ///
    /// Legacy identifiers that are not valid UUIDs yield `None`.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl fmt::Display for RecordUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordUuid::parse(s)
    }
}

impl AsRef<str> for RecordUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for RecordUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RecordUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RecordUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecordUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}
