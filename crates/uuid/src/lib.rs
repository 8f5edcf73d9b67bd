//! Record uuid utilities.
//!
//! Every condition record carries a globally unique string identifier alongside its
//! integer surrogate id. Identifiers are either generated here (a hyphenated v4 UUID) or
//! supplied by the caller, for example when records are imported from another system.
//!
//! Caller-supplied identifiers are *not* required to be RFC 4122 UUIDs. Legacy data sets
//! contain values such as `08002000-4469-12q3-551f-0339000c9a76`, so validation is
//! limited to what storage can hold:
//! - Length: 1 to [`MAX_RECORD_UUID_LEN`] bytes
//! - Characters: printable ASCII, no whitespace
//!
//! Use [`RecordUuid::parse`] for external input and [`RecordUuid::is_valid`] for a cheap
//! pre-check (lookups treat an invalid string as "no such record").

mod service;

pub use service::{RecordUuid, Uuid, MAX_RECORD_UUID_LEN};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
