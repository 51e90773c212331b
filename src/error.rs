//! Error types for tracedb.
//!
//! All fallible operations in the crate return [`Result`]. Decode errors
//! abort the *current* record only: everything inserted before the failure
//! stays valid and queryable, and the store never rolls back.

use thiserror::Error;

/// All tracedb errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer bytes remain than the current record's schema requires.
    #[error("truncated buffer: need {needed} bytes, have {available}")]
    TruncatedBuffer {
        /// Bytes required by the read that failed.
        needed: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
    },

    /// An event type id that is not present in the registry.
    ///
    /// Record layouts are schema-defined, so an unknown type makes the rest
    /// of the stream undecodable. This error is fatal for the remainder of
    /// the stream; previously ingested records remain queryable.
    #[error("unknown event type id {0}")]
    UnknownEventType(u16),

    /// Schema-level decode failure (invalid marker, bad string data, a
    /// malformed control record, etc.).
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The ingestion protocol was violated: `insert_event` outside a
    /// `begin_inserting`/`end_inserting` bracket, a nested bracket, or an
    /// operation on an unloaded store. Always a caller bug, never a data
    /// problem.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The stream header carries a version this crate does not understand.
    #[error("unsupported trace format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the header.
        found: u32,
        /// Version this crate implements.
        expected: u32,
    },

    /// The stream does not start with the trace magic number.
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    /// An event type signature string could not be parsed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Result type for tracedb operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check whether this error means the input ended mid-record.
    ///
    /// Truncation at a chunk boundary is recoverable by feeding more bytes;
    /// truncation at end of stream is a data problem.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Error::TruncatedBuffer { .. })
    }

    /// Check whether this error indicates a caller bug rather than bad data.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }

    /// Check whether this error is fatal for the remainder of a stream.
    ///
    /// Unknown types and malformed records leave the decoder with no way to
    /// find the next record boundary.
    pub fn is_fatal_for_stream(&self) -> bool {
        matches!(
            self,
            Error::UnknownEventType(_)
                | Error::MalformedRecord(_)
                | Error::UnsupportedVersion { .. }
                | Error::BadMagic(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_predicate() {
        let err = Error::TruncatedBuffer {
            needed: 4,
            available: 1,
        };
        assert!(err.is_truncation());
        assert!(!err.is_fatal_for_stream());
    }

    #[test]
    fn test_fatal_predicate() {
        assert!(Error::UnknownEventType(99).is_fatal_for_stream());
        assert!(Error::MalformedRecord("bad marker".into()).is_fatal_for_stream());
        assert!(!Error::ProtocolViolation("nested bracket".into()).is_fatal_for_stream());
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::TruncatedBuffer {
            needed: 8,
            available: 3,
        };
        assert_eq!(err.to_string(), "truncated buffer: need 8 bytes, have 3");
    }
}
