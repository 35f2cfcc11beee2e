//! Error types for inverter reply parsing

use thiserror::Error;

/// Errors that can occur while decoding an inverter reply
///
/// A reply either decodes as a whole or fails with one of these; no
/// partially populated value is ever returned alongside an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Reply has the wrong number of delimited fields
    #[error("{reply} reply: expected {expected} fields, got {actual}")]
    FieldCount {
        reply: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Reply is shorter than its fixed layout requires
    #[error("{reply} reply too short: {len} bytes")]
    TooShort { reply: &'static str, len: usize },

    /// Field is not a valid number
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// Enumerated field holds a code this protocol does not define
    #[error("unknown {field} code: {code:?}")]
    UnknownCode { field: &'static str, code: String },

    /// Fault code missing from the fault table
    #[error("unknown fault code: {0}")]
    UnknownFaultCode(u8),

    /// Bitfield character is not '0' or '1', or a set bit has no meaning
    #[error("invalid status bit {position}: {value:?}")]
    InvalidBit { position: usize, value: char },

    /// Set-command reply is neither an acknowledgement nor a rejection
    #[error("unexpected acknowledgement: {0:?}")]
    UnexpectedAck(String),
}
