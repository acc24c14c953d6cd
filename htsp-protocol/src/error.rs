//! Protocol error types.

use crate::field::FieldType;
use thiserror::Error;

/// Errors raised while decoding inbound bytes.
///
/// Every variant is fatal to the connection that produced the bytes: the
/// stream position can no longer be trusted once a frame fails to parse.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown field type tag: {0}")]
    UnknownFieldType(u8),

    #[error("truncated field at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid integer width: {0} bytes (max 8)")]
    InvalidInteger(usize),

    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("frame length mismatch: header says {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Errors raised while encoding an outbound message.
///
/// These only fail the call that tried to send the message; nothing has been
/// written to the connection when they are returned.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode {0} field")]
    UnsupportedType(FieldType),

    #[error("field name too long: {0} bytes (max 255)")]
    NameTooLong(usize),

    #[error("field payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: u32 },
}
