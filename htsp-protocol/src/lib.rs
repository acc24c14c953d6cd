//! # htsp-protocol
//!
//! Wire protocol implementation for HTSP (Home TV Streaming Protocol), the
//! binary RPC/push protocol spoken by tvheadend.
//!
//! This crate provides:
//! - The dynamically typed value model (`Value`, `Message`)
//! - Field encoding with variable-length little-endian integers
//! - Length-prefixed framing and an incremental stream decoder
//! - Method names, including the fixed set of server push methods

pub mod codec;
pub mod error;
pub mod field;
pub mod method;
pub mod value;

pub use codec::{Decoder, Encoder};
pub use error::{EncodeError, ProtocolError};
pub use field::{FieldType, FIELD_HEADER_SIZE, FRAME_LENGTH_SIZE, MAX_NAME_LEN};
pub use method::PushMethod;
pub use value::{Message, Value};

/// HTSP version announced in `hello`.
pub const HTSP_VERSION: i64 = 6;

/// Default port of the tvheadend HTSP server.
pub const DEFAULT_PORT: u16 = 9982;

/// Maximum accepted frame body size (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;
