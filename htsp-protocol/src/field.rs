//! Field-level wire format.
//!
//! Every field is a 6-byte header followed by the name and payload bytes:
//!
//! ```text
//! +--------+----------+-------------+------------+----------------+
//! |  type  | name_len |  data_len   |    name    |      data      |
//! | 1 byte |  1 byte  | 4 bytes BE  |  name_len  |    data_len    |
//! +--------+----------+-------------+------------+----------------+
//! ```
//!
//! Integers (`S64`) are little-endian. Non-negative values use the fewest
//! bytes that hold them (1 to 8, unsigned layout); negative values always use
//! all 8 bytes in two's complement. Map and list payloads are themselves a
//! run of fields; list elements carry an empty name.

use crate::error::{EncodeError, ProtocolError};
use crate::value::{Message, Value};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed field header in bytes (1+1+4 = 6).
pub const FIELD_HEADER_SIZE: usize = 6;

/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Longest field name the 1-byte length can describe.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Maximum nesting of map/list fields accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Map = 1,
    S64 = 2,
    Str = 3,
    Bin = 4,
    List = 5,
}

impl FieldType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            1 => Ok(FieldType::Map),
            2 => Ok(FieldType::S64),
            3 => Ok(FieldType::Str),
            4 => Ok(FieldType::Bin),
            5 => Ok(FieldType::List),
            other => Err(ProtocolError::UnknownFieldType(other)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Map => write!(f, "map"),
            FieldType::S64 => write!(f, "s64"),
            FieldType::Str => write!(f, "str"),
            FieldType::Bin => write!(f, "bin"),
            FieldType::List => write!(f, "list"),
        }
    }
}

/// Number of payload bytes `encode_s64` produces for `value`.
pub fn s64_width(value: i64) -> usize {
    if value < 0 {
        return 8;
    }
    let bits = 64 - (value as u64).leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Encodes an integer in the minimal little-endian layout.
pub fn encode_s64(value: i64) -> Vec<u8> {
    value.to_le_bytes()[..s64_width(value)].to_vec()
}

/// Decodes a little-endian integer payload of 0 to 8 bytes.
///
/// Short payloads are zero-extended, matching the unsigned layout written by
/// [`encode_s64`]; only a full 8-byte payload can carry a negative value.
pub fn decode_s64(data: &[u8]) -> Result<i64, ProtocolError> {
    if data.len() > 8 {
        return Err(ProtocolError::InvalidInteger(data.len()));
    }
    let mut raw = [0u8; 8];
    raw[..data.len()].copy_from_slice(data);
    Ok(i64::from_le_bytes(raw))
}

/// Appends one encoded field to `buf`.
///
/// Only scalar values go out on the wire: integers, strings and raw bytes
/// (the authentication digest). Map and list values are rejected, and `buf`
/// is left untouched on error.
pub fn encode_field(buf: &mut BytesMut, name: &str, value: &Value) -> Result<(), EncodeError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EncodeError::NameTooLong(name.len()));
    }

    let int_payload;
    let payload: &[u8] = match value {
        Value::S64(v) => {
            int_payload = encode_s64(*v);
            &int_payload
        }
        Value::Str(s) => s.as_bytes(),
        Value::Bin(b) => b,
        Value::Map(_) | Value::List(_) => {
            return Err(EncodeError::UnsupportedType(value.field_type()))
        }
    };

    let data_len =
        u32::try_from(payload.len()).map_err(|_| EncodeError::PayloadTooLarge(payload.len()))?;

    buf.reserve(FIELD_HEADER_SIZE + name.len() + payload.len());
    buf.put_u8(value.field_type().tag());
    buf.put_u8(name.len() as u8);
    buf.put_u32(data_len);
    buf.put_slice(name.as_bytes());
    buf.put_slice(payload);
    Ok(())
}

/// Decodes the field starting at `offset`.
///
/// Returns the field name, its value and the number of bytes consumed
/// (header, name and payload).
pub fn decode_field(buf: &[u8], offset: usize) -> Result<(String, Value, usize), ProtocolError> {
    decode_field_at(buf, offset, 0)
}

/// Decodes a run of fields into a message. Later duplicates win.
pub fn decode_map(buf: &[u8]) -> Result<Message, ProtocolError> {
    decode_map_at(buf, 0)
}

/// Decodes a run of fields into an ordered list, ignoring their names.
pub fn decode_list(buf: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    decode_list_at(buf, 0)
}

fn decode_map_at(buf: &[u8], depth: usize) -> Result<Message, ProtocolError> {
    let mut message = Message::new();
    walk_fields(buf, depth, |name, value| {
        message.insert(name, value);
    })?;
    Ok(message)
}

fn decode_list_at(buf: &[u8], depth: usize) -> Result<Vec<Value>, ProtocolError> {
    let mut list = Vec::new();
    walk_fields(buf, depth, |_, value| list.push(value))?;
    Ok(list)
}

fn walk_fields(
    buf: &[u8],
    depth: usize,
    mut sink: impl FnMut(String, Value),
) -> Result<(), ProtocolError> {
    let mut offset = 0;
    while offset < buf.len() {
        let (name, value, consumed) = decode_field_at(buf, offset, depth)?;
        offset += consumed;
        sink(name, value);
    }
    Ok(())
}

fn decode_field_at(
    buf: &[u8],
    offset: usize,
    depth: usize,
) -> Result<(String, Value, usize), ProtocolError> {
    let available = buf.len().saturating_sub(offset);
    if available < FIELD_HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            offset,
            needed: FIELD_HEADER_SIZE,
            available,
        });
    }

    let header = &buf[offset..offset + FIELD_HEADER_SIZE];
    let field_type = FieldType::from_tag(header[0])?;
    let name_len = header[1] as usize;
    let data_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

    // A hostile data_len can overflow usize on 32-bit targets
    let consumed = FIELD_HEADER_SIZE
        .checked_add(name_len)
        .and_then(|n| n.checked_add(data_len))
        .filter(|&n| n <= available)
        .ok_or(ProtocolError::Truncated {
            offset,
            needed: FIELD_HEADER_SIZE
                .saturating_add(name_len)
                .saturating_add(data_len),
            available,
        })?;

    let name_start = offset + FIELD_HEADER_SIZE;
    let data_start = name_start + name_len;
    let name = std::str::from_utf8(&buf[name_start..data_start])
        .map_err(|_| ProtocolError::InvalidUtf8("field name"))?
        .to_string();
    let data = &buf[data_start..data_start + data_len];

    let value = match field_type {
        FieldType::Map | FieldType::List if depth >= MAX_NESTING_DEPTH => {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        FieldType::Map => Value::Map(decode_map_at(data, depth + 1)?),
        FieldType::S64 => Value::S64(decode_s64(data)?),
        FieldType::Str => Value::Str(
            std::str::from_utf8(data)
                .map_err(|_| ProtocolError::InvalidUtf8("string field"))?
                .to_string(),
        ),
        FieldType::Bin => Value::Bin(Bytes::copy_from_slice(data)),
        FieldType::List => Value::List(decode_list_at(data, depth + 1)?),
    };

    Ok((name, value, consumed))
}
