//! Encoder and decoder for HTSP frames.
//!
//! A frame is a 4-byte big-endian body length followed by the body, a run of
//! encoded fields. The length excludes itself.

use crate::error::{EncodeError, ProtocolError};
use crate::field::{decode_map, encode_field, FRAME_LENGTH_SIZE};
use crate::value::Message;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, BytesMut};

/// Encodes messages into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a message into a complete, length-prefixed frame.
    pub fn encode_message(message: &Message) -> Result<BytesMut, EncodeError> {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_u32(0);

        for (name, value) in message {
            encode_field(&mut buf, name, value)?;
        }

        let body_len = buf.len() - FRAME_LENGTH_SIZE;
        if body_len > MAX_FRAME_SIZE as usize {
            return Err(EncodeError::FrameTooLarge {
                size: body_len,
                max: MAX_FRAME_SIZE,
            });
        }
        buf[..FRAME_LENGTH_SIZE].copy_from_slice(&(body_len as u32).to_be_bytes());

        Ok(buf)
    }

    /// Decodes exactly one complete frame.
    pub fn decode_frame(frame: &[u8]) -> Result<Message, ProtocolError> {
        let mut decoder = Decoder::new();
        decoder.extend(frame);
        match decoder.decode_message()? {
            Some(message) if decoder.buffered() == 0 => Ok(message),
            _ => Err(ProtocolError::LengthMismatch {
                declared: declared_len(frame).unwrap_or(0),
                actual: frame.len().saturating_sub(FRAME_LENGTH_SIZE),
            }),
        }
    }
}

fn declared_len(buf: &[u8]) -> Option<usize> {
    let prefix: [u8; FRAME_LENGTH_SIZE] = buf.get(..FRAME_LENGTH_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Incremental frame decoder for a byte stream.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// Returns `Ok(None)` while the next frame is still incomplete.
    pub fn decode_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let Some(body_len) = declared_len(&self.buffer) else {
            return Ok(None);
        };

        if body_len > MAX_FRAME_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len as u32,
                max: MAX_FRAME_SIZE,
            });
        }

        if self.buffer.len() < FRAME_LENGTH_SIZE + body_len {
            return Ok(None);
        }

        self.buffer.advance(FRAME_LENGTH_SIZE);
        let body = self.buffer.split_to(body_len);
        decode_map(&body).map(Some)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use crate::value::Value;

    fn hello() -> Message {
        Message::new()
            .with(Message::METHOD, "hello")
            .with("htspversion", crate::HTSP_VERSION)
            .with("clientname", "tvhc")
            .with("clientversion", "1.0")
    }

    #[test]
    fn test_encoder_decoder_roundtrip() {
        let message = hello();
        let encoded = Encoder::encode_message(&message).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let decoded = decoder.decode_message().unwrap().unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_length_prefix_excludes_itself() {
        let message = Message::new().with("k", 1i64);
        let encoded = Encoder::encode_message(&message).unwrap();

        // 6 header + 1 name + 1 payload
        assert_eq!(&encoded[..4], &[0, 0, 0, 8]);
        assert_eq!(encoded.len(), 12);
    }

    #[test]
    fn test_empty_message() {
        let encoded = Encoder::encode_message(&Message::new()).unwrap();
        assert_eq!(&encoded[..], &[0, 0, 0, 0]);

        let decoded = Encoder::decode_frame(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_value_roundtrip_boundaries() {
        let ints = [
            0,
            255,
            256,
            65535,
            65536,
            1i64 << 55,
            (1i64 << 56) - 1,
            -1,
            i64::MIN,
        ];
        let strings = ["", "plain", "Müller", "日本語", "emoji 📺"];

        let values = ints
            .into_iter()
            .map(Value::from)
            .chain(strings.into_iter().map(Value::from));

        for value in values {
            let message = Message::new().with("k", value.clone());
            let encoded = Encoder::encode_message(&message).unwrap();
            let decoded = Encoder::decode_frame(&encoded).unwrap();
            assert_eq!(decoded.get("k"), Some(&value));
        }
    }

    #[test]
    fn test_encode_unsupported_value() {
        let message = Message::new()
            .with("ok", 1i64)
            .with("nested", Message::new().with("a", 1i64));
        let result = Encoder::encode_message(&message);
        assert!(matches!(
            result,
            Err(EncodeError::UnsupportedType(FieldType::Map))
        ));
    }

    #[test]
    fn test_partial_frame_decoding() {
        let encoded = Encoder::encode_message(&hello()).unwrap();

        let mut decoder = Decoder::new();

        // Not even the length prefix
        decoder.extend(&encoded[..3]);
        assert!(decoder.decode_message().unwrap().is_none());

        // Prefix but partial body
        decoder.extend(&encoded[3..10]);
        assert!(decoder.decode_message().unwrap().is_none());

        decoder.extend(&encoded[10..]);
        let decoded = decoder.decode_message().unwrap().unwrap();
        assert_eq!(decoded.method(), Some("hello"));
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let first = Message::new().with("seq", 1i64);
        let second = Message::new().with("seq", 2i64);

        let mut decoder = Decoder::new();
        decoder.extend(&Encoder::encode_message(&first).unwrap());
        decoder.extend(&Encoder::encode_message(&second).unwrap());

        let decoded1 = decoder.decode_message().unwrap().unwrap();
        assert_eq!(decoded1.get_i64("seq"), Some(1));

        let decoded2 = decoder.decode_message().unwrap().unwrap();
        assert_eq!(decoded2.get_i64("seq"), Some(2));

        assert!(decoder.decode_message().unwrap().is_none());
    }

    #[test]
    fn test_frame_too_large() {
        let mut decoder = Decoder::new();
        decoder.extend(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        let result = decoder.decode_message();
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_malformed_body() {
        // Declared 6 bytes of body holding a field header with tag 42
        let frame = [0, 0, 0, 6, 42, 0, 0, 0, 0, 0];
        let mut decoder = Decoder::new();
        decoder.extend(&frame);
        let result = decoder.decode_message();
        assert!(matches!(result, Err(ProtocolError::UnknownFieldType(42))));
    }

    #[test]
    fn test_decode_frame_length_mismatch() {
        let mut encoded = Encoder::encode_message(&hello()).unwrap().to_vec();
        encoded.push(0);
        let result = Encoder::decode_frame(&encoded);
        assert!(matches!(result, Err(ProtocolError::LengthMismatch { .. })));

        let result = Encoder::decode_frame(&encoded[..5]);
        assert!(matches!(result, Err(ProtocolError::LengthMismatch { .. })));
    }

    #[test]
    fn test_decoder_buffered_and_clear() {
        let mut decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"some data");
        assert_eq!(decoder.buffered(), 9);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
