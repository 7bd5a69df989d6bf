use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::headers::{Headers, EVENT_TYPE, MESSAGE_TYPE};

/// Prelude: total length (4) + headers length (4) + prelude CRC (4) = 12 bytes.
pub const PRELUDE_SIZE: usize = 12;

/// Trailing message CRC.
const MESSAGE_CRC_SIZE: usize = 4;

/// Smallest valid message: prelude + trailing CRC, no headers, no payload.
pub const MIN_MESSAGE_SIZE: usize = PRELUDE_SIZE + MESSAGE_CRC_SIZE;

/// Default maximum total message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum header block size: 128 KiB.
pub const DEFAULT_MAX_HEADERS_SIZE: usize = 128 * 1024;

/// A decoded message: typed headers plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Headers,
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(headers: Headers, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
        }
    }

    /// The `:message-type` header, if present and string-typed.
    pub fn message_type(&self) -> Option<&str> {
        self.headers.get_str(MESSAGE_TYPE)
    }

    /// The `:event-type` header, if present and string-typed.
    pub fn event_type(&self) -> Option<&str> {
        self.headers.get_str(EVENT_TYPE)
    }

    /// The total wire size of this message.
    pub fn wire_size(&self) -> usize {
        MIN_MESSAGE_SIZE + self.headers.encoded_len() + self.payload.len()
    }
}

/// Encode a message into the wire format.
///
/// Wire format (integers big-endian):
/// ```text
/// ┌─────────────┬──────────────┬─────────────┬─────────┬─────────┬─────────────┐
/// │ Total len   │ Headers len  │ Prelude CRC │ Headers │ Payload │ Message CRC │
/// │ (4B)        │ (4B)         │ (4B)        │         │         │ (4B)        │
/// └─────────────┴──────────────┴─────────────┴─────────┴─────────┴─────────────┘
/// ```
pub fn encode_message(message: &Message, config: &FrameConfig, dst: &mut BytesMut) -> Result<()> {
    let headers_len = message.headers.encoded_len();
    if headers_len > config.max_headers_size {
        return Err(FrameError::HeadersTooLarge {
            size: headers_len,
            max: config.max_headers_size,
        });
    }
    let total = message.wire_size();
    if total > config.max_message_size || total > u32::MAX as usize {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: config.max_message_size.min(u32::MAX as usize),
        });
    }

    let start = dst.len();
    dst.reserve(total);
    dst.put_u32(total as u32);
    dst.put_u32(headers_len as u32);
    let prelude_crc = crc32fast::hash(&dst[start..start + 8]);
    dst.put_u32(prelude_crc);
    if let Err(err) = message.headers.encode(dst) {
        dst.truncate(start);
        return Err(err);
    }
    dst.put_slice(&message.payload);
    let message_crc = crc32fast::hash(&dst[start..]);
    dst.put_u32(message_crc);
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer. The prelude is
/// validated as soon as it is available, before the rest of the message.
pub fn decode_message(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
    if src.len() < PRELUDE_SIZE {
        return Ok(None); // Need more data
    }

    let total = read_u32(&src[0..4]) as usize;
    let headers_len = read_u32(&src[4..8]) as usize;
    let expected = read_u32(&src[8..12]);
    let actual = crc32fast::hash(&src[0..8]);
    if expected != actual {
        return Err(FrameError::PreludeChecksumMismatch { expected, actual });
    }

    if total > config.max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: config.max_message_size,
        });
    }
    if headers_len > config.max_headers_size {
        return Err(FrameError::HeadersTooLarge {
            size: headers_len,
            max: config.max_headers_size,
        });
    }
    if total < MIN_MESSAGE_SIZE || headers_len > total - MIN_MESSAGE_SIZE {
        return Err(FrameError::InvalidLength {
            total,
            headers: headers_len,
        });
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    let body_end = total - MESSAGE_CRC_SIZE;
    let expected = read_u32(&src[body_end..total]);
    let actual = crc32fast::hash(&src[..body_end]);
    if expected != actual {
        return Err(FrameError::MessageChecksumMismatch { expected, actual });
    }

    let mut frame = src.split_to(total).freeze();
    frame.advance(PRELUDE_SIZE);
    let headers = Headers::decode(frame.split_to(headers_len))?;
    let payload = frame.split_to(body_end - PRELUDE_SIZE - headers_len);

    Ok(Some(Message { headers, payload }))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum total message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
    /// Maximum header block size in bytes. Default: 128 KiB.
    pub max_headers_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_headers_size: DEFAULT_MAX_HEADERS_SIZE,
        }
    }
}
