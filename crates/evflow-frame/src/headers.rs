//! Typed message headers and the well-known header names.
//!
//! Header names starting with `:` are reserved for the protocol itself.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Discriminates the kind of a message: `event`, `error` or `exception`.
pub const MESSAGE_TYPE: &str = ":message-type";

/// Names the event carried by an `event` message.
pub const EVENT_TYPE: &str = ":event-type";

/// Error code carried by an `error` message.
pub const ERROR_CODE: &str = ":error-code";

/// Human-readable message carried by an `error` message.
pub const ERROR_MESSAGE: &str = ":error-message";

/// Names the modeled exception carried by an `exception` message.
pub const EXCEPTION_TYPE: &str = ":exception-type";

/// MIME type of the payload.
pub const CONTENT_TYPE: &str = ":content-type";

/// `:message-type` value for events.
pub const MESSAGE_TYPE_EVENT: &str = "event";

/// `:message-type` value for protocol errors.
pub const MESSAGE_TYPE_ERROR: &str = "error";

/// `:message-type` value for modeled exceptions.
pub const MESSAGE_TYPE_EXCEPTION: &str = "exception";

/// `:event-type` value marking the initial response.
pub const INITIAL_RESPONSE: &str = "initial-response";

const TYPE_BOOL_TRUE: u8 = 0;
const TYPE_BOOL_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_SHORT: u8 = 3;
const TYPE_INTEGER: u8 = 4;
const TYPE_LONG: u8 = 5;
const TYPE_BYTE_ARRAY: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

/// A typed header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    ByteArray(Bytes),
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl HeaderValue {
    /// The value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn type_id(&self) -> u8 {
        match self {
            HeaderValue::Bool(true) => TYPE_BOOL_TRUE,
            HeaderValue::Bool(false) => TYPE_BOOL_FALSE,
            HeaderValue::Byte(_) => TYPE_BYTE,
            HeaderValue::Short(_) => TYPE_SHORT,
            HeaderValue::Integer(_) => TYPE_INTEGER,
            HeaderValue::Long(_) => TYPE_LONG,
            HeaderValue::ByteArray(_) => TYPE_BYTE_ARRAY,
            HeaderValue::String(_) => TYPE_STRING,
            HeaderValue::Timestamp(_) => TYPE_TIMESTAMP,
            HeaderValue::Uuid(_) => TYPE_UUID,
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            HeaderValue::Bool(_) => 0,
            HeaderValue::Byte(_) => 1,
            HeaderValue::Short(_) => 2,
            HeaderValue::Integer(_) => 4,
            HeaderValue::Long(_) | HeaderValue::Timestamp(_) => 8,
            HeaderValue::ByteArray(bytes) => 2 + bytes.len(),
            HeaderValue::String(value) => 2 + value.len(),
            HeaderValue::Uuid(_) => 16,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Bool(value) => write!(f, "{value}"),
            HeaderValue::Byte(value) => write!(f, "{value}"),
            HeaderValue::Short(value) => write!(f, "{value}"),
            HeaderValue::Integer(value) => write!(f, "{value}"),
            HeaderValue::Long(value) | HeaderValue::Timestamp(value) => write!(f, "{value}"),
            HeaderValue::ByteArray(bytes) => write!(f, "<binary {} bytes>", bytes.len()),
            HeaderValue::String(value) => f.write_str(value),
            HeaderValue::Uuid(b) => write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
            ),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Long(value)
    }
}

impl From<Bytes> for HeaderValue {
    fn from(value: Bytes) -> Self {
        HeaderValue::ByteArray(value)
    }
}

/// A named header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: HeaderValue,
}

/// Headers in wire order.
///
/// Lookups return the first header with a matching name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any earlier header with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.entries.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Builder-style [`Headers::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|header| header.name == name)
            .map(|header| &header.value)
    }

    /// The value of `name` if present and string-typed.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the encoded header block in bytes.
    pub fn encoded_len(&self) -> usize {
        self.entries
            .iter()
            .map(|header| 1 + header.name.len() + header.value.encoded_len())
            .sum()
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        for header in &self.entries {
            let name_len = u8::try_from(header.name.len())
                .ok()
                .filter(|len| *len > 0)
                .ok_or_else(|| {
                    FrameError::MalformedHeader(format!(
                        "header name must be 1..=255 bytes, got {}",
                        header.name.len()
                    ))
                })?;
            dst.put_u8(name_len);
            dst.put_slice(header.name.as_bytes());
            dst.put_u8(header.value.type_id());

            match &header.value {
                HeaderValue::Bool(_) => {}
                HeaderValue::Byte(value) => dst.put_i8(*value),
                HeaderValue::Short(value) => dst.put_i16(*value),
                HeaderValue::Integer(value) => dst.put_i32(*value),
                HeaderValue::Long(value) | HeaderValue::Timestamp(value) => dst.put_i64(*value),
                HeaderValue::ByteArray(bytes) => {
                    put_u16_len(dst, &header.name, bytes.len())?;
                    dst.put_slice(bytes);
                }
                HeaderValue::String(value) => {
                    put_u16_len(dst, &header.name, value.len())?;
                    dst.put_slice(value.as_bytes());
                }
                HeaderValue::Uuid(bytes) => dst.put_slice(bytes),
            }
        }
        Ok(())
    }

    pub(crate) fn decode(mut src: Bytes) -> Result<Self> {
        let mut headers = Headers::new();
        while src.has_remaining() {
            let name_len = usize::from(src.get_u8());
            if name_len == 0 {
                return Err(FrameError::MalformedHeader("empty header name".to_string()));
            }
            let name = take(&mut src, name_len, "header name")?;
            let name = String::from_utf8(name.to_vec()).map_err(|_| {
                FrameError::MalformedHeader("header name is not valid UTF-8".to_string())
            })?;

            let type_id = take(&mut src, 1, &name)?[0];
            let value = match type_id {
                TYPE_BOOL_TRUE => HeaderValue::Bool(true),
                TYPE_BOOL_FALSE => HeaderValue::Bool(false),
                TYPE_BYTE => HeaderValue::Byte(take(&mut src, 1, &name)?.get_i8()),
                TYPE_SHORT => HeaderValue::Short(take(&mut src, 2, &name)?.get_i16()),
                TYPE_INTEGER => HeaderValue::Integer(take(&mut src, 4, &name)?.get_i32()),
                TYPE_LONG => HeaderValue::Long(take(&mut src, 8, &name)?.get_i64()),
                TYPE_BYTE_ARRAY => {
                    let len = usize::from(take(&mut src, 2, &name)?.get_u16());
                    HeaderValue::ByteArray(take(&mut src, len, &name)?)
                }
                TYPE_STRING => {
                    let len = usize::from(take(&mut src, 2, &name)?.get_u16());
                    let raw = take(&mut src, len, &name)?;
                    HeaderValue::String(String::from_utf8(raw.to_vec()).map_err(|_| {
                        FrameError::MalformedHeader(format!("value of {name} is not valid UTF-8"))
                    })?)
                }
                TYPE_TIMESTAMP => HeaderValue::Timestamp(take(&mut src, 8, &name)?.get_i64()),
                TYPE_UUID => {
                    let mut uuid = [0u8; 16];
                    take(&mut src, 16, &name)?.copy_to_slice(&mut uuid);
                    HeaderValue::Uuid(uuid)
                }
                other => return Err(FrameError::UnknownHeaderType(other)),
            };
            headers.entries.push(Header { name, value });
        }
        Ok(headers)
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<HeaderValue>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.push(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn put_u16_len(dst: &mut BytesMut, name: &str, len: usize) -> Result<()> {
    let len = u16::try_from(len).map_err(|_| {
        FrameError::MalformedHeader(format!("value of {name} exceeds 65535 bytes ({len})"))
    })?;
    dst.put_u16(len);
    Ok(())
}

fn take(src: &mut Bytes, len: usize, what: &str) -> Result<Bytes> {
    if src.remaining() < len {
        return Err(FrameError::MalformedHeader(format!(
            "truncated {what} (need {len} bytes, have {})",
            src.remaining()
        )));
    }
    Ok(src.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(headers: &Headers) -> Headers {
        let mut buf = BytesMut::new();
        headers.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), headers.encoded_len());
        Headers::decode(buf.freeze()).unwrap()
    }

    #[test]
    fn every_value_type_survives_encoding() {
        let headers = Headers::new()
            .with("t", true)
            .with("f", false)
            .with("b", HeaderValue::Byte(-3))
            .with("s", HeaderValue::Short(-300))
            .with("i", 70_000i32)
            .with("l", -5_000_000_000i64)
            .with("raw", Bytes::from_static(b"\x00\x01"))
            .with(MESSAGE_TYPE, MESSAGE_TYPE_EVENT)
            .with("ts", HeaderValue::Timestamp(1_700_000_000_000))
            .with("id", HeaderValue::Uuid([7; 16]));

        assert_eq!(roundtrip(&headers), headers);
    }

    #[test]
    fn lookup_returns_first_match() {
        let headers = Headers::new().with("k", "first").with("k", "second");
        assert_eq!(headers.get_str("k"), Some("first"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn get_str_ignores_non_string_values() {
        let headers = Headers::new().with(MESSAGE_TYPE, 1i32);
        assert!(headers.get(MESSAGE_TYPE).is_some());
        assert_eq!(headers.get_str(MESSAGE_TYPE), None);
    }

    #[test]
    fn display_renders_values_as_strings() {
        assert_eq!(HeaderValue::from("x").to_string(), "x");
        assert_eq!(HeaderValue::Integer(42).to_string(), "42");
        assert_eq!(HeaderValue::Bool(true).to_string(), "true");
        assert_eq!(
            HeaderValue::ByteArray(Bytes::from_static(b"abc")).to_string(),
            "<binary 3 bytes>"
        );
        assert_eq!(
            HeaderValue::Uuid([0xab; 16]).to_string(),
            "abababab-abab-abab-abab-abababababab"
        );
    }

    #[test]
    fn rejects_unknown_value_type() {
        let raw = Bytes::from_static(&[1, b'x', 42]);
        assert!(matches!(
            Headers::decode(raw),
            Err(FrameError::UnknownHeaderType(42))
        ));
    }

    #[test]
    fn rejects_truncated_string_value() {
        let raw = Bytes::from_static(&[1, b'x', TYPE_STRING, 0, 5, b'a']);
        assert!(matches!(
            Headers::decode(raw),
            Err(FrameError::MalformedHeader(_))
        ));
    }

    #[test]
    fn rejects_empty_header_name_on_encode() {
        let headers = Headers::new().with("", "value");
        let mut buf = BytesMut::new();
        assert!(matches!(
            headers.encode(&mut buf),
            Err(FrameError::MalformedHeader(_))
        ));
    }
}
