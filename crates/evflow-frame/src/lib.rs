//! Binary event-stream message framing.
//!
//! Every message on the wire is self-describing:
//! - A 12-byte prelude: total length, headers length, prelude CRC-32
//! - Typed, named headers (`:message-type`, `:event-type`, ...)
//! - An opaque payload
//! - A trailing CRC-32 over everything before it
//!
//! [`MessageDecoder`] turns arbitrarily split byte chunks back into whole
//! messages, handing each one to a callback as soon as it is complete.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod headers;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use codec::{
    decode_message, encode_message, FrameConfig, Message, DEFAULT_MAX_HEADERS_SIZE,
    DEFAULT_MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE, PRELUDE_SIZE,
};
pub use decoder::MessageDecoder;
pub use error::{FrameError, Result};
pub use headers::{Header, HeaderValue, Headers};
pub use reader::MessageReader;
pub use writer::MessageWriter;
