/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The prelude checksum does not match the prelude bytes.
    #[error("prelude checksum mismatch (expected {expected:#010x}, computed {actual:#010x})")]
    PreludeChecksumMismatch { expected: u32, actual: u32 },

    /// The trailing message checksum does not match the message bytes.
    #[error("message checksum mismatch (expected {expected:#010x}, computed {actual:#010x})")]
    MessageChecksumMismatch { expected: u32, actual: u32 },

    /// The prelude lengths are inconsistent with each other.
    #[error("invalid message length (total {total} bytes, headers {headers} bytes)")]
    InvalidLength { total: usize, headers: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The header block exceeds the configured maximum size.
    #[error("headers too large ({size} bytes, max {max})")]
    HeadersTooLarge { size: usize, max: usize },

    /// A header could not be parsed or encoded.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A header carries a value type this decoder does not know.
    #[error("unknown header value type {0}")]
    UnknownHeaderType(u8),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
