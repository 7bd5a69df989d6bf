use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_message, FrameConfig, Message};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Incremental message decoder.
///
/// Accepts byte slices of any length and split. Whenever the buffered bytes
/// complete one or more messages, each is handed to the caller's callback,
/// in arrival order, before [`MessageDecoder::feed`] returns. Bytes of an
/// incomplete trailing message stay buffered for the next call.
#[derive(Debug)]
pub struct MessageDecoder {
    buf: BytesMut,
    config: FrameConfig,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDecoder {
    /// Create a new decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Buffer `bytes` and deliver every message they complete.
    ///
    /// The first error, whether a decode failure (converted through
    /// `From<FrameError>`) or one returned by `on_message`, stops the feed:
    /// messages after it are left undelivered and the error is returned.
    pub fn feed<F, E>(&mut self, bytes: &[u8], mut on_message: F) -> Result<(), E>
    where
        F: FnMut(Message) -> Result<(), E>,
        E: From<FrameError>,
    {
        self.buf.extend_from_slice(bytes);
        while let Some(message) = decode_message(&mut self.buf, &self.config)? {
            trace!(
                size = message.wire_size(),
                buffered = self.buf.len(),
                "message decoded"
            );
            on_message(message)?;
        }
        Ok(())
    }

    /// Decode everything `bytes` completes into a vector.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Vec<Message>, FrameError> {
        let mut messages = Vec::new();
        self.feed(bytes, |message| {
            messages.push(message);
            Ok::<(), FrameError>(())
        })?;
        Ok(messages)
    }

    /// Number of bytes buffered towards an incomplete message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
