use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};

const BUFFER_CAPACITY: usize = 8 * 1024;
const READ_SIZE: usize = 8 * 1024;

/// Blocking message source over any `Read`.
///
/// Partial reads are buffered internally; callers only see complete messages.
pub struct MessageReader<R> {
    source: R,
    pending: BytesMut,
    config: FrameConfig,
}

impl<R: Read> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, FrameConfig::default())
    }

    pub fn with_config(source: R, config: FrameConfig) -> Self {
        Self {
            source,
            pending: BytesMut::with_capacity(BUFFER_CAPACITY),
            config,
        }
    }

    /// Pull more bytes into the buffer. Returns `false` at end of input.
    fn fill(&mut self) -> Result<bool> {
        let mut scratch = [0u8; READ_SIZE];
        loop {
            match self.source.read(&mut scratch) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pending.extend_from_slice(&scratch[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Block until the next complete message.
    ///
    /// End of input, clean or not, is `FrameError::ConnectionClosed`.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(message) = decode_message(&mut self.pending, &self.config)? {
                return Ok(message);
            }
            if !self.fill()? {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Like [`read_message`](Self::read_message), but a clean end of input
    /// (nothing buffered) is `Ok(None)`.
    pub fn try_read_message(&mut self) -> Result<Option<Message>> {
        match self.read_message() {
            Ok(message) => Ok(Some(message)),
            Err(FrameError::ConnectionClosed) if self.pending.is_empty() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Bytes buffered towards an incomplete message.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<R: Read> Iterator for MessageReader<R> {
    type Item = Result<Message>;

    /// Ends at a clean end of input.
    fn next(&mut self) -> Option<Self::Item> {
        self.try_read_message().transpose()
    }
}
