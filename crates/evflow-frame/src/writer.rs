use std::io::{self, ErrorKind, Write};

use bytes::{Bytes, BytesMut};

use crate::codec::{encode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};
use crate::headers::Headers;

const SCRATCH_CAPACITY: usize = 8 * 1024;

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Blocking message sink over any `Write`.
///
/// Each message is encoded into a reused scratch buffer first, so an encode
/// failure (for example an oversized payload) leaves the stream untouched.
pub struct MessageWriter<W> {
    sink: W,
    scratch: BytesMut,
    config: FrameConfig,
    written: u64,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, FrameConfig::default())
    }

    pub fn with_config(sink: W, config: FrameConfig) -> Self {
        Self {
            sink,
            scratch: BytesMut::with_capacity(SCRATCH_CAPACITY),
            config,
            written: 0,
        }
    }

    /// Encode `message`, write all of it and flush.
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        self.scratch.clear();
        encode_message(message, &self.config, &mut self.scratch)?;

        let mut pending: &[u8] = &self.scratch;
        while !pending.is_empty() {
            match self.sink.write(pending) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => pending = &pending[n..],
                Err(err) if is_transient(&err) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.written += 1;

        self.flush()
    }

    /// Build a message from `headers` and `payload` and write it.
    pub fn send(&mut self, headers: Headers, payload: impl Into<Bytes>) -> Result<()> {
        self.write_message(&Message::new(headers, payload))
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.sink.flush() {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Messages written so far.
    pub fn messages_written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
