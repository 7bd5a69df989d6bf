use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Default chunk size for reader-backed sources: 8 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for chunk sources.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Upper bound on the size of a single chunk. Default: 8 KiB.
    pub chunk_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Produces one chunk at a time on demand.
///
/// `Ok(None)` marks the end of the stream.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Chunks read from any `Read` stream.
///
/// Each chunk is the result of a single successful `read`, so chunk
/// boundaries follow whatever the underlying stream returns.
pub struct ReadSource<R> {
    inner: R,
    config: SourceConfig,
}

impl<R: Read + Send> ReadSource<R> {
    /// Create a source with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, SourceConfig::default())
    }

    /// Create a source with explicit configuration.
    pub fn with_config(inner: R, config: SourceConfig) -> Self {
        Self { inner, config }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the source and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current source configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

impl<R: Read + Send> ChunkSource for ReadSource<R> {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        // A zero-sized buffer would read as EOF.
        let mut chunk = BytesMut::zeroed(self.config.chunk_size.max(1));
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    chunk.truncate(n);
                    return Ok(Some(chunk.freeze()));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// Pre-split chunks, yielded in iteration order.
pub struct IterSource<I> {
    chunks: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Bytes> + Send,
{
    pub fn new(chunks: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

impl<I> ChunkSource for IterSource<I>
where
    I: Iterator<Item = Bytes> + Send,
{
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.chunks.next())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn read_source_respects_chunk_size() {
        let mut source = ReadSource::with_config(
            Cursor::new(b"abcdefgh".to_vec()),
            SourceConfig { chunk_size: 3 },
        );

        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"abc");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"def");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"gh");
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn zero_chunk_size_still_makes_progress() {
        let mut source =
            ReadSource::with_config(Cursor::new(b"xy".to_vec()), SourceConfig { chunk_size: 0 });

        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"x");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"y");
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn interrupted_read_retries() {
        let mut source = ReadSource::new(InterruptedThenData {
            interrupted: false,
            bytes: b"ok".to_vec(),
            pos: 0,
        });

        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn read_error_propagates_as_io() {
        let mut source = ReadSource::new(AlwaysFails);
        let err = source.next_chunk().unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn iter_source_yields_in_order() {
        let mut source = IterSource::new(vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two"),
        ]);

        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(source.next_chunk().unwrap().unwrap().as_ref(), b"two");
        assert!(source.next_chunk().unwrap().is_none());
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct AlwaysFails;

    impl Read for AlwaysFails {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
