/// Errors that can occur while producing byte chunks.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred while reading from the underlying source.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The publisher already has a subscriber.
    #[error("publisher already has a subscriber")]
    AlreadySubscribed,

    /// The transport gave up on the stream.
    #[error("transport aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
