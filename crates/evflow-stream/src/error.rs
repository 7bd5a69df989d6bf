use std::sync::Arc;

use evflow_frame::FrameError;
use evflow_transport::TransportError;

/// Boxed error returned by user-supplied collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that terminate an event stream.
///
/// Cloneable: one captured cause is handed to the downstream subscriber,
/// to the response handler, and returned again by a late `complete`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// The byte transport failed.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<TransportError>),

    /// The byte stream could not be decoded into messages.
    #[error("decode error: {0}")]
    Decode(#[source] Arc<FrameError>),

    /// The peer sent an error message mid-stream.
    #[error("error message received ({code}): {message}")]
    Protocol { code: String, message: String },

    /// An event could not be unmarshalled or handed to the subscriber.
    #[error("client error: {0}")]
    Client(Arc<dyn std::error::Error + Send + Sync>),

    /// An event arrived before anyone subscribed to the event publisher.
    #[error("event received before a subscriber was attached")]
    NoSubscriber,

    /// The event publisher already has a subscriber.
    #[error("event publisher already has a subscriber")]
    AlreadySubscribed,

    /// `complete` was called on a stream that already completed.
    #[error("event stream already completed")]
    AlreadyCompleted,

    /// The stream ended without producing an outcome.
    #[error("event stream outcome unavailable")]
    OutcomeUnavailable,
}

impl FlowError {
    /// Wrap a collaborator failure as a client error.
    pub fn client(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        FlowError::Client(Arc::from(err))
    }

    /// Protocol error built from an error message's code and text.
    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::Protocol {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<TransportError> for FlowError {
    fn from(err: TransportError) -> Self {
        FlowError::Transport(Arc::new(err))
    }
}

impl From<FrameError> for FlowError {
    fn from(err: FrameError) -> Self {
        FlowError::Decode(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
