use crate::error::FlowError;
use crate::publisher::EventPublisher;

/// Owner of an event-stream response.
///
/// Receives the initial response, the typed event publisher, and exactly one
/// terminal call: either [`exception_occurred`](Self::exception_occurred) or
/// [`complete`](Self::complete).
pub trait FlowResponseHandler: Send + Sync + 'static {
    /// The non-streamed part of the response.
    type Response: Send + 'static;
    /// Typed events published downstream.
    type Event: Send + 'static;
    /// Final result of a successful stream.
    type Output;

    /// The initial response, released when its marker message is decoded.
    fn response_received(&self, response: Self::Response);

    /// The typed event publisher, handed over once the byte stream is attached.
    fn on_stream(&self, publisher: EventPublisher<Self::Event>);

    /// The stream failed.
    fn exception_occurred(&self, error: &FlowError);

    /// The stream finished successfully.
    fn complete(&self) -> Result<Self::Output, FlowError>;
}
