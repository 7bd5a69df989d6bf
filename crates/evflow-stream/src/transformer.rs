use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use evflow_frame::{FrameConfig, Message};
use evflow_transport::{ChunkPublisher, ChunkSubscriber};
use tracing::{debug, trace, warn};

use crate::arbiter::{TerminalArbiter, Transition};
use crate::consumer::ByteSubscriber;
use crate::dispatch::{classify, FrameKind};
use crate::error::{FlowError, Result};
use crate::handler::FlowResponseHandler;
use crate::publisher::Downstream;
use crate::unmarshal::{EventResponse, EventUnmarshaller, UnmarshalContext};

/// Configuration for one event stream.
#[derive(Debug, Clone, Default)]
pub struct FlowConfig {
    /// Limits applied while decoding messages.
    pub frame: FrameConfig,
    /// Handed to every unmarshal call.
    pub unmarshal_context: UnmarshalContext,
}

/// Bridges a raw byte stream to a typed event subscriber.
///
/// One transformer serves one response:
/// 1. [`response_received`](Self::response_received) captures the initial response
/// 2. [`on_stream`](Self::on_stream) attaches the byte transport; the handler
///    then receives the typed [`EventPublisher`](crate::EventPublisher)
/// 3. the transport's terminal signal is routed to
///    [`exception_occurred`](Self::exception_occurred) or [`complete`](Self::complete)
///
/// Decode errors, error messages and unmarshal failures end the stream from
/// the inside, through the same failure path as transport errors. Whatever
/// happens first wins; the handler sees exactly one terminal call.
pub struct EventStreamTransformer<H: FlowResponseHandler, U> {
    core: Arc<FlowCore<H, U>>,
}

impl<H, U> EventStreamTransformer<H, U>
where
    H: FlowResponseHandler,
    U: EventUnmarshaller<Event = H::Event>,
{
    pub fn new(handler: H, unmarshaller: U) -> Self {
        Self::with_config(handler, unmarshaller, FlowConfig::default())
    }

    pub fn with_config(handler: H, unmarshaller: U, config: FlowConfig) -> Self {
        Self {
            core: Arc::new(FlowCore {
                handler,
                unmarshaller,
                config,
                downstream: Arc::new(Downstream::new()),
                arbiter: TerminalArbiter::new(),
                response: Mutex::new(None),
            }),
        }
    }

    /// Capture the initial response until its marker message arrives.
    pub fn response_received(&self, response: H::Response) {
        let mut slot = self.core.lock_response();
        if slot.is_some() {
            warn!("initial response already captured; keeping the first");
            return;
        }
        *slot = Some(response);
    }

    /// Subscribe to the byte transport.
    pub fn on_stream<P: ChunkPublisher + ?Sized>(&self, publisher: &P) -> Result<()> {
        publisher.subscribe(self.byte_subscriber())?;
        Ok(())
    }

    /// A chunk subscriber feeding this transformer, for callers that route
    /// the transport's terminal signals themselves.
    pub fn byte_subscriber(&self) -> Arc<dyn ChunkSubscriber> {
        Arc::new(ByteSubscriber::new(Arc::clone(&self.core)))
    }

    /// The stream failed outside the decoder, usually in the transport.
    pub fn exception_occurred(&self, error: FlowError) {
        self.core.fail(error);
    }

    /// The transport finished.
    ///
    /// Returns the handler's result, or the recorded cause if the stream
    /// already failed. A second call returns `FlowError::AlreadyCompleted`.
    pub fn complete(&self) -> Result<H::Output> {
        self.core.complete()
    }

    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    pub fn handler(&self) -> &H {
        &self.core.handler
    }
}

impl<H: FlowResponseHandler, U> Clone for EventStreamTransformer<H, U> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct FlowCore<H: FlowResponseHandler, U> {
    handler: H,
    unmarshaller: U,
    config: FlowConfig,
    downstream: Arc<Downstream<H::Event>>,
    arbiter: TerminalArbiter,
    response: Mutex<Option<H::Response>>,
}

impl<H, U> FlowCore<H, U>
where
    H: FlowResponseHandler,
    U: EventUnmarshaller<Event = H::Event>,
{
    pub(crate) fn handler(&self) -> &H {
        &self.handler
    }

    pub(crate) fn downstream(&self) -> &Arc<Downstream<H::Event>> {
        &self.downstream
    }

    pub(crate) fn frame_config(&self) -> &FrameConfig {
        &self.config.frame
    }

    pub(crate) fn is_done(&self) -> bool {
        self.arbiter.is_done()
    }

    fn lock_response(&self) -> MutexGuard<'_, Option<H::Response>> {
        self.response.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one decoded message. An error stops the rest of the chunk.
    pub(crate) fn dispatch(&self, message: Message) -> Result<()> {
        if self.arbiter.is_done() {
            return Ok(());
        }
        match classify(&message) {
            FrameKind::InitialResponse => {
                self.release_initial_response();
                Ok(())
            }
            FrameKind::Event => self.deliver_event(message),
            FrameKind::MissingEventType => {
                Err(FlowError::client("event message has no :event-type header"))
            }
            FrameKind::Error { code, message } => {
                debug!(code = %code, message = %message, "error message received");
                Err(FlowError::protocol(code, message))
            }
            FrameKind::Other(kind) => {
                debug!(
                    message_type = kind.as_deref().unwrap_or("<none>"),
                    "ignoring message"
                );
                Ok(())
            }
        }
    }

    fn release_initial_response(&self) {
        let response = self.lock_response().take();
        match response {
            Some(response) => {
                debug!("initial response released");
                self.handler.response_received(response);
            }
            None => warn!("initial-response marker without a captured response; skipping"),
        }
    }

    fn deliver_event(&self, message: Message) -> Result<()> {
        if !self.downstream.demand().take_one() {
            trace!("event exceeds outstanding demand");
        }
        let response = EventResponse::from(message);
        let event = self
            .unmarshaller
            .unmarshal(&response, &self.config.unmarshal_context)
            .map_err(FlowError::client)?;
        self.downstream.deliver(event)
    }

    /// Record a failure; the first terminal transition wins.
    ///
    /// The subscriber and the handler are notified while the arbiter is
    /// held, so a racing `complete` returns only after both have run.
    pub(crate) fn fail(&self, cause: FlowError) {
        let transition = self.arbiter.fail_with(&cause, |cause| {
            debug!(error = %cause, "event stream failed");
            self.downstream.close();
            if let Some(subscriber) = self.downstream.subscriber() {
                if let Err(err) = subscriber.on_error(cause) {
                    warn!(error = %err, "event subscriber on_error failed; ignoring");
                }
            }
            self.handler.exception_occurred(cause);
        });
        match transition {
            Transition::Won(()) => {}
            Transition::AlreadyFailed(first) => {
                debug!(error = %cause, first = %first, "stream already failed; ignoring");
            }
            Transition::AlreadyCompleted => {
                debug!(error = %cause, "stream already completed; ignoring failure");
            }
        }
    }

    /// A failure raised while decoding: record it and stop the transport.
    pub(crate) fn fail_from_stream(&self, cause: FlowError) {
        self.fail(cause);
        self.downstream.halt();
    }

    pub(crate) fn complete(&self) -> Result<H::Output> {
        let transition = self.arbiter.complete_with(|| {
            debug!("event stream completed");
            self.downstream.close();
            if let Some(subscriber) = self.downstream.subscriber() {
                if let Err(err) = subscriber.on_complete() {
                    warn!(error = %err, "event subscriber on_complete failed; ignoring");
                }
            }
            self.handler.complete()
        });
        match transition {
            Transition::Won(result) => result,
            Transition::AlreadyFailed(cause) => {
                debug!(error = %cause, "completion after failure; returning the recorded cause");
                Err(cause)
            }
            Transition::AlreadyCompleted => Err(FlowError::AlreadyCompleted),
        }
    }
}
