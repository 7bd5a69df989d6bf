use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use evflow_frame::MessageDecoder;
use evflow_transport::{ChunkSubscriber, ChunkSubscription, TransportError};
use tracing::{debug, trace, warn};

use crate::error::FlowError;
use crate::handler::FlowResponseHandler;
use crate::publisher::EventPublisher;
use crate::transformer::FlowCore;
use crate::unmarshal::EventUnmarshaller;

/// Consumes raw chunks from the transport and drives them through the decoder.
///
/// Transport completion and failure are not handled here: the layer that
/// subscribed this consumer routes them to the transformer, which knows what
/// has already been delivered downstream.
pub(crate) struct ByteSubscriber<H: FlowResponseHandler, U> {
    core: Arc<FlowCore<H, U>>,
    decoder: Mutex<MessageDecoder>,
}

impl<H, U> ByteSubscriber<H, U>
where
    H: FlowResponseHandler,
    U: EventUnmarshaller<Event = H::Event>,
{
    pub(crate) fn new(core: Arc<FlowCore<H, U>>) -> Self {
        let decoder = MessageDecoder::with_config(core.frame_config().clone());
        Self {
            core,
            decoder: Mutex::new(decoder),
        }
    }

    fn consume(&self, chunk: &[u8]) -> Result<(), FlowError> {
        let mut decoder = self.decoder.lock().unwrap_or_else(PoisonError::into_inner);
        decoder.feed(chunk, |message| self.core.dispatch(message))
    }
}

impl<H, U> ChunkSubscriber for ByteSubscriber<H, U>
where
    H: FlowResponseHandler,
    U: EventUnmarshaller<Event = H::Event>,
{
    fn on_subscribe(&self, subscription: Arc<dyn ChunkSubscription>) {
        let downstream = self.core.downstream();
        if !downstream.attach_upstream(Arc::clone(&subscription)) {
            warn!("byte stream already attached; cancelling the new subscription");
            subscription.cancel();
            return;
        }
        debug!("byte stream attached");
        self.core
            .handler()
            .on_stream(EventPublisher::new(Arc::clone(downstream)));
    }

    fn on_next(&self, chunk: Bytes) {
        if self.core.is_done() {
            trace!(size = chunk.len(), "dropping chunk after termination");
            return;
        }
        match self.consume(&chunk) {
            Ok(()) => self.core.downstream().chunk_consumed(),
            Err(err) => self.core.fail_from_stream(err),
        }
    }

    fn on_error(&self, error: TransportError) {
        debug!(error = %error, "byte stream failed");
    }

    fn on_complete(&self) {
        debug!("byte stream finished");
    }
}
