//! Wiring a transport, a transformer and a handler into one outcome.

use std::fmt;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use evflow_transport::{ChunkPublisher, ChunkSubscriber, ChunkSubscription, TransportError};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::handler::FlowResponseHandler;
use crate::publisher::EventPublisher;
use crate::transformer::{EventStreamTransformer, FlowConfig};
use crate::unmarshal::EventUnmarshaller;

/// Run one event-stream response.
///
/// Captures `response`, subscribes to `publisher` and routes the transport's
/// terminal signals to the transformer. The returned [`Outcome`] resolves
/// with the handler's result or the first recorded failure.
///
/// With a [`PullPublisher`](evflow_transport::PullPublisher), chunks are
/// read on whichever thread requests events, so the whole stream may have
/// run by the time this returns.
pub fn execute<H, U, P>(
    handler: H,
    unmarshaller: U,
    config: FlowConfig,
    response: H::Response,
    publisher: &P,
) -> Result<Outcome<H::Output>>
where
    H: FlowResponseHandler,
    H::Output: Send + 'static,
    U: EventUnmarshaller<Event = H::Event>,
    P: ChunkPublisher + ?Sized,
{
    let slot = Arc::new(OutcomeSlot::new());
    let transformer = EventStreamTransformer::with_config(
        ResolvingHandler {
            inner: handler,
            slot: Arc::clone(&slot),
        },
        unmarshaller,
        config,
    );
    transformer.response_received(response);

    let relay = TransportRelay {
        bytes: transformer.byte_subscriber(),
        transformer,
        slot: Arc::clone(&slot),
    };
    publisher.subscribe(Arc::new(relay))?;
    Ok(Outcome { slot })
}

/// Resolves the outcome as soon as the stream fails, even when the failure
/// came from inside the decoder and the transport never reports back.
struct ResolvingHandler<H: FlowResponseHandler> {
    inner: H,
    slot: Arc<OutcomeSlot<H::Output>>,
}

impl<H> FlowResponseHandler for ResolvingHandler<H>
where
    H: FlowResponseHandler,
    H::Output: Send + 'static,
{
    type Response = H::Response;
    type Event = H::Event;
    type Output = H::Output;

    fn response_received(&self, response: Self::Response) {
        self.inner.response_received(response);
    }

    fn on_stream(&self, publisher: EventPublisher<Self::Event>) {
        self.inner.on_stream(publisher);
    }

    fn exception_occurred(&self, error: &FlowError) {
        self.inner.exception_occurred(error);
        self.slot.resolve(Err(error.clone()));
    }

    fn complete(&self) -> Result<Self::Output> {
        self.inner.complete()
    }
}

struct TransportRelay<H, U>
where
    H: FlowResponseHandler,
    H::Output: Send + 'static,
{
    transformer: EventStreamTransformer<ResolvingHandler<H>, U>,
    bytes: Arc<dyn ChunkSubscriber>,
    slot: Arc<OutcomeSlot<H::Output>>,
}

impl<H, U> ChunkSubscriber for TransportRelay<H, U>
where
    H: FlowResponseHandler,
    H::Output: Send + 'static,
    U: EventUnmarshaller<Event = H::Event>,
{
    fn on_subscribe(&self, subscription: Arc<dyn ChunkSubscription>) {
        self.bytes.on_subscribe(subscription);
    }

    fn on_next(&self, chunk: Bytes) {
        self.bytes.on_next(chunk);
    }

    fn on_error(&self, error: TransportError) {
        self.transformer.exception_occurred(FlowError::from(error));
    }

    fn on_complete(&self) {
        let result = self.transformer.complete();
        self.slot.resolve(result);
    }
}

enum SlotState<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

struct OutcomeSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> OutcomeSlot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Only the first resolution counts.
    fn resolve(&self, result: Result<T>) {
        let mut state = self.lock();
        if !matches!(*state, SlotState::Pending) {
            debug!("outcome already resolved; dropping later result");
            return;
        }
        *state = SlotState::Ready(result);
        self.ready.notify_all();
    }
}

fn take<T>(state: &mut SlotState<T>) -> Result<T> {
    match mem::replace(state, SlotState::Taken) {
        SlotState::Ready(result) => result,
        SlotState::Pending | SlotState::Taken => Err(FlowError::OutcomeUnavailable),
    }
}

/// Final result of a stream started by [`execute`].
pub struct Outcome<T> {
    slot: Arc<OutcomeSlot<T>>,
}

impl<T> Outcome<T> {
    /// Block until the stream resolves and take its result.
    ///
    /// Returns `FlowError::OutcomeUnavailable` if the result was already taken.
    pub fn wait(&self) -> Result<T> {
        let mut state = self.slot.lock();
        while matches!(*state, SlotState::Pending) {
            state = self
                .slot
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        take(&mut state)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let state = self.slot.lock();
        let (mut state, _) = self
            .slot
            .ready
            .wait_timeout_while(state, timeout, |state| {
                matches!(state, SlotState::Pending)
            })
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SlotState::Pending) {
            return None;
        }
        Some(take(&mut state))
    }

    /// Take the result if the stream has resolved.
    pub fn try_take(&self) -> Option<Result<T>> {
        let mut state = self.slot.lock();
        if matches!(*state, SlotState::Pending) {
            return None;
        }
        Some(take(&mut state))
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(*self.slot.lock(), SlotState::Pending)
    }
}

impl<T> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn outcome<T>() -> (Outcome<T>, Arc<OutcomeSlot<T>>) {
        let slot = Arc::new(OutcomeSlot::new());
        (
            Outcome {
                slot: Arc::clone(&slot),
            },
            slot,
        )
    }

    #[test]
    fn first_resolution_wins() {
        let (outcome, slot) = outcome::<u32>();
        assert!(!outcome.is_resolved());

        slot.resolve(Err(FlowError::protocol("A", "first")));
        slot.resolve(Ok(1));

        assert!(matches!(outcome.wait(), Err(FlowError::Protocol { code, .. }) if code == "A"));
    }

    #[test]
    fn result_can_only_be_taken_once() {
        let (outcome, slot) = outcome::<u32>();
        slot.resolve(Ok(5));

        assert_eq!(outcome.try_take().unwrap().unwrap(), 5);
        assert!(matches!(outcome.wait(), Err(FlowError::OutcomeUnavailable)));
    }

    #[test]
    fn wait_blocks_until_another_thread_resolves() {
        let (outcome, slot) = outcome::<&'static str>();
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            slot.resolve(Ok("done"));
        });

        assert_eq!(outcome.wait().unwrap(), "done");
        resolver.join().unwrap();
    }

    #[test]
    fn wait_timeout_gives_up_while_pending() {
        let (outcome, _slot) = outcome::<u32>();
        assert!(outcome.try_take().is_none());
        assert!(outcome.wait_timeout(Duration::from_millis(10)).is_none());
    }
}
