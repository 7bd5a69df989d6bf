//! `futures_core::Stream` adapter for typed events.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{BoxError, FlowError, Result};
use crate::publisher::EventPublisher;
use crate::subscriber::{EventSubscriber, EventSubscription};

enum Signal<E> {
    Next(E),
    Error(FlowError),
    Complete,
}

struct ChannelSubscriber<E> {
    tx: UnboundedSender<Signal<E>>,
    subscription: Arc<OnceLock<EventSubscription>>,
}

impl<E: Send + 'static> EventSubscriber<E> for ChannelSubscriber<E> {
    fn on_subscribe(&self, subscription: EventSubscription) {
        let _ = self.subscription.set(subscription);
    }

    fn on_next(&self, event: E) -> std::result::Result<(), BoxError> {
        self.tx
            .send(Signal::Next(event))
            .map_err(|_| BoxError::from("event stream dropped"))
    }

    fn on_error(&self, error: &FlowError) -> std::result::Result<(), BoxError> {
        let _ = self.tx.send(Signal::Error(error.clone()));
        Ok(())
    }

    fn on_complete(&self) -> std::result::Result<(), BoxError> {
        let _ = self.tx.send(Signal::Complete);
        Ok(())
    }
}

/// Typed events as a [`Stream`].
///
/// Requests one event whenever the stream is polled with its queue empty.
/// A chunk that completes more events than were requested still delivers
/// all of them, so the queue can hold up to one chunk's worth of events;
/// the next chunk is only pulled once that queue has drained. With a
/// [`ReadSource`](evflow_transport::ReadSource) every message is at least
/// 16 bytes and only one can straddle chunks, which caps the queue at
/// `chunk_size / 16 + 1` events.
///
/// A blocking transport is read on the polling task. Dropping the stream
/// cancels the subscription.
pub struct EventStream<E> {
    rx: UnboundedReceiver<Signal<E>>,
    subscription: Arc<OnceLock<EventSubscription>>,
    in_flight: bool,
    done: bool,
}

impl<E: Send + 'static> EventPublisher<E> {
    /// Subscribe and expose the events as a [`Stream`].
    pub fn into_stream(self) -> Result<EventStream<E>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Arc::new(OnceLock::new());
        self.subscribe(Arc::new(ChannelSubscriber {
            tx,
            subscription: Arc::clone(&subscription),
        }))?;
        Ok(EventStream {
            rx,
            subscription,
            in_flight: false,
            done: false,
        })
    }
}

impl<E> EventStream<E> {
    /// Events delivered but not yet yielded.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    fn on_signal(&mut self, signal: Option<Signal<E>>) -> Option<Result<E>> {
        match signal {
            Some(Signal::Next(event)) => {
                self.in_flight = false;
                Some(Ok(event))
            }
            Some(Signal::Error(err)) => {
                self.done = true;
                Some(Err(err))
            }
            Some(Signal::Complete) | None => {
                self.done = true;
                None
            }
        }
    }
}

impl<E> Stream for EventStream<E> {
    type Item = Result<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }
        if let Poll::Ready(signal) = this.rx.poll_recv(cx) {
            return Poll::Ready(this.on_signal(signal));
        }
        if this.in_flight {
            return Poll::Pending;
        }

        this.in_flight = true;
        if let Some(subscription) = this.subscription.get() {
            subscription.request(1);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(signal) => Poll::Ready(this.on_signal(signal)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E> Drop for EventStream<E> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("in_flight", &self.in_flight)
            .field("done", &self.done)
            .finish()
    }
}
