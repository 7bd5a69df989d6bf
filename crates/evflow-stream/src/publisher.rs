use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use evflow_transport::ChunkSubscription;
use tracing::{debug, trace, warn};

use crate::demand::Demand;
use crate::error::{FlowError, Result};
use crate::subscriber::{DemandControl, EventSubscriber, EventSubscription};

/// State shared by the typed event side and the byte consuming side.
///
/// `pull_pending` is true from the moment a chunk is requested upstream until
/// the byte consumer has finished decoding it, so at most one chunk request
/// is ever outstanding. Once `closed`, the stream has reached its terminal
/// state and nothing is pulled any more.
pub(crate) struct Downstream<E> {
    demand: Demand,
    subscriber: OnceLock<Arc<dyn EventSubscriber<E>>>,
    upstream: OnceLock<Arc<dyn ChunkSubscription>>,
    pull_pending: AtomicBool,
    cancelled: AtomicBool,
    closed: AtomicBool,
}

impl<E: Send + 'static> Downstream<E> {
    pub(crate) fn new() -> Self {
        Self {
            demand: Demand::new(),
            subscriber: OnceLock::new(),
            upstream: OnceLock::new(),
            pull_pending: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn demand(&self) -> &Demand {
        &self.demand
    }

    pub(crate) fn subscriber(&self) -> Option<&Arc<dyn EventSubscriber<E>>> {
        self.subscriber.get()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns false if an upstream subscription was already attached.
    pub(crate) fn attach_upstream(&self, subscription: Arc<dyn ChunkSubscription>) -> bool {
        self.upstream.set(subscription).is_ok()
    }

    /// Request one chunk unless a request is already outstanding.
    pub(crate) fn prime(&self) {
        if self.is_cancelled() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(upstream) = self.upstream.get() else {
            return;
        };
        if self
            .pull_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            trace!(demand = self.demand.get(), "requesting chunk");
            upstream.request(1);
        }
    }

    /// The byte consumer finished a chunk; pull again if demand remains.
    pub(crate) fn chunk_consumed(&self) {
        self.pull_pending.store(false, Ordering::SeqCst);
        if self.demand.get() > 0 {
            self.prime();
        }
    }

    /// Stop pulling without touching the upstream subscription.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Stop pulling and cancel the upstream subscription.
    pub(crate) fn halt(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }
    }

    pub(crate) fn deliver(&self, event: E) -> Result<()> {
        let subscriber = self.subscriber.get().ok_or(FlowError::NoSubscriber)?;
        subscriber.on_next(event).map_err(FlowError::client)
    }
}

impl<E: Send + 'static> DemandControl for Downstream<E> {
    fn request(&self, n: u64) {
        if n == 0 {
            warn!("ignoring request for zero events");
            return;
        }
        if self.is_cancelled() {
            return;
        }
        let outstanding = self.demand.add(n);
        trace!(requested = n, outstanding, "event demand updated");
        self.prime();
    }

    fn cancel(&self) {
        debug!(outstanding = self.demand.get(), "event subscription cancelled");
        self.halt();
    }
}

/// Single-subscriber publisher of typed events.
///
/// Handed to [`FlowResponseHandler::on_stream`](crate::FlowResponseHandler::on_stream)
/// once the byte stream is attached. Demand requested through the
/// subscription is translated into chunk requests upstream.
pub struct EventPublisher<E> {
    downstream: Arc<Downstream<E>>,
}

impl<E: Send + 'static> EventPublisher<E> {
    pub(crate) fn new(downstream: Arc<Downstream<E>>) -> Self {
        Self { downstream }
    }

    /// Attach the subscriber and hand it its subscription.
    ///
    /// Returns `Err(FlowError::AlreadySubscribed)` on a second call; the
    /// first subscriber keeps receiving events.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber<E>>) -> Result<()> {
        if self.downstream.subscriber.set(Arc::clone(&subscriber)).is_err() {
            warn!("rejecting second event subscriber");
            return Err(FlowError::AlreadySubscribed);
        }
        debug!("event subscriber attached");
        let control: Arc<dyn DemandControl> = self.downstream.clone();
        subscriber.on_subscribe(EventSubscription::new(control));
        Ok(())
    }

    pub fn has_subscriber(&self) -> bool {
        self.downstream.subscriber.get().is_some()
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        Self {
            downstream: Arc::clone(&self.downstream),
        }
    }
}

impl<E> fmt::Debug for EventPublisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribed", &self.downstream.subscriber.get().is_some())
            .field("outstanding", &self.downstream.demand.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    use super::*;
    use crate::error::BoxError;

    #[derive(Default)]
    struct CountingUpstream {
        requests: AtomicU64,
        cancels: AtomicU64,
    }

    impl ChunkSubscription for CountingUpstream {
        fn request(&self, n: u64) {
            self.requests.fetch_add(n, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Holder {
        subscription: Mutex<Option<EventSubscription>>,
        events: Mutex<Vec<u32>>,
    }

    impl Holder {
        fn subscription(&self) -> EventSubscription {
            self.subscription.lock().unwrap().clone().unwrap()
        }
    }

    impl EventSubscriber<u32> for Holder {
        fn on_subscribe(&self, subscription: EventSubscription) {
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        fn on_next(&self, event: u32) -> std::result::Result<(), BoxError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn wired() -> (Arc<Downstream<u32>>, Arc<CountingUpstream>, Arc<Holder>) {
        let downstream = Arc::new(Downstream::new());
        let upstream = Arc::new(CountingUpstream::default());
        assert!(downstream.attach_upstream(upstream.clone()));
        let holder = Arc::new(Holder::default());
        EventPublisher::new(Arc::clone(&downstream))
            .subscribe(holder.clone())
            .unwrap();
        (downstream, upstream, holder)
    }

    #[test]
    fn first_request_pulls_exactly_one_chunk() {
        let (downstream, upstream, holder) = wired();

        holder.subscription().request(1);
        holder.subscription().request(3);

        assert_eq!(upstream.requests.load(Ordering::SeqCst), 1);
        assert_eq!(downstream.demand().get(), 4);
    }

    #[test]
    fn consumed_chunk_repulls_only_while_demand_remains() {
        let (downstream, upstream, holder) = wired();
        holder.subscription().request(1);

        downstream.chunk_consumed();
        assert_eq!(upstream.requests.load(Ordering::SeqCst), 2);

        assert!(downstream.demand().take_one());
        downstream.chunk_consumed();
        assert_eq!(upstream.requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_request_is_ignored() {
        let (downstream, upstream, holder) = wired();
        holder.subscription().request(0);
        assert_eq!(upstream.requests.load(Ordering::SeqCst), 0);
        assert_eq!(downstream.demand().get(), 0);
    }

    #[test]
    fn cancel_propagates_once_and_stops_requests() {
        let (downstream, upstream, holder) = wired();
        holder.subscription().cancel();
        holder.subscription().cancel();
        holder.subscription().request(5);

        assert_eq!(upstream.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.requests.load(Ordering::SeqCst), 0);
        assert!(downstream.is_cancelled());
    }

    #[test]
    fn second_subscriber_is_rejected() {
        let (downstream, _upstream, holder) = wired();
        let publisher = EventPublisher::new(Arc::clone(&downstream));

        let err = publisher.subscribe(Arc::new(Holder::default())).unwrap_err();
        assert!(matches!(err, FlowError::AlreadySubscribed));

        downstream.deliver(7).unwrap();
        assert_eq!(*holder.events.lock().unwrap(), vec![7]);
    }

    #[test]
    fn delivery_without_subscriber_fails() {
        let downstream = Downstream::<u32>::new();
        assert!(matches!(downstream.deliver(1), Err(FlowError::NoSubscriber)));
    }
}
