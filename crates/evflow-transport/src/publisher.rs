use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::source::{ChunkSource, IterSource, ReadSource, SourceConfig};
use crate::traits::{ChunkPublisher, ChunkSubscriber, ChunkSubscription};

/// Turns a [`ChunkSource`] into a single-subscriber [`ChunkPublisher`].
///
/// Chunks are pulled from the source on the thread that calls
/// [`ChunkSubscription::request`]. A `request` issued from inside
/// `on_next` only adds demand; the outer delivery loop picks it up, so
/// delivery never recurses.
pub struct PullPublisher<S> {
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    source: Mutex<S>,
    state: Mutex<DeliveryState>,
    subscriber: OnceLock<Arc<dyn ChunkSubscriber>>,
}

#[derive(Debug, Default)]
struct DeliveryState {
    demand: u64,
    draining: bool,
    terminated: bool,
    cancelled: bool,
}

impl<S: ChunkSource + 'static> PullPublisher<S> {
    pub fn new(source: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                source: Mutex::new(source),
                state: Mutex::new(DeliveryState::default()),
                subscriber: OnceLock::new(),
            }),
        }
    }
}

impl<R: std::io::Read + Send + 'static> PullPublisher<ReadSource<R>> {
    /// Publish chunks read from `reader` with default configuration.
    pub fn from_reader(reader: R) -> Self {
        Self::new(ReadSource::new(reader))
    }

    /// Publish chunks read from `reader` with explicit configuration.
    pub fn from_reader_with_config(reader: R, config: SourceConfig) -> Self {
        Self::new(ReadSource::with_config(reader, config))
    }
}

impl<I> PullPublisher<IterSource<I>>
where
    I: Iterator<Item = Bytes> + Send + 'static,
{
    /// Publish a fixed list of chunks.
    pub fn from_chunks(chunks: impl IntoIterator<IntoIter = I>) -> Self {
        Self::new(IterSource::new(chunks))
    }
}

impl<S: ChunkSource + 'static> ChunkPublisher for PullPublisher<S> {
    fn subscribe(&self, subscriber: Arc<dyn ChunkSubscriber>) -> Result<()> {
        if self.shared.subscriber.set(Arc::clone(&subscriber)).is_err() {
            return Err(TransportError::AlreadySubscribed);
        }
        debug!("chunk subscriber attached");
        subscriber.on_subscribe(Arc::new(PullSubscription {
            shared: Arc::clone(&self.shared),
        }));
        Ok(())
    }
}

struct PullSubscription<S> {
    shared: Arc<Shared<S>>,
}

impl<S: ChunkSource> ChunkSubscription for PullSubscription<S> {
    fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        {
            let mut state = self.shared.lock_state();
            if state.terminated || state.cancelled {
                return;
            }
            state.demand = state.demand.saturating_add(n);
            trace!(demand = state.demand, "chunk demand updated");
            if state.draining {
                return;
            }
            state.draining = true;
        }
        self.shared.drain();
    }

    fn cancel(&self) {
        let mut state = self.shared.lock_state();
        if !state.cancelled {
            debug!(pending = state.demand, "chunk subscription cancelled");
        }
        state.cancelled = true;
        state.demand = 0;
    }
}

impl<S: ChunkSource> Shared<S> {
    fn lock_state(&self) -> MutexGuard<'_, DeliveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver chunks until demand runs out or the stream terminates.
    ///
    /// Only one thread drains at a time; callers must have set `draining`.
    fn drain(&self) {
        let Some(subscriber) = self.subscriber.get() else {
            self.lock_state().draining = false;
            return;
        };

        loop {
            {
                let mut state = self.lock_state();
                if state.terminated || state.cancelled || state.demand == 0 {
                    state.draining = false;
                    return;
                }
                state.demand -= 1;
            }

            let next = self
                .source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next_chunk();

            match next {
                Ok(Some(chunk)) => {
                    trace!(size = chunk.len(), "delivering chunk");
                    subscriber.on_next(chunk);
                }
                Ok(None) => {
                    if self.terminate() {
                        debug!("chunk source exhausted");
                        subscriber.on_complete();
                    }
                    return;
                }
                Err(err) => {
                    if self.terminate() {
                        debug!(error = %err, "chunk source failed");
                        subscriber.on_error(err);
                    }
                    return;
                }
            }
        }
    }

    /// Mark the stream terminated. Returns false if it already was, or was cancelled.
    fn terminate(&self) -> bool {
        let mut state = self.lock_state();
        state.draining = false;
        if state.terminated || state.cancelled {
            return false;
        }
        state.terminated = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Signal {
        Next(Vec<u8>),
        Error(String),
        Complete,
    }

    /// Records signals and optionally re-requests from inside `on_next`.
    struct Recorder {
        subscription: Mutex<Option<Arc<dyn ChunkSubscription>>>,
        signals: Mutex<Vec<Signal>>,
        rerequest: bool,
    }

    impl Recorder {
        fn new(rerequest: bool) -> Arc<Self> {
            Arc::new(Self {
                subscription: Mutex::new(None),
                signals: Mutex::new(Vec::new()),
                rerequest,
            })
        }

        fn request(&self, n: u64) {
            let subscription = self.subscription.lock().unwrap().clone().unwrap();
            subscription.request(n);
        }

        fn cancel(&self) {
            let subscription = self.subscription.lock().unwrap().clone().unwrap();
            subscription.cancel();
        }

        fn signals(&self) -> Vec<Signal> {
            std::mem::take(&mut *self.signals.lock().unwrap())
        }
    }

    impl ChunkSubscriber for Recorder {
        fn on_subscribe(&self, subscription: Arc<dyn ChunkSubscription>) {
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        fn on_next(&self, chunk: Bytes) {
            self.signals.lock().unwrap().push(Signal::Next(chunk.to_vec()));
            if self.rerequest {
                self.request(1);
            }
        }

        fn on_error(&self, error: TransportError) {
            self.signals
                .lock()
                .unwrap()
                .push(Signal::Error(error.to_string()));
        }

        fn on_complete(&self) {
            self.signals.lock().unwrap().push(Signal::Complete);
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from_static(p)).collect()
    }

    #[test]
    fn nothing_is_delivered_without_demand() {
        let publisher = PullPublisher::from_chunks(chunks(&[b"a", b"b"]));
        let recorder = Recorder::new(false);
        publisher.subscribe(recorder.clone()).unwrap();

        assert!(recorder.signals().is_empty());
    }

    #[test]
    fn delivers_exactly_the_requested_number_of_chunks() {
        let publisher = PullPublisher::from_chunks(chunks(&[b"a", b"b", b"c"]));
        let recorder = Recorder::new(false);
        publisher.subscribe(recorder.clone()).unwrap();

        recorder.request(2);
        assert_eq!(
            recorder.signals(),
            vec![Signal::Next(b"a".to_vec()), Signal::Next(b"b".to_vec())]
        );

        recorder.request(5);
        assert_eq!(
            recorder.signals(),
            vec![Signal::Next(b"c".to_vec()), Signal::Complete]
        );
    }

    #[test]
    fn reentrant_request_does_not_recurse() {
        let many: Vec<Bytes> = (0..10_000u32)
            .map(|i| Bytes::from(i.to_be_bytes().to_vec()))
            .collect();
        let publisher = PullPublisher::from_chunks(many);
        let recorder = Recorder::new(true);
        publisher.subscribe(recorder.clone()).unwrap();

        recorder.request(1);
        let signals = recorder.signals();
        assert_eq!(signals.len(), 10_001);
        assert_eq!(signals.last(), Some(&Signal::Complete));
    }

    #[test]
    fn second_subscriber_is_rejected() {
        let publisher = PullPublisher::from_chunks(chunks(&[b"a"]));
        publisher.subscribe(Recorder::new(false)).unwrap();

        let err = publisher.subscribe(Recorder::new(false)).unwrap_err();
        assert!(matches!(err, TransportError::AlreadySubscribed));
    }

    #[test]
    fn cancel_stops_delivery_and_terminal_signals() {
        let publisher = PullPublisher::from_chunks(chunks(&[b"a", b"b"]));
        let recorder = Recorder::new(false);
        publisher.subscribe(recorder.clone()).unwrap();

        recorder.request(1);
        recorder.cancel();
        recorder.request(10);

        assert_eq!(recorder.signals(), vec![Signal::Next(b"a".to_vec())]);
    }

    #[test]
    fn read_failure_is_signalled_once() {
        struct Broken;
        impl std::io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("boom"))
            }
        }

        let publisher = PullPublisher::from_reader(Broken);
        let recorder = Recorder::new(false);
        publisher.subscribe(recorder.clone()).unwrap();

        recorder.request(3);
        recorder.request(3);
        assert_eq!(
            recorder.signals(),
            vec![Signal::Error("transport I/O error: boom".to_string())]
        );
    }

    #[test]
    fn reader_chunks_follow_config() {
        let publisher = PullPublisher::from_reader_with_config(
            Cursor::new(b"hello".to_vec()),
            SourceConfig { chunk_size: 2 },
        );
        let recorder = Recorder::new(true);
        publisher.subscribe(recorder.clone()).unwrap();

        recorder.request(1);
        assert_eq!(
            recorder.signals(),
            vec![
                Signal::Next(b"he".to_vec()),
                Signal::Next(b"ll".to_vec()),
                Signal::Next(b"o".to_vec()),
                Signal::Complete,
            ]
        );
    }
}
