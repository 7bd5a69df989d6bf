use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, TransportError};

/// Upstream control handle given to a [`ChunkSubscriber`].
///
/// Nothing is delivered until the subscriber asks for it.
pub trait ChunkSubscription: Send + Sync {
    /// Ask for `n` more chunks. Demand accumulates across calls.
    fn request(&self, n: u64);

    /// Stop delivery. No chunk or terminal signal follows once observed.
    fn cancel(&self);
}

/// Receiver of byte chunks.
///
/// Every hook takes `&self`: the transport may call it from whatever thread
/// serviced the last `request`.
pub trait ChunkSubscriber: Send + Sync {
    /// Called once, before any other hook, with the upstream control handle.
    fn on_subscribe(&self, subscription: Arc<dyn ChunkSubscription>);

    /// One requested chunk.
    fn on_next(&self, chunk: Bytes);

    /// The transport failed. Terminal.
    fn on_error(&self, error: TransportError);

    /// The transport has no more chunks. Terminal.
    fn on_complete(&self);
}

/// Single-subscriber source of byte chunks.
pub trait ChunkPublisher {
    /// Attach the subscriber and hand it its subscription.
    ///
    /// Returns `Err(TransportError::AlreadySubscribed)` on a second call.
    fn subscribe(&self, subscriber: Arc<dyn ChunkSubscriber>) -> Result<()>;
}

impl<P: ChunkPublisher + ?Sized> ChunkPublisher for Arc<P> {
    fn subscribe(&self, subscriber: Arc<dyn ChunkSubscriber>) -> Result<()> {
        (**self).subscribe(subscriber)
    }
}

impl<P: ChunkPublisher + ?Sized> ChunkPublisher for &P {
    fn subscribe(&self, subscriber: Arc<dyn ChunkSubscriber>) -> Result<()> {
        (**self).subscribe(subscriber)
    }
}
