use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, FlowError};

/// Receiver of typed events.
///
/// At most one subscriber is attached per stream. Nothing is delivered until
/// it calls [`EventSubscription::request`].
pub trait EventSubscriber<E>: Send + Sync {
    /// Called once, before any event, with the demand handle.
    fn on_subscribe(&self, subscription: EventSubscription);

    /// One event. An error fails the whole stream as a client error.
    fn on_next(&self, event: E) -> Result<(), BoxError>;

    /// The stream failed. Errors returned here are logged and discarded.
    fn on_error(&self, _error: &FlowError) -> Result<(), BoxError> {
        Ok(())
    }

    /// The stream finished. Errors returned here are logged and discarded.
    fn on_complete(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

pub(crate) trait DemandControl: Send + Sync {
    fn request(&self, n: u64);
    fn cancel(&self);
}

/// Demand handle handed to an [`EventSubscriber`].
#[derive(Clone)]
pub struct EventSubscription {
    control: Arc<dyn DemandControl>,
}

impl EventSubscription {
    pub(crate) fn new(control: Arc<dyn DemandControl>) -> Self {
        Self { control }
    }

    /// Ask for `n` more events. `request(0)` is ignored; `u64::MAX` is unbounded.
    pub fn request(&self, n: u64) {
        self.control.request(n);
    }

    /// Stop the stream.
    ///
    /// Best effort: events of a chunk that is already being decoded may
    /// still arrive, but no further chunks are pulled.
    pub fn cancel(&self) {
        self.control.cancel();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription").finish_non_exhaustive()
    }
}
