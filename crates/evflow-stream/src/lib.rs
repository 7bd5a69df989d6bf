//! Demand-driven decoding of event-stream responses.
//!
//! Raw byte chunks from a [`ChunkPublisher`](evflow_transport::ChunkPublisher)
//! are decoded into messages, classified, unmarshalled into typed events and
//! republished to a single [`EventSubscriber`]:
//!
//! ```text
//! transport -> ByteSubscriber -> MessageDecoder -> classify -> unmarshal -> EventSubscriber
//!           <- request(1)     <-------------- demand ---------------------- request(n)
//! ```
//!
//! Chunks are only pulled while the subscriber has outstanding demand, and at
//! most one chunk request is in flight at a time. Every way the stream can
//! end (transport error, transport completion, an error message, a decode or
//! unmarshal failure) goes through one [`TerminalArbiter`]; the first wins and
//! the [`FlowResponseHandler`] sees exactly one terminal call.

pub mod arbiter;
mod consumer;
pub mod demand;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod handler;
pub mod publisher;
pub mod subscriber;
pub mod transformer;
pub mod unmarshal;

#[cfg(feature = "async")]
pub mod stream;

pub use arbiter::{TerminalArbiter, Transition};
pub use demand::Demand;
pub use dispatch::{classify, FrameKind};
pub use driver::{execute, Outcome};
pub use error::{BoxError, FlowError, Result};
pub use handler::FlowResponseHandler;
pub use publisher::EventPublisher;
#[cfg(feature = "async")]
pub use stream::EventStream;
pub use subscriber::{EventSubscriber, EventSubscription};
pub use transformer::{EventStreamTransformer, FlowConfig};
pub use unmarshal::{EventResponse, EventUnmarshaller, JsonEventUnmarshaller, UnmarshalContext};
