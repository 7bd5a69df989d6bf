//! Pull-based byte chunk transport.
//!
//! A transport hands raw byte chunks to exactly one subscriber, and only as
//! many as that subscriber has requested:
//! - [`ChunkPublisher`] accepts a single [`ChunkSubscriber`]
//! - [`ChunkSubscription`] carries `request(n)` / `cancel()` back upstream
//! - [`PullPublisher`] adapts any [`ChunkSource`] (a reader, an in-memory
//!   chunk list) into a publisher
//!
//! This is the lowest layer of evflow. Decoding happens above it.

pub mod error;
pub mod publisher;
pub mod source;
pub mod traits;

pub use error::{Result, TransportError};
pub use publisher::PullPublisher;
pub use source::{ChunkSource, IterSource, ReadSource, SourceConfig, DEFAULT_CHUNK_SIZE};
pub use traits::{ChunkPublisher, ChunkSubscriber, ChunkSubscription};
