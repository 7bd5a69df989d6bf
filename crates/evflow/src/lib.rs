//! Demand-driven decoding of event-stream responses.
//!
//! evflow turns a pull-based stream of raw byte chunks into typed events,
//! fetching more bytes only while the consumer has outstanding demand, and
//! resolves every stream to exactly one terminal outcome.
//!
//! # Crate Structure
//!
//! - [`transport`]: pull-based byte chunk publishers and subscribers
//! - [`frame`]: binary message framing with CRC-checked preludes
//! - [`stream`]: classification, unmarshalling, demand and terminal arbitration

/// Re-export transport types.
pub mod transport {
    pub use evflow_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use evflow_frame::*;
}

/// Re-export stream types.
pub mod stream {
    pub use evflow_stream::*;
}
