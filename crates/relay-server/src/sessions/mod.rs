//! Session management for Line Relay.
//!
//! This module implements the per-connection session lifecycle:
//!
//! ```text
//! SessionRegistry (one per process)
//! └── tracks N Sessions
//!     └── Session (one per accepted TCP connection)
//!         ├── reader task: socket -> FramePolicy -> outbound queue
//!         └── writer task: outbound queue -> socket
//! ```
//!
//! # Key Design Decisions
//!
//! - **Two tasks per session**: reader and writer run independently and meet
//!   only at the bounded outbound queue and the cancellation token
//! - **CancellationToken teardown**: every blocking point is raced against
//!   the token, so `stop()` unblocks pending I/O without closing from outside
//! - **Pluggable hand-off**: the [`FramePolicy`] seam decides what a received
//!   frame becomes; the default [`EchoPolicy`] schedules it back to the same
//!   peer
//!
//! # Modules
//!
//! - [`session`] - `Session` spawn, reader/writer tasks, idempotent stop
//! - [`registry`] - Concurrency-safe registry with atomic bulk teardown
//! - [`metrics`] - Shared session metrics counters

pub mod metrics;
pub mod registry;
pub mod session;

// Re-export primary types
pub use metrics::{SessionMetrics, SessionMetricsSnapshot};
pub use registry::SessionRegistry;
pub use session::{Session, SessionHandle};

use bytes::Bytes;

/// Unique, monotonically increasing session identifier, assigned at accept
/// time.
pub type SessionId = u64;

/// Policy deciding what to do with a frame read from the peer.
///
/// The reader task calls [`FramePolicy::on_frame`] for every complete frame.
/// Returning `Some(frame)` schedules that frame on the session's outbound
/// queue; returning `None` consumes the frame without writing anything back.
/// Implementations must be cheap and non-blocking - they run on the reader's
/// hot path.
pub trait FramePolicy: Send + Sync {
    /// Called for each complete frame read from the connection. The frame
    /// includes its trailing delimiter.
    fn on_frame(&self, session_id: SessionId, frame: Bytes) -> Option<Bytes>;
}

/// Echo policy: every frame read is scheduled to be written back to the same
/// peer, delimiter included.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoPolicy;

impl FramePolicy for EchoPolicy {
    fn on_frame(&self, _session_id: SessionId, frame: Bytes) -> Option<Bytes> {
        Some(frame)
    }
}
