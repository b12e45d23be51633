//! Session metrics.
//!
//! Shared atomic counters updated by the acceptor, the registry, and the
//! per-session tasks. These are in-process counters surfaced through logs;
//! exporting them to an external sink is a deployment concern, not handled
//! here.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Aggregated metrics for the session subsystem.
///
/// All fields are atomic for lock-free concurrent access.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Sessions currently alive.
    active_sessions: AtomicUsize,
    /// Total sessions accepted since startup.
    total_sessions: AtomicU64,
    /// Frames written back to a peer.
    frames_relayed: AtomicU64,
    /// Frames dropped (partial frame at EOF, or in flight at teardown).
    frames_dropped: AtomicU64,
    /// Read errors observed by reader tasks.
    read_errors: AtomicU64,
    /// Write errors observed by writer tasks.
    write_errors: AtomicU64,
    /// Session tasks that panicked (indicates bugs).
    session_panics: AtomicU64,
}

/// Snapshot of session metrics at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct SessionMetricsSnapshot {
    /// Sessions currently alive.
    pub active_sessions: usize,
    /// Total sessions accepted since startup.
    pub total_sessions: u64,
    /// Frames successfully relayed.
    pub frames_relayed: u64,
    /// Frames dropped.
    pub frames_dropped: u64,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a session being created.
    pub fn session_created(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session being torn down.
    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a frame written back to a peer.
    pub fn record_frame_relayed(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped frame.
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read error.
    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write error.
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session task panic.
    pub fn record_session_panic(&self) {
        self.session_panics.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            target: "relay.session",
            total_panics = self.session_panics.load(Ordering::Relaxed),
            "Session task panic detected - indicates bug, investigation required"
        );
    }

    /// Get the current active session count.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total accepted session count.
    #[must_use]
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    /// Get the relayed frame count.
    #[must_use]
    pub fn frames_relayed(&self) -> u64 {
        self.frames_relayed.load(Ordering::Relaxed)
    }

    /// Get the dropped frame count.
    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Get the read error count.
    #[must_use]
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    /// Get the write error count.
    #[must_use]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    /// Get the session panic count.
    #[must_use]
    pub fn session_panics(&self) -> u64 {
        self.session_panics.load(Ordering::Relaxed)
    }

    /// Take a snapshot of the headline counters.
    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle_counters() {
        let metrics = SessionMetrics::new();

        metrics.session_created();
        metrics.session_created();
        assert_eq!(metrics.active_sessions(), 2);
        assert_eq!(metrics.total_sessions(), 2);

        metrics.session_closed();
        assert_eq!(metrics.active_sessions(), 1);
        // Total is monotonic
        assert_eq!(metrics.total_sessions(), 2);
    }

    #[test]
    fn test_frame_counters() {
        let metrics = SessionMetrics::new();

        metrics.record_frame_relayed();
        metrics.record_frame_relayed();
        metrics.record_frame_dropped();

        assert_eq!(metrics.frames_relayed(), 2);
        assert_eq!(metrics.frames_dropped(), 1);
    }

    #[test]
    fn test_snapshot_consistency() {
        let metrics = SessionMetrics::new();

        metrics.session_created();
        metrics.record_frame_relayed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.total_sessions, 1);
        assert_eq!(snapshot.frames_relayed, 1);
        assert_eq!(snapshot.frames_dropped, 0);
    }

    #[test]
    fn test_error_counters() {
        let metrics = SessionMetrics::new();

        metrics.record_read_error();
        metrics.record_write_error();
        metrics.record_write_error();

        assert_eq!(metrics.read_errors(), 1);
        assert_eq!(metrics.write_errors(), 2);
    }
}
