//! Session registry: the concurrency-safe set of live sessions.
//!
//! A single lock covers insert, iterate, and clear. Bulk teardown marks the
//! registry as draining under that lock, so a registration racing with
//! [`SessionRegistry::close_all`] is either included in the teardown or
//! rejected and stopped - no session outlives a completed `close_all` call.
//!
//! The lock is never held across an await: the drain phase of `close_all`
//! runs on entries already claimed from the map, which keeps session
//! self-removal (`discard`) from deadlocking against teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::metrics::SessionMetrics;
use super::session::SessionHandle;
use super::SessionId;
use crate::errors::RelayError;

/// Internal state for a managed session.
struct ManagedSession {
    /// Handle to the session.
    handle: SessionHandle,
    /// Join handle of the session's supervisor task.
    task_handle: JoinHandle<()>,
    /// Session creation timestamp.
    created_at: i64,
}

/// Registry state guarded by a single lock.
struct RegistryInner {
    sessions: HashMap<SessionId, ManagedSession>,
    /// Set by the first `close_all`; late registrations are rejected.
    draining: bool,
}

/// Concurrency-safe mapping from session identifier to live session,
/// supporting insertion and all-at-once close-and-clear.
///
/// Process-scoped: created once at startup and constructor-injected into
/// the acceptor and the shutdown coordinator.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    /// Per-session wait bound during teardown.
    drain_timeout: Duration,
    /// Shared metrics.
    metrics: Arc<SessionMetrics>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(drain_timeout: Duration, metrics: Arc<SessionMetrics>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                draining: false,
            }),
            drain_timeout,
            metrics,
        }
    }

    /// Register a session.
    ///
    /// If teardown has already begun the session is stopped and rejected
    /// with [`RelayError::Draining`].
    pub async fn add(
        &self,
        handle: SessionHandle,
        task_handle: JoinHandle<()>,
    ) -> Result<(), RelayError> {
        let id = handle.id();
        let mut inner = self.inner.lock().await;

        if inner.draining {
            drop(inner);
            warn!(
                target: "relay.registry",
                session_id = id,
                "Registry is draining, rejecting session"
            );
            handle.stop();
            return Err(RelayError::Draining);
        }

        let created_at = chrono::Utc::now().timestamp();
        if let Some(previous) = inner.sessions.insert(
            id,
            ManagedSession {
                handle,
                task_handle,
                created_at,
            },
        ) {
            // Identifier collision is a precondition violation at the
            // acceptor; stop the stale session rather than leaking it.
            error!(
                target: "relay.registry",
                session_id = id,
                "Duplicate session id registered"
            );
            previous.handle.stop();
        }

        debug!(
            target: "relay.registry",
            session_id = id,
            total_sessions = inner.sessions.len(),
            "Session registered"
        );

        Ok(())
    }

    /// Remove a session that exited on its own. No-op when teardown has
    /// already claimed the entry.
    pub async fn discard(&self, id: SessionId) {
        let mut inner = self.inner.lock().await;
        if inner.sessions.remove(&id).is_some() {
            debug!(
                target: "relay.registry",
                session_id = id,
                total_sessions = inner.sessions.len(),
                "Session discarded"
            );
        }
    }

    /// Stop every live session and clear the registry.
    ///
    /// All cancellations are raised first so sessions tear down
    /// concurrently, then each session task is awaited up to the drain
    /// timeout. Idempotent: a second call observes an empty registry.
    pub async fn close_all(&self) {
        let drained: Vec<(SessionId, ManagedSession)> = {
            let mut inner = self.inner.lock().await;
            inner.draining = true;
            inner.sessions.drain().collect()
        };

        if drained.is_empty() {
            debug!(target: "relay.registry", "No sessions to close");
            return;
        }

        info!(
            target: "relay.registry",
            session_count = drained.len(),
            "Closing all sessions"
        );

        for (id, managed) in &drained {
            debug!(target: "relay.registry", session_id = *id, "Stopping session");
            managed.handle.stop();
        }

        let now = chrono::Utc::now().timestamp();
        for (id, managed) in drained {
            let age_seconds = now - managed.created_at;
            match tokio::time::timeout(self.drain_timeout, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "relay.registry",
                        session_id = id,
                        age_seconds,
                        "Session completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    if e.is_panic() {
                        self.metrics.record_session_panic();
                    }
                    warn!(
                        target: "relay.registry",
                        session_id = id,
                        error = ?e,
                        "Session task failed during teardown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "relay.registry",
                        session_id = id,
                        timeout_ms = self.drain_timeout.as_millis() as u64,
                        "Session teardown timed out"
                    );
                }
            }
        }

        info!(target: "relay.registry", "All sessions closed");
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Whether the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.sessions.is_empty()
    }

    /// Whether teardown has begun.
    pub async fn is_draining(&self) -> bool {
        self.inner.lock().await.draining
    }

    /// Identifiers of all live sessions (unordered).
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.inner.lock().await.sessions.keys().copied().collect()
    }
}
