//! Shutdown coordination.
//!
//! One trigger - from a process signal, an acceptor failure, or any other
//! supervised component - must produce exactly one full teardown. The
//! trigger side is a clonable [`ShutdownHandle`] whose `request()` is
//! idempotent and callable from any task; multiple triggers coalesce into a
//! single wake-up. The teardown side is [`ShutdownCoordinator::run`], which
//! consumes the coordinator so the registry teardown cannot run twice.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::sessions::SessionRegistry;

/// Clonable shutdown trigger.
///
/// Safe to call from any concurrent context; the first `request` wins and
/// every later one is a no-op.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Request full shutdown.
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Check whether shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}

/// Single entry point guaranteeing "one trigger, one full teardown".
pub struct ShutdownCoordinator {
    /// Root cancellation token for the whole process.
    token: CancellationToken,
    /// Registry torn down on the first trigger.
    registry: Arc<SessionRegistry>,
}

impl ShutdownCoordinator {
    /// Create a coordinator owning the root cancellation token.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
        }
    }

    /// Get a trigger handle.
    #[must_use]
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.token.clone(),
        }
    }

    /// Child token for components that should observe shutdown (the
    /// acceptor, and through it every session).
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Wait for the first shutdown trigger, then tear down every session.
    ///
    /// Consuming `self` makes repeat teardown unrepresentable: whoever
    /// drives the coordinator can only run it once, regardless of how many
    /// triggers race.
    #[instrument(skip_all, name = "relay.shutdown")]
    pub async fn run(self) {
        self.token.cancelled().await;

        info!(target: "relay.shutdown", "Shutdown requested, closing all sessions");
        self.registry.close_all().await;
        info!(target: "relay.shutdown", "Shutdown complete");
    }
}
