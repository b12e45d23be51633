//! Acceptor loop: turns inbound connection attempts into running sessions.
//!
//! One acceptor per listener. Each accepted connection gets the next
//! strictly increasing session identifier (starting at 0), a session wrapping
//! the stream, and a registry entry. Accept failure is terminal for the
//! loop - the expected case being the listener going away during shutdown,
//! which instead exits cleanly through the cancellation arm.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::RelayError;
use crate::sessions::{FramePolicy, Session, SessionId, SessionMetrics, SessionRegistry};

/// The accept loop and the session-id allocator.
pub struct Acceptor {
    /// Bound listener.
    listener: TcpListener,
    /// Registry receiving every accepted session.
    registry: Arc<SessionRegistry>,
    /// Frame hand-off policy passed to each session.
    policy: Arc<dyn FramePolicy>,
    /// Outbound queue capacity for each session.
    queue_capacity: usize,
    /// Shared metrics.
    metrics: Arc<SessionMetrics>,
    /// Cancellation token; sessions get child tokens.
    cancel_token: CancellationToken,
    /// Next session identifier.
    next_id: SessionId,
}

impl Acceptor {
    /// Create a new acceptor over a bound listener.
    #[must_use]
    pub fn new(
        listener: TcpListener,
        registry: Arc<SessionRegistry>,
        policy: Arc<dyn FramePolicy>,
        queue_capacity: usize,
        metrics: Arc<SessionMetrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            registry,
            policy,
            queue_capacity,
            metrics,
            cancel_token,
            next_id: 0,
        }
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until cancellation or accept failure.
    ///
    /// Returns `Ok(())` when cancelled (the listener being closed during
    /// shutdown is a clean exit, not an error) and
    /// [`RelayError::Accept`] on an accept failure - terminal either way,
    /// there is no retry policy.
    #[instrument(skip_all, name = "relay.acceptor")]
    pub async fn run(mut self) -> Result<(), RelayError> {
        info!(target: "relay.acceptor", "Acceptor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.acceptor",
                        sessions_accepted = self.next_id,
                        "Acceptor received cancellation signal"
                    );
                    return Ok(());
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.handle_accept(stream, peer_addr).await;
                        }
                        Err(e) => {
                            error!(target: "relay.acceptor", error = %e, "Accept error");
                            return Err(RelayError::Accept(e));
                        }
                    }
                }
            }
        }
    }

    /// Wrap an accepted connection in a session and register it.
    async fn handle_accept(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        let id = self.next_id;
        self.next_id += 1;

        debug!(
            target: "relay.acceptor",
            session_id = id,
            peer = %peer_addr,
            "Connection accepted"
        );

        let session = Session::new(
            id,
            stream,
            Arc::clone(&self.policy),
            self.queue_capacity,
            Arc::clone(&self.metrics),
            self.cancel_token.child_token(),
        );
        let (handle, task) = session.start();

        // Self-removal: once the session's tasks have exited, drop its
        // registry entry so sessions dying on their own I/O failures do not
        // accumulate.
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let _ = task.await;
            registry.discard(id).await;
        });

        if let Err(e) = self.registry.add(handle, task).await {
            // The registry has already stopped the rejected session.
            warn!(
                target: "relay.acceptor",
                session_id = id,
                error = %e,
                "Session rejected"
            );
        }
    }
}
