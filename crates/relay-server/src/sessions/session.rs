//! Per-connection session: reader/writer tasks joined by a bounded queue.
//!
//! Each session:
//! - Owns exactly one TCP connection, split into owned read/write halves
//! - Runs a reader task (socket -> frame policy -> outbound queue) and a
//!   writer task (outbound queue -> socket) as independent tokio tasks
//! - Tears down exactly once via an idempotent [`SessionHandle::stop`]
//!
//! # Lifecycle
//!
//! 1. Created by the acceptor when a connection is accepted
//! 2. Runs until the peer disconnects, an I/O error occurs, or `stop()` is
//!    invoked (directly or through registry-wide teardown)
//! 3. Either task exiting stops the whole session; the supervisor task joins
//!    both and performs final accounting
//!
//! Frames are opaque byte sequences terminated by `\n`, delimiter included.
//! Any I/O error is terminal for this session only; it is never retried and
//! never escalates beyond the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::metrics::SessionMetrics;
use super::{FramePolicy, SessionId};
use crate::errors::RelayError;

/// Handle to a running session.
///
/// Cheap to clone; shared between the session's own tasks, the registry,
/// and any caller that wants to enqueue outbound frames or stop the session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<Bytes>,
    cancel_token: CancellationToken,
    stopped: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stop the session.
    ///
    /// Idempotent under arbitrary concurrent invocation: exactly one caller
    /// raises the cancellation signal, every other call is a no-op. After
    /// this returns, both session tasks observe cancellation at their next
    /// blocking point and exit; no frame is written to the connection once
    /// the writer has observed the signal.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "relay.session", session_id = self.id, "Stopping session");
        self.cancel_token.cancel();
    }

    /// Check whether the session has been stopped (or cancelled through a
    /// parent token).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Enqueue a frame on the session's outbound queue.
    ///
    /// This is the external hand-off point: non-echo policies and tests can
    /// schedule frames for a peer without touching the session internals.
    /// Blocks while the queue is full; fails once the session is stopped.
    pub async fn enqueue(&self, frame: Bytes) -> Result<(), RelayError> {
        tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => Err(RelayError::SessionClosed),
            result = self.outbound.send(frame) => {
                result.map_err(|_| RelayError::SessionClosed)
            }
        }
    }
}

/// A managed session wrapping one accepted TCP connection.
pub struct Session {
    /// Session ID, assigned at accept time.
    id: SessionId,
    /// The owned connection.
    stream: TcpStream,
    /// Frame hand-off policy.
    policy: Arc<dyn FramePolicy>,
    /// Outbound queue capacity.
    queue_capacity: usize,
    /// Shared metrics.
    metrics: Arc<SessionMetrics>,
    /// Cancellation token (child of the acceptor's token).
    cancel_token: CancellationToken,
}

impl Session {
    /// Create a new session (not started).
    #[must_use]
    pub fn new(
        id: SessionId,
        stream: TcpStream,
        policy: Arc<dyn FramePolicy>,
        queue_capacity: usize,
        metrics: Arc<SessionMetrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            stream,
            policy,
            queue_capacity,
            metrics,
            cancel_token,
        }
    }

    /// Start the session: spawn the reader and writer tasks.
    ///
    /// Returns a handle and the join handle of a supervisor task that
    /// completes once both units have exited. Failures surface later via
    /// unit exit, never from `start` itself.
    #[must_use]
    pub fn start(self) -> (SessionHandle, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queue_capacity.max(1));
        let (read_half, write_half) = self.stream.into_split();

        let handle = SessionHandle {
            id: self.id,
            outbound: outbound_tx,
            cancel_token: self.cancel_token,
            stopped: Arc::new(AtomicBool::new(false)),
        };

        self.metrics.session_created();

        let reader = ReaderUnit {
            id: self.id,
            read_half,
            policy: self.policy,
            handle: handle.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        let writer = WriterUnit {
            id: self.id,
            write_half,
            inbound: outbound_rx,
            handle: handle.clone(),
            metrics: Arc::clone(&self.metrics),
        };

        let reader_task = tokio::spawn(reader.run());
        let writer_task = tokio::spawn(writer.run());

        let id = self.id;
        let metrics = self.metrics;
        let task = tokio::spawn(async move {
            let (read_join, write_join) = tokio::join!(reader_task, writer_task);
            for join in [read_join, write_join] {
                if let Err(e) = join {
                    if e.is_panic() {
                        metrics.record_session_panic();
                    }
                }
            }
            metrics.session_closed();
            info!(target: "relay.session", session_id = id, "Session stopped");
        });

        (handle, task)
    }
}

/// Reader unit: reads delimited frames and hands them to the frame policy.
struct ReaderUnit {
    id: SessionId,
    read_half: OwnedReadHalf,
    policy: Arc<dyn FramePolicy>,
    handle: SessionHandle,
    metrics: Arc<SessionMetrics>,
}

impl ReaderUnit {
    #[instrument(skip_all, name = "relay.session.reader", fields(session_id = self.id))]
    async fn run(self) {
        debug!(target: "relay.session", session_id = self.id, "Reader task started");

        let mut reader = BufReader::new(self.read_half);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                () = self.handle.cancel_token.cancelled() => break,
                result = reader.read_until(b'\n', &mut buf) => result,
            };

            match read {
                Ok(0) => {
                    debug!(target: "relay.session", session_id = self.id, "Peer closed connection");
                    break;
                }
                Ok(_) => {
                    if buf.last() != Some(&b'\n') {
                        // Partial frame at EOF; the next read reports 0.
                        self.metrics.record_frame_dropped();
                        debug!(
                            target: "relay.session",
                            session_id = self.id,
                            len = buf.len(),
                            "Discarding partial frame without delimiter"
                        );
                        continue;
                    }

                    let frame = Bytes::copy_from_slice(&buf);
                    let Some(out) = self.policy.on_frame(self.id, frame) else {
                        continue;
                    };

                    // Enqueue raced against cancellation: a full queue stalls
                    // the reader, never the teardown, and no frame is enqueued
                    // once cancellation is observed.
                    let enqueued = tokio::select! {
                        biased;
                        () = self.handle.cancel_token.cancelled() => false,
                        result = self.handle.outbound.send(out) => result.is_ok(),
                    };
                    if !enqueued {
                        self.metrics.record_frame_dropped();
                        break;
                    }
                }
                Err(e) => {
                    self.metrics.record_read_error();
                    debug!(target: "relay.session", session_id = self.id, error = %e, "Read error");
                    break;
                }
            }
        }

        // Reader exit tears down the whole session.
        self.handle.stop();
        debug!(target: "relay.session", session_id = self.id, "Reader task stopped");
    }
}

/// Writer unit: drains the outbound queue onto the socket.
struct WriterUnit {
    id: SessionId,
    write_half: OwnedWriteHalf,
    inbound: mpsc::Receiver<Bytes>,
    handle: SessionHandle,
    metrics: Arc<SessionMetrics>,
}

impl WriterUnit {
    #[instrument(skip_all, name = "relay.session.writer", fields(session_id = self.id))]
    async fn run(mut self) {
        debug!(target: "relay.session", session_id = self.id, "Writer task started");

        loop {
            let frame = tokio::select! {
                biased;
                () = self.handle.cancel_token.cancelled() => break,
                maybe = self.inbound.recv() => match maybe {
                    Some(frame) => frame,
                    None => break,
                },
            };

            // The write is raced against cancellation so a stalled peer
            // cannot delay teardown. A frame cut off here is acceptable
            // loss on shutdown.
            let write = tokio::select! {
                biased;
                () = self.handle.cancel_token.cancelled() => None,
                result = self.write_half.write_all(&frame) => Some(result),
            };

            match write {
                Some(Ok(())) => {
                    self.metrics.record_frame_relayed();
                }
                Some(Err(e)) => {
                    self.metrics.record_write_error();
                    warn!(target: "relay.session", session_id = self.id, error = %e, "Write error");
                    break;
                }
                None => {
                    self.metrics.record_frame_dropped();
                    break;
                }
            }
        }

        // Graceful FIN; the connection is fully closed once both halves drop.
        if let Err(e) = self.write_half.shutdown().await {
            debug!(target: "relay.session", session_id = self.id, error = %e, "Socket shutdown error");
        }

        // A write failure tears down the whole session, not just this task.
        self.handle.stop();
        debug!(target: "relay.session", session_id = self.id, "Writer task stopped");
    }
}
