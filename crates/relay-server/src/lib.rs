//! Line Relay server library.
//!
//! This library provides the core functionality for Line Relay - a TCP
//! session server responsible for:
//!
//! - Accepting inbound stream connections and wrapping each in a managed session
//! - Running independent reader/writer tasks per session, joined by a bounded
//!   outbound frame queue
//! - Pluggable frame hand-off (echo by default) without touching the
//!   concurrency skeleton
//! - Coordinated, race-free teardown of one session or all sessions at once
//!
//! # Architecture
//!
//! ```text
//! Acceptor (one per listener)
//! ├── allocates strictly increasing session ids
//! └── registers sessions with the SessionRegistry
//!     └── Session (one per accepted connection)
//!         ├── reader task: socket -> frame policy -> outbound queue
//!         └── writer task: outbound queue -> socket
//! ShutdownCoordinator
//! └── first trigger wins -> SessionRegistry::close_all() exactly once
//! ```
//!
//! # Key Design Decisions
//!
//! - **Idempotent stop**: a session's `stop()` is gated by a single-fire
//!   atomic flag and is safe under concurrent invocation from its own
//!   teardown paths and from registry-wide teardown.
//! - **Cooperative cancellation**: every blocking point sits in a `select!`
//!   arm against the session's `CancellationToken`, so teardown is observed
//!   promptly without forced preemption.
//! - **Bounded queue, blocking producer**: a full outbound queue stalls the
//!   reader; the enqueue is raced against cancellation so shutdown never
//!   waits on queue capacity.
//! - **No global registry**: the registry is constructor-injected into the
//!   acceptor and the shutdown coordinator.
//!
//! # Modules
//!
//! - [`sessions`] - Session lifecycle, registry, and frame policies
//! - [`acceptor`] - Accept loop turning connections into sessions
//! - [`shutdown`] - Shutdown coordination primitives
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types

pub mod acceptor;
pub mod config;
pub mod errors;
pub mod sessions;
pub mod shutdown;
