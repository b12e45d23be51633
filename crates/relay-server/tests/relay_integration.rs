//! End-to-end tests for the relay stack.
//!
//! Drives a real loopback listener through the full wiring used by the
//! binary (acceptor + registry + shutdown coordinator) and verifies:
//! - Echo fidelity and per-session frame ordering
//! - Identifier allocation across accepted connections
//! - Coordinated shutdown: every peer observes closure, registry drains,
//!   the acceptor exits cleanly
//! - Session-local failures stay session-local

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_server::acceptor::Acceptor;
use relay_server::errors::RelayError;
use relay_server::sessions::{EchoPolicy, SessionMetrics, SessionRegistry};
use relay_server::shutdown::{ShutdownCoordinator, ShutdownHandle};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

// ============================================================================
// Harness
// ============================================================================

struct TestRelay {
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    metrics: Arc<SessionMetrics>,
    shutdown: ShutdownHandle,
    coordinator_task: JoinHandle<()>,
    acceptor_task: JoinHandle<Result<(), RelayError>>,
}

/// Start the full relay wiring the binary uses, on an ephemeral port.
async fn start_relay() -> TestRelay {
    let metrics = SessionMetrics::new();
    let registry = Arc::new(SessionRegistry::new(
        Duration::from_secs(1),
        Arc::clone(&metrics),
    ));
    let coordinator = ShutdownCoordinator::new(Arc::clone(&registry));
    let shutdown = coordinator.handle();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let acceptor = Acceptor::new(
        listener,
        Arc::clone(&registry),
        Arc::new(EchoPolicy),
        64,
        Arc::clone(&metrics),
        coordinator.child_token(),
    );
    let addr = acceptor.local_addr().unwrap();

    let acceptor_task = tokio::spawn(acceptor.run());
    let coordinator_task = tokio::spawn(coordinator.run());

    TestRelay {
        addr,
        registry,
        metrics,
        shutdown,
        coordinator_task,
        acceptor_task,
    }
}

async fn wait_for_session_count(registry: &SessionRegistry, count: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while registry.len().await != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry should reach expected session count");
}

async fn read_frame(reader: &mut BufReader<TcpStream>) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), reader.read_until(b'\n', &mut buf))
        .await
        .expect("frame should arrive within a second")
        .unwrap();
    buf
}

async fn assert_peer_sees_eof(client: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
        .await
        .expect("closure should be observed within a second")
        .unwrap();
    assert_eq!(n, 0);
}

// ============================================================================
// Echo semantics
// ============================================================================

#[tokio::test]
async fn test_echoes_hello_frame() {
    let relay = start_relay().await;

    let client = TcpStream::connect(relay.addr).await.unwrap();
    let mut reader = BufReader::new(client);

    reader.get_mut().write_all(b"hello\n").await.unwrap();
    assert_eq!(read_frame(&mut reader).await, b"hello\n");

    relay.shutdown.request();
}

#[tokio::test]
async fn test_frames_echoed_in_order_per_session() {
    let relay = start_relay().await;

    let client = TcpStream::connect(relay.addr).await.unwrap();
    let mut reader = BufReader::new(client);

    for i in 0..20 {
        let frame = format!("frame-{i}\n");
        reader.get_mut().write_all(frame.as_bytes()).await.unwrap();
    }
    for i in 0..20 {
        let expected = format!("frame-{i}\n");
        assert_eq!(read_frame(&mut reader).await, expected.as_bytes());
    }

    relay.shutdown.request();
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let relay = start_relay().await;

    let client_a = TcpStream::connect(relay.addr).await.unwrap();
    let client_b = TcpStream::connect(relay.addr).await.unwrap();
    wait_for_session_count(&relay.registry, 2).await;

    let mut reader_b = BufReader::new(client_b);

    // Dropping one peer must not affect the other session
    drop(client_a);
    wait_for_session_count(&relay.registry, 1).await;

    reader_b.get_mut().write_all(b"still-here\n").await.unwrap();
    assert_eq!(read_frame(&mut reader_b).await, b"still-here\n");

    relay.shutdown.request();
}

// ============================================================================
// Identifier allocation
// ============================================================================

#[tokio::test]
async fn test_identifiers_distinct_and_increasing() {
    let relay = start_relay().await;

    let mut clients = Vec::new();
    for n in 0..5 {
        clients.push(TcpStream::connect(relay.addr).await.unwrap());
        wait_for_session_count(&relay.registry, n + 1).await;
    }

    let mut ids = relay.registry.session_ids().await;
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(relay.metrics.total_sessions(), 5);

    relay.shutdown.request();
}

// ============================================================================
// Coordinated shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    let relay = start_relay().await;

    let mut clients = Vec::new();
    for n in 0..3 {
        clients.push(TcpStream::connect(relay.addr).await.unwrap());
        wait_for_session_count(&relay.registry, n + 1).await;
    }

    relay.shutdown.request();

    tokio::time::timeout(Duration::from_secs(2), relay.coordinator_task)
        .await
        .expect("coordinator should finish within two seconds")
        .unwrap();

    // Registry drained, every peer observes closure
    assert!(relay.registry.is_empty().await);
    for client in &mut clients {
        assert_peer_sees_eof(client).await;
    }

    // Acceptor exited cleanly through its cancellation arm
    let acceptor_result = tokio::time::timeout(Duration::from_secs(1), relay.acceptor_task)
        .await
        .expect("acceptor should exit within a second")
        .unwrap();
    assert!(acceptor_result.is_ok());
}

#[tokio::test]
async fn test_concurrent_triggers_coalesce() {
    let relay = start_relay().await;

    let _client = TcpStream::connect(relay.addr).await.unwrap();
    wait_for_session_count(&relay.registry, 1).await;

    let mut triggers = Vec::new();
    for _ in 0..8 {
        let shutdown = relay.shutdown.clone();
        triggers.push(tokio::spawn(async move { shutdown.request() }));
    }
    for trigger in triggers {
        trigger.await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(2), relay.coordinator_task)
        .await
        .expect("coordinator should finish within two seconds")
        .unwrap();
    assert!(relay.registry.is_empty().await);
}

#[tokio::test]
async fn test_shutdown_with_no_sessions() {
    let relay = start_relay().await;

    relay.shutdown.request();

    tokio::time::timeout(Duration::from_secs(1), relay.coordinator_task)
        .await
        .expect("coordinator should finish within a second")
        .unwrap();
    assert!(relay.registry.is_empty().await);
}

#[tokio::test]
async fn test_frames_before_shutdown_are_echoed() {
    let relay = start_relay().await;

    let client = TcpStream::connect(relay.addr).await.unwrap();
    let mut reader = BufReader::new(client);

    reader.get_mut().write_all(b"before\n").await.unwrap();
    assert_eq!(read_frame(&mut reader).await, b"before\n");

    relay.shutdown.request();
    tokio::time::timeout(Duration::from_secs(2), relay.coordinator_task)
        .await
        .expect("coordinator should finish within two seconds")
        .unwrap();

    assert_peer_sees_eof(reader.get_mut()).await;
}
