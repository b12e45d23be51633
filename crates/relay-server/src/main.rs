//! Line Relay
//!
//! TCP session server: every accepted connection gets a managed session with
//! independent reader/writer tasks joined by a bounded outbound queue; the
//! default frame policy echoes each newline-delimited frame back to its peer.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Build metrics, registry, and shutdown coordinator
//! 3. Bind the TCP listener (fail fast on bind errors)
//! 4. Spawn the acceptor and its failure watcher
//! 5. Spawn the signal watcher (Ctrl+C / SIGTERM)
//! 6. Wait for the first shutdown trigger, then tear down every session
//!
//! # Shutdown
//!
//! All triggers converge on the `ShutdownCoordinator`: the first one wins,
//! later ones coalesce. Teardown cancels the acceptor (child token), stops
//! every session exactly once through the registry, and bounds each
//! session's drain with the configured timeout.

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use relay_server::acceptor::Acceptor;
use relay_server::config::Config;
use relay_server::sessions::{EchoPolicy, SessionMetrics, SessionRegistry};
use relay_server::shutdown::ShutdownCoordinator;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Line Relay");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        relay_id = %config.relay_id,
        bind_address = %config.bind_address,
        outbound_queue_capacity = config.outbound_queue_capacity,
        drain_timeout_seconds = config.drain_timeout_seconds,
        "Configuration loaded successfully"
    );

    let metrics = SessionMetrics::new();
    let registry = Arc::new(SessionRegistry::new(
        Duration::from_secs(config.drain_timeout_seconds),
        Arc::clone(&metrics),
    ));
    let coordinator = ShutdownCoordinator::new(Arc::clone(&registry));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %config.bind_address, "Failed to bind listener");
            e
        })?;
    info!(addr = %config.bind_address, "Listener bound successfully");

    let acceptor = Acceptor::new(
        listener,
        Arc::clone(&registry),
        Arc::new(EchoPolicy),
        config.outbound_queue_capacity,
        Arc::clone(&metrics),
        coordinator.child_token(),
    );

    // Acceptor failure is a full-system shutdown trigger
    let acceptor_shutdown = coordinator.handle();
    let acceptor_task = tokio::spawn(acceptor.run());
    tokio::spawn(async move {
        match acceptor_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Acceptor failed");
                acceptor_shutdown.request();
            }
            Err(e) => {
                error!(error = ?e, "Acceptor task panicked");
                acceptor_shutdown.request();
            }
        }
    });

    // Process signals are another shutdown trigger; the first one wins
    let signal_shutdown = coordinator.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, initiating graceful shutdown...");
        signal_shutdown.request();
    });

    info!("Line Relay running - press Ctrl+C to shutdown");

    // Wait for the first trigger, then tear down every session exactly once
    coordinator.run().await;

    let snapshot = metrics.snapshot();
    info!(
        total_sessions = snapshot.total_sessions,
        frames_relayed = snapshot.frames_relayed,
        frames_dropped = snapshot.frames_dropped,
        "Line Relay shutdown complete"
    );

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
