// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride-Rewards API Server
//!
//! Enrolls Lyft riders and credits loyalty points for their completed rides
//! each time the poll endpoint is triggered.

use ride_rewards::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryStore, RewardLedger, UserDirectory},
    services::LyftClient,
    AppState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        workers = config.poll_workers,
        storage = ?config.storage_backend,
        "Starting Ride-Rewards API"
    );

    let (directory, ledger): (Arc<dyn UserDirectory>, Arc<dyn RewardLedger>) =
        match config.storage_backend {
            StorageBackend::Firestore => {
                let db = Arc::new(
                    FirestoreDb::new(&config.gcp_project_id)
                        .await
                        .expect("Failed to connect to Firestore"),
                );
                (db.clone(), db)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let lyft = LyftClient::new(
        config.lyft_client_id.clone(),
        config.lyft_client_secret.clone(),
        config.lyft_api_base.clone(),
        config.provider_timeout,
    )
    .expect("Failed to build Lyft client");

    let provider = Arc::new(lyft.clone());
    let state = Arc::new(AppState::new(
        config.clone(),
        directory,
        ledger,
        lyft,
        provider,
    ));
    let shutdown = state.shutdown.clone();

    // Build router
    let app = ride_rewards::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, cancelling any running poll cycle.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling in-flight work");
    shutdown.cancel();
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ride_rewards=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
