// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use donation_engine::{
    api::router,
    config::EngineConfig,
    state::{AppState, Collaborators},
    storage::DonationStore,
    sync::{Connectivity, SyncWorker},
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[tokio::main]
async fn main() {
    let config = EngineConfig::from_env().expect("Invalid configuration");
    init_tracing(config.json_logs);

    let store = Arc::new(
        DonationStore::open(&config.database_path()).expect("Failed to open donation database"),
    );
    let collaborators = Collaborators::from_config(&config, Arc::clone(&store))
        .expect("Failed to set up external collaborators");
    let state = AppState::assemble(&config, collaborators, Connectivity::online());

    let recovered = state
        .service
        .recover()
        .expect("Failed to scan donations for recovery");
    info!(recovered, "Donation store ready");

    let shutdown = CancellationToken::new();
    let worker = SyncWorker::new(Arc::clone(state.service.sync_engine()))
        .with_interval(config.sync_interval);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));
    let refresher_handle = tokio::spawn(
        Arc::clone(state.service.converter()).run_refresh(shutdown.clone()),
    );

    let app = router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Donation engine listening (docs at /docs)");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    let _ = tokio::join!(worker_handle, refresher_handle);
    info!("Donation engine stopped");
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
