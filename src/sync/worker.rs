// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sync Worker
//!
//! Background task that drains the offline queue. A drain is triggered by:
//!
//! 1. connectivity coming back (offline → online edge),
//! 2. something being enqueued,
//! 3. the periodic tick (default 30 s), which picks up backoff expiries.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. A drain
//! in progress finishes its current entry before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SyncEngine;

/// Default interval between periodic drains.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl SyncWorker {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the worker loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Sync worker starting");

        let mut connectivity = self.engine.connectivity().subscribe();
        let work_available = self.engine.work_available();

        loop {
            if shutdown.is_cancelled() {
                info!("Sync worker shutting down");
                return;
            }

            self.drain_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = work_available.notified() => {
                    debug!("Sync worker: work available");
                },
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        warn!("Sync worker: connectivity channel closed");
                        return;
                    }
                    let online = *connectivity.borrow_and_update();
                    info!(online, "Sync worker: connectivity changed");
                    if !online {
                        continue;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Sync worker shutting down");
                    return;
                }
            }
        }
    }

    async fn drain_step(&self) {
        match self.engine.drain().await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => {
                debug!(total = report.total(), "Sync worker: drain complete");
            }
            Err(e) => {
                warn!(error = %e, "Sync worker: drain failed");
            }
        }
    }
}
