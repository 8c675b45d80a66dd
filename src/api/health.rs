// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Embedded database readable.
    pub storage: String,
    /// "online" or "offline" as last reported by the host.
    pub connectivity: String,
    /// "fresh" or "stale". Stale rates only degrade display strings.
    pub exchange_rates: String,
    /// Donations waiting in the offline queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_sync: Option<usize>,
}

/// Health check endpoint handler.
///
/// Returns 200 unless the database cannot be read.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Storage unavailable", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let pending_sync = state.store.queue_len().ok();
    let storage_ok = pending_sync.is_some();

    let response = HealthResponse {
        status: if storage_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            storage: if storage_ok { "ok" } else { "unavailable" }.to_string(),
            connectivity: if state.service.connectivity().is_online() {
                "online"
            } else {
                "offline"
            }
            .to_string(),
            exchange_rates: if state.service.converter().is_stale() {
                "stale"
            } else {
                "fresh"
            }
            .to_string(),
            pending_sync,
        },
    };

    let status = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
