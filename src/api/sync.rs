// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::ApiError, state::AppState, sync::DrainReport};

#[utoipa::path(
    post,
    path = "/v1/sync",
    tag = "Sync",
    responses((status = 200, description = "Outcome of one queue drain", body = DrainReport))
)]
pub async fn retry_sync(State(state): State<AppState>) -> Result<Json<DrainReport>, ApiError> {
    Ok(Json(state.service.retry_sync().await?))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectivityUpdate {
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectivityStatus {
    pub online: bool,
    /// Donations waiting in the offline queue.
    pub pending: usize,
}

/// Report a connectivity change from the host platform.
///
/// Going online wakes the sync worker, which drains the queue.
#[utoipa::path(
    put,
    path = "/v1/connectivity",
    request_body = ConnectivityUpdate,
    tag = "Sync",
    responses((status = 200, body = ConnectivityStatus))
)]
pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(update): Json<ConnectivityUpdate>,
) -> Result<Json<ConnectivityStatus>, ApiError> {
    state.service.connectivity().set_online(update.online);
    Ok(Json(ConnectivityStatus {
        online: update.online,
        pending: state.store.queue_len()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::currency::Currency;
    use crate::models::test_support::input;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn offline_then_online_then_sync() {
        let (_dir, state) = test_state(false);
        let donation = state
            .service
            .submit_donation(input(dec!(100), Currency::Usd))
            .await
            .unwrap();

        let Json(status) = set_connectivity(
            State(state.clone()),
            Json(ConnectivityUpdate { online: true }),
        )
        .await
        .unwrap();
        assert!(status.online);
        assert_eq!(status.pending, 1);

        let Json(report) = retry_sync(State(state)).await.unwrap();
        assert_eq!(report.succeeded, vec![donation.id]);
    }
}
