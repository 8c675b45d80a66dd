// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    currency::Currency,
    error::{ApiError, ErrorBody},
    models::{Donation, DonationInput},
    service::Quote,
    state::AppState,
    storage::AuditEntry,
};

#[utoipa::path(
    post,
    path = "/v1/donations",
    request_body = DonationInput,
    tag = "Donations",
    responses(
        (status = 201, description = "Donation accepted (completed, queued or abandoned)", body = Donation),
        (status = 409, description = "Same id already in flight or stored", body = ErrorBody),
        (status = 422, description = "Validation or routing failed", body = ErrorBody)
    )
)]
pub async fn submit_donation(
    State(state): State<AppState>,
    Json(input): Json<DonationInput>,
) -> Result<(StatusCode, Json<Donation>), ApiError> {
    let donation = state.service.submit_donation(input).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

#[utoipa::path(
    get,
    path = "/v1/donations/{donation_id}",
    params(("donation_id" = String, Path, description = "Client-generated donation id")),
    tag = "Donations",
    responses(
        (status = 200, body = Donation),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn get_donation(
    Path(donation_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(state.service.get_donation(&donation_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/donations/{donation_id}/audit",
    params(("donation_id" = String, Path, description = "Client-generated donation id")),
    tag = "Donations",
    responses(
        (status = 200, body = [AuditEntry]),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn get_audit_trail(
    Path(donation_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let donation = state.service.get_donation(&donation_id)?;
    Ok(Json(donation.audit_trail.entries().to_vec()))
}

#[utoipa::path(
    post,
    path = "/v1/donations/{donation_id}/cancel",
    params(("donation_id" = String, Path, description = "Client-generated donation id")),
    tag = "Donations",
    responses(
        (status = 200, body = Donation),
        (status = 404, body = ErrorBody),
        (status = 409, description = "Already submitted to a gateway", body = ErrorBody)
    )
)]
pub async fn cancel_donation(
    Path(donation_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Donation>, ApiError> {
    Ok(Json(state.service.cancel_donation(&donation_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/donations/attention",
    tag = "Donations",
    responses((status = 200, description = "Abandoned donations and sync conflicts", body = [Donation]))
)]
pub async fn list_attention_required(
    State(state): State<AppState>,
) -> Result<Json<Vec<Donation>>, ApiError> {
    Ok(Json(state.service.list_attention_required()?))
}

#[derive(Deserialize, IntoParams)]
pub struct QuoteQuery {
    /// Amount in major units, e.g. `180.00`.
    #[param(value_type = String)]
    pub amount: Decimal,
    /// ISO 4217 code, case-insensitive.
    pub currency: String,
}

#[utoipa::path(
    get,
    path = "/v1/quote",
    params(QuoteQuery),
    tag = "Currency",
    responses(
        (status = 200, body = Quote),
        (status = 400, body = ErrorBody),
        (status = 503, description = "Exchange rates unavailable", body = ErrorBody)
    )
)]
pub async fn quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteQuery>,
) -> Result<Json<Quote>, ApiError> {
    let currency: Currency = params
        .currency
        .parse()
        .map_err(|e: crate::currency::UnknownCurrency| ApiError::bad_request(e.to_string()))?;
    Ok(Json(state.service.quote(params.amount, currency).await?))
}
