// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    currency::Currency,
    error::ErrorBody,
    lifecycle::DonationStatus,
    models::{
        Donation, DonationInput, Gateway, PaymentMethod, RecurringFrequency, RecurringSchedule,
    },
    service::Quote,
    state::AppState,
    storage::{AuditEntry, AuditEventType},
    sync::DrainReport,
    validation::Violation,
};

pub mod donations;
pub mod health;
pub mod sync;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/donations", post(donations::submit_donation))
        .route("/donations/attention", get(donations::list_attention_required))
        .route("/donations/{donation_id}", get(donations::get_donation))
        .route("/donations/{donation_id}/audit", get(donations::get_audit_trail))
        .route("/donations/{donation_id}/cancel", post(donations::cancel_donation))
        .route("/quote", get(donations::quote))
        .route("/sync", post(sync::retry_sync))
        .route("/connectivity", put(sync::set_connectivity))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        donations::submit_donation,
        donations::get_donation,
        donations::get_audit_trail,
        donations::cancel_donation,
        donations::list_attention_required,
        donations::quote,
        sync::retry_sync,
        sync::set_connectivity,
        health::health
    ),
    components(
        schemas(
            Donation,
            DonationInput,
            DonationStatus,
            Currency,
            Gateway,
            PaymentMethod,
            RecurringFrequency,
            RecurringSchedule,
            AuditEntry,
            AuditEventType,
            DrainReport,
            Quote,
            Violation,
            ErrorBody,
            sync::ConnectivityUpdate,
            sync::ConnectivityStatus,
            health::HealthResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Donations", description = "Donation submission and lookup"),
        (name = "Currency", description = "Conversion and display formatting"),
        (name = "Sync", description = "Offline queue and connectivity"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;

/// State wired with sandbox gateways and an in-memory backend.
#[cfg(test)]
pub(crate) fn test_state(online: bool) -> (tempfile::TempDir, AppState) {
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::currency::StaticRateSource;
    use crate::gateway::{Gateways, ScriptedGateway};
    use crate::state::Collaborators;
    use crate::storage::DonationStore;
    use crate::sync::{Connectivity, InMemoryBackend};
    use crate::validation::AlwaysOpen;

    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(DonationStore::open(&dir.path().join("db.redb")).unwrap());
    let collaborators = Collaborators {
        store,
        gateways: Gateways::new(
            Arc::new(ScriptedGateway::new("gen")),
            Arc::new(ScriptedGateway::new("res")),
        ),
        backend: Arc::new(InMemoryBackend::new()),
        rates: Arc::new(StaticRateSource::reference()),
        compliance: Arc::new(AlwaysOpen),
    };
    let state = AppState::assemble(
        &EngineConfig::default(),
        collaborators,
        Connectivity::new(online),
    );
    (dir, state)
}
