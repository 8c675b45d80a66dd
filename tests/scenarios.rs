// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end scenarios through `DonationService` with in-process gateways
//! and backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use donation_engine::config::EngineConfig;
use donation_engine::currency::{Currency, CurrencyRules, StaticRateSource};
use donation_engine::executor::RetryPolicy;
use donation_engine::gateway::{GatewayError, Gateways, ScriptedGateway};
use donation_engine::lifecycle::DonationStatus;
use donation_engine::models::{DonationInput, Gateway, PaymentMethod};
use donation_engine::service::SubmitError;
use donation_engine::state::{AppState, Collaborators};
use donation_engine::storage::{AuditEventType, DonationStore};
use donation_engine::sync::{Connectivity, InMemoryBackend};
use donation_engine::validation::{AlwaysOpen, Violation};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

struct Engine {
    state: AppState,
    general: Arc<ScriptedGateway>,
    restricted: Arc<ScriptedGateway>,
    backend: Arc<InMemoryBackend>,
    connectivity: Connectivity,
}

fn config(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        ..EngineConfig::default()
    }
}

fn engine_at(path: &Path, max_attempts: u32, online: bool, gateway_delay: Duration) -> Engine {
    let store = Arc::new(DonationStore::open(path).unwrap());
    let general = Arc::new(ScriptedGateway::new("gen").with_delay(gateway_delay));
    let restricted = Arc::new(ScriptedGateway::new("res").with_delay(gateway_delay));
    let backend = Arc::new(InMemoryBackend::new());
    let connectivity = Connectivity::new(online);
    let state = AppState::assemble(
        &config(max_attempts),
        Collaborators {
            store,
            gateways: Gateways::new(general.clone(), restricted.clone()),
            backend: backend.clone(),
            rates: Arc::new(StaticRateSource::reference()),
            compliance: Arc::new(AlwaysOpen),
        },
        connectivity.clone(),
    );
    Engine {
        state,
        general,
        restricted,
        backend,
        connectivity,
    }
}

fn engine(dir: &TempDir, max_attempts: u32, online: bool) -> Engine {
    engine_at(&dir.path().join("donations.redb"), max_attempts, online, Duration::ZERO)
}

fn input(amount: Decimal, currency: Currency) -> DonationInput {
    DonationInput {
        id: None,
        amount,
        currency,
        donor_id: "donor-42".to_string(),
        association_id: "assoc-7".to_string(),
        campaign_id: Some("winter-2026".to_string()),
        payment_method: PaymentMethod::Card,
        gateway: None,
        is_anonymous: false,
        is_recurring: false,
        recurring_schedule: None,
        is_unit_donation: false,
    }
}

#[tokio::test]
async fn concurrent_submissions_charge_once() {
    let dir = TempDir::new().unwrap();
    let engine = engine_at(
        &dir.path().join("donations.redb"),
        5,
        true,
        Duration::from_millis(50),
    );
    let mut request = input(dec!(100), Currency::Usd);
    request.id = Some("same-id".to_string());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&engine.state.service);
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            service.submit_donation(request).await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(donation) => {
                assert_eq!(donation.status, DonationStatus::Completed);
                completed += 1;
            }
            Err(SubmitError::AlreadyInFlight(id)) => assert_eq!(id, "same-id"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(completed >= 1);
    assert_eq!(engine.general.charge_count(), 1);
    assert_eq!(engine.state.store.list().unwrap().len(), 1);
}

#[tokio::test]
async fn offline_usd_donation_completes_after_reconnect() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, false);

    let queued = engine
        .state
        .service
        .submit_donation(input(dec!(100), Currency::Usd))
        .await
        .unwrap();
    assert_eq!(queued.status, DonationStatus::PendingSync);
    assert_eq!(engine.general.call_count(), 0);

    engine.connectivity.set_online(true);
    let report = engine.state.service.retry_sync().await.unwrap();
    assert_eq!(report.succeeded, vec![queued.id.clone()]);

    let done = engine.state.service.get_donation(&queued.id).unwrap();
    assert_eq!(done.status, DonationStatus::Completed);
    assert_eq!(done.gateway, Some(Gateway::General));
    assert_eq!(
        done.audit_trail.status_path(),
        vec![
            DonationStatus::Validated,
            DonationStatus::PendingSync,
            DonationStatus::Submitting,
            DonationStatus::Completed,
        ]
    );
    let transitions = done
        .audit_trail
        .entries()
        .iter()
        .filter(|e| e.is_transition())
        .count();
    assert_eq!(transitions, 4);
    assert_eq!(done.server_id, engine.backend.server_id(&queued.id));
}

#[tokio::test]
async fn unit_donation_of_18_ils_goes_through_restricted_gateway() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, true);
    let mut request = input(dec!(18), Currency::Ils);
    request.is_unit_donation = true;

    let donation = engine.state.service.submit_donation(request).await.unwrap();
    assert_eq!(donation.status, DonationStatus::Completed);
    assert_eq!(donation.gateway, Some(Gateway::Restricted));
    assert!(engine.restricted.was_charged(&donation.id));
    assert_eq!(engine.general.call_count(), 0);
}

#[tokio::test]
async fn unit_donation_of_20_ils_is_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, true);
    let mut request = input(dec!(20), Currency::Ils);
    request.is_unit_donation = true;

    let err = engine.state.service.submit_donation(request).await.unwrap_err();
    let SubmitError::Validation(result) = err else {
        panic!("expected validation failure, got {err}");
    };
    assert_eq!(
        result.violations,
        vec![Violation::UnitMismatch {
            amount: dec!(20),
            unit: dec!(18),
        }]
    );
    assert_eq!(engine.restricted.call_count(), 0);
    assert_eq!(engine.general.call_count(), 0);
    assert!(engine.state.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn pinned_restricted_gateway_rejects_other_currencies() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, true);
    let mut request = input(dec!(100), Currency::Usd);
    request.gateway = Some(Gateway::Restricted);

    let err = engine.state.service.submit_donation(request).await.unwrap_err();
    let SubmitError::Validation(result) = err else {
        panic!("expected validation failure, got {err}");
    };
    assert!(result.has(|v| matches!(v, Violation::GatewayCurrencyMismatch { .. })));
    assert_eq!(engine.restricted.call_count(), 0);
}

#[tokio::test]
async fn three_transient_failures_then_success() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, true);
    for _ in 0..3 {
        engine
            .general
            .fail_next(GatewayError::transient("timeout", "gateway timed out"));
    }

    let donation = engine
        .state
        .service
        .submit_donation(input(dec!(250), Currency::Eur))
        .await
        .unwrap();

    assert_eq!(donation.status, DonationStatus::Completed);
    assert_eq!(donation.audit_trail.count(AuditEventType::Failed), 3);
    assert_eq!(donation.audit_trail.count(AuditEventType::Completed), 1);
    assert_eq!(engine.general.charge_count(), 1);
    assert_eq!(engine.state.store.list().unwrap().len(), 1);
}

#[tokio::test]
async fn abandoned_donation_is_not_retried_by_later_drains() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 3, true);
    engine
        .general
        .fail_always(GatewayError::transient("unavailable", "provider down"));

    let donation = engine
        .state
        .service
        .submit_donation(input(dec!(40), Currency::Gbp))
        .await
        .unwrap();
    assert_eq!(donation.status, DonationStatus::Abandoned);
    assert_eq!(engine.general.call_count(), 3);

    engine.general.recover();
    for _ in 0..3 {
        engine.state.service.retry_sync().await.unwrap();
    }
    assert_eq!(engine.general.call_count(), 3);

    let attention = engine.state.service.list_attention_required().unwrap();
    assert_eq!(attention.len(), 1);
    assert_eq!(attention[0].id, donation.id);
    assert!(attention[0].last_error.is_some());
}

#[tokio::test]
async fn amount_limits_are_inclusive() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 5, false);
    let rules = CurrencyRules::default();

    for currency in rules.supported_currencies() {
        let limits = rules.limits(currency).unwrap();
        for amount in [limits.minimum, limits.maximum] {
            let accepted = engine
                .state
                .service
                .submit_donation(input(amount, currency))
                .await;
            assert!(accepted.is_ok(), "{amount} {currency} should be accepted");
        }

        let below = engine
            .state
            .service
            .submit_donation(input(limits.minimum - dec!(0.01), currency))
            .await;
        assert!(matches!(below, Err(SubmitError::Validation(_))));

        let above = engine
            .state
            .service
            .submit_donation(input(limits.maximum + dec!(0.01), currency))
            .await;
        assert!(matches!(above, Err(SubmitError::Validation(_))));
    }
}

#[tokio::test]
async fn queued_donations_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("donations.redb");

    let ids: Vec<String> = {
        let engine = engine_at(&path, 5, false, Duration::ZERO);
        let mut ids = Vec::new();
        for amount in [dec!(10), dec!(20), dec!(30)] {
            let donation = engine
                .state
                .service
                .submit_donation(input(amount, Currency::Usd))
                .await
                .unwrap();
            ids.push(donation.id);
        }
        ids
    };

    let engine = engine_at(&path, 5, true, Duration::ZERO);
    assert_eq!(engine.state.service.recover().unwrap(), 0);
    let report = engine.state.service.retry_sync().await.unwrap();

    let mut succeeded = report.succeeded.clone();
    succeeded.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(succeeded, expected);
    for id in &ids {
        let donation = engine.state.service.get_donation(id).unwrap();
        assert_eq!(donation.status, DonationStatus::Completed);
        assert!(donation.server_id.is_some());
    }
}

#[tokio::test]
async fn gateway_outage_never_loses_a_record() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, 2, true);
    engine
        .general
        .fail_next(GatewayError::transient("network", "connection reset"));
    engine
        .general
        .fail_next(GatewayError::terminal("card_declined", "insufficient funds"));

    let declined = engine
        .state
        .service
        .submit_donation(input(dec!(75), Currency::Usd))
        .await
        .unwrap();
    assert_eq!(declined.status, DonationStatus::Abandoned);

    let stored = engine.state.service.get_donation(&declined.id).unwrap();
    assert_eq!(stored, declined);
    assert_eq!(stored.audit_trail.count(AuditEventType::Failed), 2);
    assert_eq!(stored.audit_trail.count(AuditEventType::Abandoned), 1);
}
