// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Executor
//!
//! The only code path that calls a payment gateway. Online submission and the
//! sync engine both go through [`TransactionExecutor::execute`].
//!
//! ## Guarantees
//!
//! - At most one execution per donation id at a time ([`InFlightClaim`]).
//! - The donation is persisted in `SUBMITTING` before the gateway call, and
//!   every later transition is persisted before the next step.
//! - The donation id is the idempotency key on every attempt, including
//!   retries after a crash, so the provider never charges twice.
//! - Transient failures back off exponentially up to `max_attempts` over the
//!   donation's lifetime. Terminal failures abandon immediately.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::gateway::{GatewayError, Gateways};
use crate::lifecycle::{DonationStatus, LifecycleError};
use crate::models::Donation;
use crate::routing::{GatewayRouter, RoutingError};
use crate::storage::{DonationStore, StoreError};
use crate::sync::Connectivity;

// =============================================================================
// Retry Policy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// `base × 2^(attempt-1)`, capped at `max`.
///
/// Shared by gateway retries and backend sync retries.
pub fn capped_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        capped_backoff(self.base_delay, self.max_delay, attempt)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

// =============================================================================
// Outcomes & Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Gateway confirmed the charge.
    Completed,
    /// Connectivity dropped after a transient failure; left in `PENDING_SYNC`.
    Deferred,
    /// Terminal decline or attempt bound reached.
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("donation {0} is already being submitted")]
    AlreadyInFlight(String),

    #[error("donation cannot be submitted from {0}")]
    NotExecutable(DonationStatus),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// In-flight Set
// =============================================================================

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Exclusive right to execute one donation. Released on drop.
#[derive(Debug)]
pub struct InFlightClaim {
    id: String,
    set: InFlightSet,
}

impl InFlightClaim {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

pub struct TransactionExecutor {
    store: Arc<DonationStore>,
    gateways: Gateways,
    router: GatewayRouter,
    policy: RetryPolicy,
    connectivity: Connectivity,
    in_flight: InFlightSet,
}

impl TransactionExecutor {
    pub fn new(
        store: Arc<DonationStore>,
        gateways: Gateways,
        router: GatewayRouter,
        policy: RetryPolicy,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            store,
            gateways,
            router,
            policy,
            connectivity,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim `id` for execution, or `None` when another caller holds it.
    pub fn try_claim(&self, id: &str) -> Option<InFlightClaim> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            id: id.to_string(),
            set: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    /// Drive `donation` to `COMPLETED`, `PENDING_SYNC` or `ABANDONED`.
    ///
    /// Accepts `VALIDATED`, `PENDING_SYNC`, `FAILED`, and `SUBMITTING` left
    /// behind by a crash (moved to `FAILED` first). The caller must hold the
    /// claim for this id; every state change is persisted before returning.
    pub async fn execute(
        &self,
        claim: &InFlightClaim,
        donation: &mut Donation,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        if claim.id() != donation.id {
            return Err(ExecutorError::AlreadyInFlight(donation.id.clone()));
        }

        if donation.status == DonationStatus::Submitting {
            warn!(donation_id = %donation.id, "Recovering interrupted submission");
            donation.fail("interrupted before the gateway answered")?;
            self.store.save(donation)?;
        }

        let gateway = match donation.gateway {
            Some(gateway) => gateway,
            None => self.router.select(donation)?,
        };
        let selection = self.router.route_to(donation, gateway)?;
        donation.gateway = Some(selection.gateway);

        loop {
            match donation.status {
                DonationStatus::Validated | DonationStatus::PendingSync => {}
                DonationStatus::Failed => {
                    if self.policy.exhausted(donation.attempt_count) {
                        donation.transition(
                            DonationStatus::Abandoned,
                            Some("attempt limit reached".into()),
                        )?;
                        self.store.save(donation)?;
                        warn!(donation_id = %donation.id, "Donation abandoned");
                        return Ok(ExecutionOutcome::Abandoned);
                    }
                    if !self.connectivity.is_online() {
                        return self.defer(donation);
                    }
                    donation.transition(DonationStatus::PendingSync, Some("retrying".into()))?;
                }
                other => return Err(ExecutorError::NotExecutable(other)),
            }

            donation.attempt_count += 1;
            let attempt = donation.attempt_count;
            donation.transition(
                DonationStatus::Submitting,
                Some(format!("attempt {attempt} via {gateway}")),
            )?;
            self.store.save(donation)?;

            info!(donation_id = %donation.id, %gateway, attempt, "Charging donation");
            let result = self.gateways.get(gateway).charge(&selection.request).await;

            match result {
                Ok(response) => {
                    donation.complete(response.transaction_ref)?;
                    self.store.save(donation)?;
                    info!(
                        donation_id = %donation.id,
                        transaction_ref = ?donation.gateway_transaction_ref,
                        "Donation completed"
                    );
                    return Ok(ExecutionOutcome::Completed);
                }
                Err(error) if !error.retryable => {
                    warn!(donation_id = %donation.id, error = %error, "Gateway declined donation");
                    return self.abandon(donation, &error, "declined");
                }
                Err(error) => {
                    warn!(donation_id = %donation.id, attempt, error = %error, "Transient gateway failure");
                    if self.policy.exhausted(attempt) {
                        return self.abandon(donation, &error, "attempt limit reached");
                    }
                    donation.fail(error.to_string())?;
                    self.store.save(donation)?;
                    if !self.connectivity.is_online() {
                        return self.defer(donation);
                    }
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                }
            }
        }
    }

    fn defer(&self, donation: &mut Donation) -> Result<ExecutionOutcome, ExecutorError> {
        donation.transition(DonationStatus::PendingSync, Some("offline; queued".into()))?;
        self.store.save(donation)?;
        info!(donation_id = %donation.id, "Donation deferred until connectivity returns");
        Ok(ExecutionOutcome::Deferred)
    }

    fn abandon(
        &self,
        donation: &mut Donation,
        error: &GatewayError,
        reason: &str,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        donation.fail(error.to_string())?;
        donation.transition(DonationStatus::Abandoned, Some(format!("{reason}: {error}")))?;
        self.store.save(donation)?;
        warn!(donation_id = %donation.id, reason, "Donation abandoned");
        Ok(ExecutionOutcome::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use crate::models::test_support::usd_100;
    use crate::storage::AuditEventType;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<DonationStore>,
        general: Arc<ScriptedGateway>,
        connectivity: Connectivity,
        executor: TransactionExecutor,
    }

    fn harness(max_attempts: u32) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DonationStore::open(&dir.path().join("db.redb")).unwrap());
        let general = Arc::new(ScriptedGateway::new("gen"));
        let restricted = Arc::new(ScriptedGateway::new("res"));
        let connectivity = Connectivity::online();
        let executor = TransactionExecutor::new(
            Arc::clone(&store),
            Gateways::new(general.clone(), restricted),
            GatewayRouter::default(),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            connectivity.clone(),
        );
        Harness {
            _dir: dir,
            store,
            general,
            connectivity,
            executor,
        }
    }

    fn validated() -> Donation {
        let mut donation = usd_100();
        donation.transition(DonationStatus::Validated, None).unwrap();
        donation
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(64), Duration::from_millis(1000));
    }

    #[test]
    fn claims_are_exclusive_and_released_on_drop() {
        let h = harness(3);
        let claim = h.executor.try_claim("d1").unwrap();
        assert!(h.executor.try_claim("d1").is_none());
        assert!(h.executor.try_claim("d2").is_some());
        drop(claim);
        assert!(!h.executor.is_in_flight("d1"));
        assert!(h.executor.try_claim("d1").is_some());
    }

    #[tokio::test]
    async fn completes_and_persists() {
        let h = harness(3);
        let mut donation = validated();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);

        let stored = h.store.get(&donation.id).unwrap().unwrap();
        assert_eq!(stored.status, DonationStatus::Completed);
        assert!(stored.gateway_transaction_ref.is_some());
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let h = harness(5);
        for _ in 0..3 {
            h.general.fail_next(GatewayError::transient("timeout", "slow"));
        }
        let mut donation = validated();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(donation.attempt_count, 4);
        assert_eq!(donation.audit_trail.count(AuditEventType::Failed), 3);
        assert_eq!(donation.audit_trail.count(AuditEventType::Completed), 1);
        assert_eq!(h.general.charge_count(), 1);
    }

    #[tokio::test]
    async fn terminal_error_abandons_without_retry() {
        let h = harness(5);
        h.general.fail_next(GatewayError::terminal("card_declined", "declined"));
        let mut donation = validated();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Abandoned);
        assert_eq!(h.general.call_count(), 1);
        assert_eq!(donation.status, DonationStatus::Abandoned);
        assert!(donation.last_error.as_deref().unwrap().contains("card_declined"));
    }

    #[tokio::test]
    async fn attempt_bound_abandons() {
        let h = harness(3);
        h.general.fail_always(GatewayError::transient("down", "maintenance"));
        let mut donation = validated();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Abandoned);
        assert_eq!(h.general.call_count(), 3);
        assert_eq!(
            h.store.get(&donation.id).unwrap().unwrap().status,
            DonationStatus::Abandoned
        );
    }

    #[tokio::test]
    async fn defers_when_offline_after_failure() {
        let h = harness(5);
        h.general.fail_next(GatewayError::transient("network", "unreachable"));
        h.connectivity.set_online(false);
        let mut donation = validated();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Deferred);
        assert_eq!(donation.status, DonationStatus::PendingSync);
        assert_eq!(h.general.call_count(), 1);
    }

    #[tokio::test]
    async fn recovers_crashed_submission_with_same_key() {
        let h = harness(5);
        let mut donation = validated();
        donation.transition(DonationStatus::Submitting, None).unwrap();
        donation.attempt_count = 1;
        h.store.save(&donation).unwrap();

        let claim = h.executor.try_claim(&donation.id).unwrap();
        let outcome = h.executor.execute(&claim, &mut donation).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert!(h.general.was_charged(&donation.id));
        assert_eq!(donation.attempt_count, 2);
        assert_eq!(
            donation.audit_trail.status_path(),
            vec![
                DonationStatus::Validated,
                DonationStatus::Submitting,
                DonationStatus::Failed,
                DonationStatus::PendingSync,
                DonationStatus::Submitting,
                DonationStatus::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn rejects_terminal_states() {
        let h = harness(5);
        let mut donation = usd_100();
        donation.transition(DonationStatus::Cancelled, None).unwrap();
        let claim = h.executor.try_claim(&donation.id).unwrap();

        let err = h.executor.execute(&claim, &mut donation).await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotExecutable(DonationStatus::Cancelled)));
    }
}
