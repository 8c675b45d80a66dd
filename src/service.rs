// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Donation Service
//!
//! Entry point shared by every platform adapter. The HTTP handlers in
//! [`crate::api`] are thin wrappers around these methods.
//!
//! ## Submission
//!
//! 1. Build a `DRAFT` from the input and claim its id (one submission per id).
//! 2. A replay of an already completed id returns the stored record.
//! 3. Validate (all violations at once) and route. Nothing is persisted and
//!    no network call is made if either fails.
//! 4. `DRAFT → VALIDATED`, persisted.
//! 5. Offline: `VALIDATED → PENDING_SYNC` and queued in the same write.
//!    Online: charged through the executor, then queued for backend sync.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::currency::{ConversionError, Currency, CurrencyConverter};
use crate::executor::{ExecutionOutcome, ExecutorError, TransactionExecutor};
use crate::lifecycle::{DonationStatus, LifecycleError};
use crate::models::{Donation, DonationInput};
use crate::routing::{GatewayRouter, RoutingError};
use crate::storage::{DonationStore, StoreError};
use crate::sync::{Connectivity, DrainReport, SyncEngine};
use crate::validation::{DonationValidator, ValidationResult};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("donation is invalid: {0}")]
    Validation(ValidationResult),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("donation {0} is already being submitted")]
    AlreadyInFlight(String),

    #[error("donation {id} already exists in {status}")]
    Duplicate { id: String, status: DonationStatus },

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("donation {0} not found")]
    NotFound(String),

    #[error("donation {id} cannot be cancelled in {status}")]
    NotCancellable { id: String, status: DonationStatus },

    #[error("donation {0} is being submitted")]
    InFlight(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Quote
// =============================================================================

/// An amount with its display-currency equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    #[schema(value_type = String, example = "180.00")]
    pub amount: Decimal,
    pub currency: Currency,
    #[schema(value_type = String, example = "49.32")]
    pub converted: Decimal,
    pub display_currency: Currency,
    /// e.g. `₪180.00 (≈ $49.32)`
    pub formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates_updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Service
// =============================================================================

pub struct DonationService {
    store: Arc<DonationStore>,
    validator: DonationValidator,
    router: GatewayRouter,
    executor: Arc<TransactionExecutor>,
    sync: Arc<SyncEngine>,
    converter: Arc<CurrencyConverter>,
    connectivity: Connectivity,
}

impl DonationService {
    pub fn new(
        store: Arc<DonationStore>,
        validator: DonationValidator,
        router: GatewayRouter,
        executor: Arc<TransactionExecutor>,
        sync: Arc<SyncEngine>,
        converter: Arc<CurrencyConverter>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            store,
            validator,
            router,
            executor,
            sync,
            converter,
            connectivity,
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn converter(&self) -> &Arc<CurrencyConverter> {
        &self.converter
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// Validate, route and charge (or queue) a donation.
    pub async fn submit_donation(&self, input: DonationInput) -> Result<Donation, SubmitError> {
        let mut donation = Donation::from_input(input, Utc::now());

        let Some(claim) = self.executor.try_claim(&donation.id) else {
            warn!(donation_id = %donation.id, "Rejected concurrent submission");
            return Err(SubmitError::AlreadyInFlight(donation.id));
        };

        if let Some(existing) = self.store.get(&donation.id)? {
            if existing.status == DonationStatus::Completed {
                info!(donation_id = %existing.id, "Replayed completed donation");
                return Ok(existing);
            }
            return Err(SubmitError::Duplicate {
                id: existing.id,
                status: existing.status,
            });
        }

        let result = self.validator.validate(&donation);
        if !result.ok() {
            info!(
                donation_id = %donation.id,
                violations = result.violations.len(),
                "Donation failed validation"
            );
            return Err(SubmitError::Validation(result));
        }

        let selection = self.router.route(&donation)?;
        donation.gateway = Some(selection.gateway);
        donation.transition(
            DonationStatus::Validated,
            Some(format!("routed to {}", selection.gateway)),
        )?;
        self.store.save(&donation)?;

        if !self.connectivity.is_online() {
            donation.transition(DonationStatus::PendingSync, Some("offline; queued".into()))?;
            self.sync.enqueue(&donation)?;
            return Ok(donation);
        }

        let result = self.executor.execute(&claim, &mut donation).await;
        drop(claim);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                // The worker retries it.
                error!(donation_id = %donation.id, error = %e, "Donation failed to execute; queueing");
                if let Err(queue_err) = self.sync.enqueue(&donation) {
                    error!(donation_id = %donation.id, error = %queue_err, "Failed to queue donation");
                }
                return Err(e.into());
            }
        };

        match outcome {
            ExecutionOutcome::Completed | ExecutionOutcome::Deferred => {
                self.sync.enqueue(&donation)?;
            }
            ExecutionOutcome::Abandoned => {}
        }
        Ok(donation)
    }

    /// Drain the offline queue now.
    pub async fn retry_sync(&self) -> Result<DrainReport, StoreError> {
        self.sync.drain().await
    }

    pub fn get_donation(&self, id: &str) -> Result<Donation, ServiceError> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Cancel a donation that has not been submitted to a gateway.
    pub fn cancel_donation(&self, id: &str) -> Result<Donation, ServiceError> {
        let Some(_claim) = self.executor.try_claim(id) else {
            return Err(ServiceError::InFlight(id.to_string()));
        };
        let mut donation = self.get_donation(id)?;
        if !donation.status.is_cancellable() {
            return Err(ServiceError::NotCancellable {
                id: donation.id,
                status: donation.status,
            });
        }
        donation.transition(DonationStatus::Cancelled, Some("cancelled by donor".into()))?;
        self.store.save_and_dequeue(&donation)?;
        info!(donation_id = %donation.id, "Donation cancelled");
        Ok(donation)
    }

    /// Abandoned donations, backend conflicts and given-up syncs.
    pub fn list_attention_required(&self) -> Result<Vec<Donation>, StoreError> {
        self.store.list_attention_required()
    }

    /// Convert `amount` into the display currency, refreshing stale rates.
    pub async fn quote(&self, amount: Decimal, currency: Currency) -> Result<Quote, ConversionError> {
        let display_currency = self.converter.display_currency();
        let converted = self
            .converter
            .convert_fresh(amount, currency, display_currency)
            .await?;
        Ok(Quote {
            amount,
            currency,
            converted,
            display_currency,
            formatted: self.converter.format(amount, currency),
            rates_updated_at: self.converter.last_updated(),
        })
    }

    /// Re-queue records a crash left outside the queue.
    ///
    /// Run once at startup, before the sync worker.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;
        for donation in self.store.list()? {
            let unfinished = matches!(
                donation.status,
                DonationStatus::Validated
                    | DonationStatus::Submitting
                    | DonationStatus::Failed
                    | DonationStatus::PendingSync
            );
            if (unfinished || donation.awaiting_backend())
                && !donation.sync_given_up()
                && self.store.queue_entry(&donation.id)?.is_none()
            {
                warn!(donation_id = %donation.id, status = %donation.status, "Re-queueing unfinished donation");
                self.sync.enqueue(&donation)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(recovered, "Startup recovery complete");
        }
        Ok(recovered)
    }
}
