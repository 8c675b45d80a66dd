// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Donation Data Models
//!
//! [`Donation`] is the aggregate root of the engine. It is created from a
//! [`DonationInput`] in `DRAFT`, and from then on only changes through
//! [`Donation::transition`] (which also writes the audit trail) or the
//! reconciliation setters used by the sync engine.
//!
//! ## Identity
//!
//! Ids are generated client-side (UUID v4) so a donation created offline has
//! a stable identity before the backend ever sees it. The id doubles as the
//! idempotency key sent to gateways and to the backend.
//!
//! ## Money
//!
//! Amounts are [`Decimal`] in major units of the donation currency. No
//! floating point is used anywhere on the money path.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::currency::{Currency, UNIT_CONSTANT};
use crate::lifecycle::{DonationStatus, LifecycleError};
use crate::storage::audit::{AuditEventType, AuditTrail};

// =============================================================================
// Enumerations
// =============================================================================

/// How the donor pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    /// Standing order / direct debit mandate
    DirectDebit,
}

/// Payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    /// Multi-currency provider, the default.
    General,
    /// Single-currency provider with local compliance rules.
    Restricted,
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gateway::General => f.write_str("general"),
            Gateway::Restricted => f.write_str("restricted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecurringFrequency {
    Weekly,
    Monthly,
    Yearly,
}

/// Schedule of a recurring donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurringSchedule {
    pub frequency: RecurringFrequency,
    /// Number of charges; open-ended when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u32>,
}

// =============================================================================
// Input
// =============================================================================

/// A donation as proposed by the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonationInput {
    /// Client-generated id; one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[schema(value_type = String, example = "18.00")]
    pub amount: Decimal,
    pub currency: Currency,
    pub donor_id: String,
    pub association_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Gateway pinned by the caller; routing decides when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Gateway>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_schedule: Option<RecurringSchedule>,
    /// Donor asserts the amount is a multiple of 18.
    #[serde(default)]
    pub is_unit_donation: bool,
}

// =============================================================================
// Donation
// =============================================================================

/// Donation aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Donation {
    /// Client-generated unique id, also the idempotency key.
    pub id: String,
    #[schema(value_type = String, example = "18.00")]
    pub amount: Decimal,
    pub currency: Currency,
    pub donor_id: String,
    pub association_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Pinned by the caller or chosen by routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Gateway>,
    /// Whether the gateway was pinned by the caller.
    #[serde(default)]
    pub gateway_pinned: bool,
    pub is_anonymous: bool,
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_schedule: Option<RecurringSchedule>,
    pub is_unit_donation: bool,
    pub status: DonationStatus,
    /// Gateway attempts consumed so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// Reference returned by the gateway on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_transaction_ref: Option<String>,
    /// Backend id once the system of record acknowledged the donation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Set when the backend reported a conflicting record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_conflict: Option<String>,
    /// Most recent gateway or sync error, for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub audit_trail: AuditTrail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Build a `DRAFT` donation from user input.
    pub fn from_input(input: DonationInput, now: DateTime<Utc>) -> Self {
        let id = input
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            id,
            amount: input.amount,
            currency: input.currency,
            donor_id: input.donor_id,
            association_id: input.association_id,
            campaign_id: input.campaign_id,
            payment_method: input.payment_method,
            gateway_pinned: input.gateway.is_some(),
            gateway: input.gateway,
            is_anonymous: input.is_anonymous,
            is_recurring: input.is_recurring,
            recurring_schedule: input.recurring_schedule,
            is_unit_donation: input.is_unit_donation,
            status: DonationStatus::Draft,
            attempt_count: 0,
            gateway_transaction_ref: None,
            server_id: None,
            sync_conflict: None,
            last_error: None,
            audit_trail: AuditTrail::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the amount is an exact multiple of the unit constant.
    pub fn is_unit_multiple(&self) -> bool {
        self.amount > Decimal::ZERO && (self.amount % Decimal::from(UNIT_CONSTANT)).is_zero()
    }

    /// Amount in the currency's minor unit (cents, agorot, ...).
    pub fn amount_minor(&self) -> Option<i64> {
        let scale = Decimal::from(10_i64.pow(self.currency.minor_units()));
        let minor = (self.amount * scale)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        i64::try_from(minor).ok()
    }

    /// Move to `to`, appending exactly one audit entry.
    pub fn transition(
        &mut self,
        to: DonationStatus,
        detail: Option<String>,
    ) -> Result<(), LifecycleError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::IllegalTransition { from, to });
        }
        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        self.audit_trail.record_transition(from, to, detail, now);
        Ok(())
    }

    /// `SUBMITTING → COMPLETED`, recording the gateway reference.
    pub fn complete(&mut self, transaction_ref: String) -> Result<(), LifecycleError> {
        if transaction_ref.trim().is_empty() {
            return Err(LifecycleError::MissingTransactionRef);
        }
        self.transition(DonationStatus::Completed, Some(transaction_ref.clone()))?;
        self.gateway_transaction_ref = Some(transaction_ref);
        self.last_error = None;
        Ok(())
    }

    /// `SUBMITTING → FAILED`, keeping the error for display.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), LifecycleError> {
        let error = error.into();
        self.transition(DonationStatus::Failed, Some(error.clone()))?;
        self.last_error = Some(error);
        Ok(())
    }

    /// Record a non-transition event (backend reconciliation).
    pub fn record_event(&mut self, event_type: AuditEventType, detail: Option<String>) {
        let now = Utc::now();
        self.updated_at = now;
        self.audit_trail.record_event(event_type, detail, now);
    }

    /// Completed but not yet acknowledged by the backend.
    pub fn awaiting_backend(&self) -> bool {
        self.status == DonationStatus::Completed
            && self.server_id.is_none()
            && self.sync_conflict.is_none()
    }

    /// The sync queue stopped retrying this donation before the backend
    /// acknowledged it.
    pub fn sync_given_up(&self) -> bool {
        self.server_id.is_none()
            && self.sync_conflict.is_none()
            && self.status != DonationStatus::Cancelled
            && self.audit_trail.count(AuditEventType::SyncAbandoned) > 0
    }

    /// Terminal failures, conflicts and given-up syncs the donor has to
    /// look at.
    pub fn needs_attention(&self) -> bool {
        self.status == DonationStatus::Abandoned
            || self.sync_conflict.is_some()
            || self.sync_given_up()
    }
}
