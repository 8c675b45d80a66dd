// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Donation Validation
//!
//! [`DonationValidator::validate`] is a pure function of the donation, the
//! currency rules, the gateway capabilities, the region payment-method table
//! and the compliance policy. It never performs I/O and never stops at the
//! first problem: every violation is collected so the UI can show them all.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::currency::{AmountCheck, Currency, CurrencyRules, Region};
use crate::models::{Donation, Gateway, PaymentMethod};
use crate::routing::GatewayCapabilities;

pub mod compliance;

pub use compliance::{AlwaysOpen, CompliancePolicy, WeeklyBlackout};

/// One reason a donation cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Violation {
    #[error("amount is below the minimum of {minimum} {currency}")]
    AmountBelowMinimum {
        #[schema(value_type = String)]
        minimum: Decimal,
        currency: Currency,
    },

    #[error("amount is above the maximum of {maximum} {currency}")]
    AmountAboveMaximum {
        #[schema(value_type = String)]
        maximum: Decimal,
        currency: Currency,
    },

    #[error("{currency} is not a supported donation currency")]
    UnsupportedCurrency { currency: Currency },

    #[error("{currency} amounts allow at most {max_decimals} decimal places")]
    ExcessPrecision { currency: Currency, max_decimals: u32 },

    #[error("the {gateway} gateway does not accept {currency}")]
    GatewayCurrencyMismatch { gateway: Gateway, currency: Currency },

    #[error("unit donations must be a multiple of {unit}, got {amount}")]
    UnitMismatch {
        #[schema(value_type = String)]
        amount: Decimal,
        #[schema(value_type = String)]
        unit: Decimal,
    },

    #[error("{payment_method:?} is not available for {region:?}")]
    PaymentMethodUnavailableInRegion {
        payment_method: PaymentMethod,
        region: Region,
    },

    #[error("recurring donations need a schedule")]
    MissingRecurringSchedule,

    #[error("{reason}")]
    ComplianceWindow { reason: String },
}

/// All violations found for one donation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(&self, predicate: impl Fn(&Violation) -> bool) -> bool {
        self.violations.iter().any(predicate)
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Payment methods usable in each settlement region.
#[derive(Debug, Clone)]
pub struct RegionRules {
    methods: HashMap<Region, Vec<PaymentMethod>>,
}

impl Default for RegionRules {
    fn default() -> Self {
        use PaymentMethod::*;
        Self::new([
            (Region::Israel, vec![Card, BankTransfer, DirectDebit]),
            (Region::UnitedStates, vec![Card, BankTransfer]),
            (Region::Eurozone, vec![Card, BankTransfer]),
            (Region::UnitedKingdom, vec![Card, BankTransfer]),
            (Region::Canada, vec![Card]),
            (Region::Australia, vec![Card]),
            (Region::Switzerland, vec![Card]),
        ])
    }
}

impl RegionRules {
    pub fn new(methods: impl IntoIterator<Item = (Region, Vec<PaymentMethod>)>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }

    pub fn allows(&self, region: Region, method: PaymentMethod) -> bool {
        self.methods
            .get(&region)
            .is_some_and(|methods| methods.contains(&method))
    }
}

/// Validator shared by the online and offline submission paths.
#[derive(Clone)]
pub struct DonationValidator {
    rules: Arc<CurrencyRules>,
    capabilities: GatewayCapabilities,
    regions: RegionRules,
    policy: Arc<dyn CompliancePolicy>,
}

impl DonationValidator {
    pub fn new(
        rules: Arc<CurrencyRules>,
        capabilities: GatewayCapabilities,
        regions: RegionRules,
        policy: Arc<dyn CompliancePolicy>,
    ) -> Self {
        Self {
            rules,
            capabilities,
            regions,
            policy,
        }
    }

    pub fn rules(&self) -> &CurrencyRules {
        &self.rules
    }

    /// Validate against the current wall clock.
    pub fn validate(&self, donation: &Donation) -> ValidationResult {
        self.validate_at(donation, Utc::now())
    }

    /// Validate as if at instant `at` (only the compliance policy looks at it).
    pub fn validate_at(&self, donation: &Donation, at: DateTime<Utc>) -> ValidationResult {
        let mut result = ValidationResult::default();
        let currency = donation.currency;

        match self.rules.validate_amount(donation.amount, currency) {
            AmountCheck::Valid => {}
            AmountCheck::BelowMinimum { minimum } => {
                result.push(Violation::AmountBelowMinimum { minimum, currency })
            }
            AmountCheck::AboveMaximum { maximum } => {
                result.push(Violation::AmountAboveMaximum { maximum, currency })
            }
            AmountCheck::UnsupportedCurrency => {
                result.push(Violation::UnsupportedCurrency { currency })
            }
        }

        if !self.rules.has_valid_precision(donation.amount, currency) {
            result.push(Violation::ExcessPrecision {
                currency,
                max_decimals: currency.minor_units(),
            });
        }

        if let Some(gateway) = donation.gateway.filter(|_| donation.gateway_pinned) {
            if !self.capabilities.profile(gateway).supports_currency(currency) {
                result.push(Violation::GatewayCurrencyMismatch { gateway, currency });
            }
        }

        if donation.is_unit_donation && !self.rules.is_unit_multiple(donation.amount) {
            result.push(Violation::UnitMismatch {
                amount: donation.amount,
                unit: self.rules.unit(),
            });
        }

        let region = currency.region();
        if !self.regions.allows(region, donation.payment_method) {
            result.push(Violation::PaymentMethodUnavailableInRegion {
                payment_method: donation.payment_method,
                region,
            });
        }

        if donation.is_recurring && donation.recurring_schedule.is_none() {
            result.push(Violation::MissingRecurringSchedule);
        }

        if let Err(reason) = self.policy.check(donation, at) {
            result.push(Violation::ComplianceWindow { reason });
        }

        result
    }
}
