// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Gateway Routing
//!
//! Chooses between the general (multi-currency) gateway and the restricted
//! (single-currency) gateway, then shapes the provider-specific request.
//!
//! ## Rule
//!
//! 1. A pinned gateway is used only if it supports the donation's currency,
//!    payment method and recurrence. Otherwise routing fails.
//! 2. Unpinned donations in the restricted gateway's currency go to the
//!    restricted gateway when it supports the payment method.
//! 3. Everything else goes to the general gateway if it supports the pair.
//! 4. No match is an [`RoutingError::UnsupportedCombination`]; there is no
//!    fallback to a gateway that cannot process the donation.

use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::currency::Currency;
use crate::models::{Donation, Gateway, PaymentMethod, RecurringSchedule};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("no gateway supports {payment_method:?} in {currency}")]
    UnsupportedCombination {
        currency: Currency,
        payment_method: PaymentMethod,
        pinned: Option<Gateway>,
    },

    #[error("amount cannot be expressed in minor units")]
    AmountOverflow,

    #[error("restricted gateway must support exactly one currency, found {0}")]
    MisconfiguredRestrictedGateway(usize),
}

// =============================================================================
// Capabilities
// =============================================================================

/// What a single gateway can process.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayProfile {
    pub gateway: Gateway,
    pub currencies: Vec<Currency>,
    pub payment_methods: Vec<PaymentMethod>,
    pub supports_recurring: bool,
}

impl GatewayProfile {
    pub fn supports_currency(&self, currency: Currency) -> bool {
        self.currencies.contains(&currency)
    }

    pub fn supports(&self, currency: Currency, method: PaymentMethod, recurring: bool) -> bool {
        self.supports_currency(currency)
            && self.payment_methods.contains(&method)
            && (!recurring || self.supports_recurring)
    }
}

/// Capabilities of both gateways.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayCapabilities {
    general: GatewayProfile,
    restricted: GatewayProfile,
}

impl Default for GatewayCapabilities {
    fn default() -> Self {
        Self {
            general: GatewayProfile {
                gateway: Gateway::General,
                currencies: vec![Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Ils],
                payment_methods: vec![PaymentMethod::Card, PaymentMethod::BankTransfer],
                supports_recurring: true,
            },
            restricted: GatewayProfile {
                gateway: Gateway::Restricted,
                currencies: vec![Currency::Ils],
                payment_methods: vec![PaymentMethod::Card, PaymentMethod::DirectDebit],
                supports_recurring: true,
            },
        }
    }
}

impl GatewayCapabilities {
    pub fn new(general: GatewayProfile, restricted: GatewayProfile) -> Result<Self, RoutingError> {
        if restricted.currencies.len() != 1 {
            return Err(RoutingError::MisconfiguredRestrictedGateway(
                restricted.currencies.len(),
            ));
        }
        Ok(Self {
            general: GatewayProfile {
                gateway: Gateway::General,
                ..general
            },
            restricted: GatewayProfile {
                gateway: Gateway::Restricted,
                ..restricted
            },
        })
    }

    pub fn profile(&self, gateway: Gateway) -> &GatewayProfile {
        match gateway {
            Gateway::General => &self.general,
            Gateway::Restricted => &self.restricted,
        }
    }

    /// The single currency the restricted gateway accepts.
    pub fn restricted_currency(&self) -> Currency {
        self.restricted.currencies[0]
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Provider-neutral charge request produced by routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub gateway: Gateway,
    /// Donation id; providers deduplicate on it.
    pub idempotency_key: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub donor_id: String,
    pub association_id: String,
    pub campaign_id: Option<String>,
    pub anonymous: bool,
    pub recurring: Option<RecurringSchedule>,
}

impl GatewayRequest {
    /// JSON body in the shape the selected provider expects.
    pub fn payload(&self) -> Value {
        match self.gateway {
            Gateway::General => self.general_payload(),
            Gateway::Restricted => self.restricted_payload(),
        }
    }

    fn general_payload(&self) -> Value {
        let mut metadata = serde_json::Map::new();
        metadata.insert("donation_id".into(), json!(self.idempotency_key));
        metadata.insert("association_id".into(), json!(self.association_id));
        if !self.anonymous {
            metadata.insert("donor_id".into(), json!(self.donor_id));
        }
        if let Some(campaign_id) = &self.campaign_id {
            metadata.insert("campaign_id".into(), json!(campaign_id));
        }

        let mut payload = json!({
            "amount": self.amount_minor,
            "currency": self.currency.code().to_ascii_lowercase(),
            "payment_method_type": method_name(self.payment_method),
            "description": format!("Donation to {}", self.association_id),
            "metadata": metadata,
        });
        if let Some(schedule) = &self.recurring {
            payload["recurring"] = json!({
                "interval": schedule.frequency,
                "count": schedule.occurrences,
            });
        }
        payload
    }

    fn restricted_payload(&self) -> Value {
        let mut payload = json!({
            "sum": self.amount_minor,
            "payment_type": method_name(self.payment_method),
            "transaction_id": self.idempotency_key,
            "beneficiary": self.association_id,
            "anonymous": self.anonymous,
            "installments": 1,
        });
        if !self.anonymous {
            payload["donor"] = json!(self.donor_id);
        }
        if let Some(campaign_id) = &self.campaign_id {
            payload["campaign"] = json!(campaign_id);
        }
        if let Some(schedule) = &self.recurring {
            payload["standing_order"] = json!({
                "frequency": schedule.frequency,
                "charges": schedule.occurrences,
            });
        }
        payload
    }
}

fn method_name(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::BankTransfer => "bank_transfer",
        PaymentMethod::DirectDebit => "direct_debit",
    }
}

/// Result of routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySelection {
    pub gateway: Gateway,
    pub request: GatewayRequest,
}

// =============================================================================
// Router
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct GatewayRouter {
    capabilities: GatewayCapabilities,
}

impl GatewayRouter {
    pub fn new(capabilities: GatewayCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &GatewayCapabilities {
        &self.capabilities
    }

    /// Pick a gateway for `donation`. Deterministic and side-effect free.
    pub fn select(&self, donation: &Donation) -> Result<Gateway, RoutingError> {
        let currency = donation.currency;
        let method = donation.payment_method;
        let recurring = donation.is_recurring;
        let pinned = donation.gateway.filter(|_| donation.gateway_pinned);

        let candidates: Vec<Gateway> = match pinned {
            Some(gateway) => vec![gateway],
            None if currency == self.capabilities.restricted_currency() => {
                vec![Gateway::Restricted, Gateway::General]
            }
            None => vec![Gateway::General],
        };

        candidates
            .into_iter()
            .find(|g| self.capabilities.profile(*g).supports(currency, method, recurring))
            .ok_or(RoutingError::UnsupportedCombination {
                currency,
                payment_method: method,
                pinned,
            })
    }

    /// Pick a gateway and build its request.
    pub fn route(&self, donation: &Donation) -> Result<GatewaySelection, RoutingError> {
        let gateway = self.select(donation)?;
        self.route_to(donation, gateway)
    }

    /// Build the request for a gateway chosen earlier, re-checking that it
    /// can still process the donation.
    pub fn route_to(
        &self,
        donation: &Donation,
        gateway: Gateway,
    ) -> Result<GatewaySelection, RoutingError> {
        if !self.capabilities.profile(gateway).supports(
            donation.currency,
            donation.payment_method,
            donation.is_recurring,
        ) {
            return Err(RoutingError::UnsupportedCombination {
                currency: donation.currency,
                payment_method: donation.payment_method,
                pinned: Some(gateway),
            });
        }
        let amount_minor = donation.amount_minor().ok_or(RoutingError::AmountOverflow)?;

        Ok(GatewaySelection {
            gateway,
            request: GatewayRequest {
                gateway,
                idempotency_key: donation.id.clone(),
                amount_minor,
                currency: donation.currency,
                payment_method: donation.payment_method,
                donor_id: donation.donor_id.clone(),
                association_id: donation.association_id.clone(),
                campaign_id: donation.campaign_id.clone(),
                anonymous: donation.is_anonymous,
                recurring: if donation.is_recurring {
                    donation.recurring_schedule.clone()
                } else {
                    None
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::draft;
    use crate::models::RecurringFrequency;
    use rust_decimal_macros::dec;

    fn router() -> GatewayRouter {
        GatewayRouter::default()
    }

    #[test]
    fn ils_card_prefers_restricted() {
        let d = draft(dec!(18), Currency::Ils);
        let selection = router().route(&d).unwrap();
        assert_eq!(selection.gateway, Gateway::Restricted);
        assert_eq!(selection.request.amount_minor, 1800);
        assert_eq!(selection.request.idempotency_key, d.id);
    }

    #[test]
    fn ils_bank_transfer_uses_general() {
        let mut d = draft(dec!(18), Currency::Ils);
        d.payment_method = PaymentMethod::BankTransfer;
        assert_eq!(router().select(&d).unwrap(), Gateway::General);
    }

    #[test]
    fn other_currencies_use_general() {
        for currency in [Currency::Usd, Currency::Eur, Currency::Gbp] {
            let d = draft(dec!(100), currency);
            assert_eq!(router().select(&d).unwrap(), Gateway::General);
        }
    }

    #[test]
    fn pinned_general_is_respected_for_ils() {
        let mut d = draft(dec!(18), Currency::Ils);
        d.gateway = Some(Gateway::General);
        d.gateway_pinned = true;
        assert_eq!(router().select(&d).unwrap(), Gateway::General);
    }

    #[test]
    fn pinned_restricted_with_foreign_currency_is_rejected() {
        let mut d = draft(dec!(100), Currency::Usd);
        d.gateway = Some(Gateway::Restricted);
        d.gateway_pinned = true;
        assert_eq!(
            router().select(&d),
            Err(RoutingError::UnsupportedCombination {
                currency: Currency::Usd,
                payment_method: PaymentMethod::Card,
                pinned: Some(Gateway::Restricted),
            })
        );
    }

    #[test]
    fn unsupported_pair_never_falls_back() {
        let mut d = draft(dec!(100), Currency::Usd);
        d.payment_method = PaymentMethod::DirectDebit;
        assert!(matches!(
            router().select(&d),
            Err(RoutingError::UnsupportedCombination { pinned: None, .. })
        ));
    }

    #[test]
    fn restricted_selection_always_matches_its_currency() {
        let r = router();
        for currency in Currency::ALL {
            for method in [
                PaymentMethod::Card,
                PaymentMethod::BankTransfer,
                PaymentMethod::DirectDebit,
            ] {
                let mut d = draft(dec!(50), currency);
                d.payment_method = method;
                if let Ok(Gateway::Restricted) = r.select(&d) {
                    assert_eq!(currency, r.capabilities().restricted_currency());
                }
            }
        }
    }

    #[test]
    fn route_to_rechecks_support() {
        let d = draft(dec!(100), Currency::Usd);
        assert!(router().route_to(&d, Gateway::General).is_ok());
        assert!(router().route_to(&d, Gateway::Restricted).is_err());
    }

    #[test]
    fn restricted_config_needs_one_currency() {
        let caps = GatewayCapabilities::default();
        let mut restricted = caps.profile(Gateway::Restricted).clone();
        restricted.currencies.push(Currency::Usd);
        let err = GatewayCapabilities::new(caps.profile(Gateway::General).clone(), restricted)
            .unwrap_err();
        assert_eq!(err, RoutingError::MisconfiguredRestrictedGateway(2));
    }

    #[test]
    fn payload_shapes_differ_per_gateway() {
        let mut d = draft(dec!(36), Currency::Ils);
        d.is_anonymous = true;
        d.is_recurring = true;
        d.recurring_schedule = Some(RecurringSchedule {
            frequency: RecurringFrequency::Monthly,
            occurrences: Some(12),
        });

        let restricted = router().route(&d).unwrap().request.payload();
        assert_eq!(restricted["sum"], 3600);
        assert_eq!(restricted["transaction_id"], d.id.as_str());
        assert_eq!(restricted["standing_order"]["frequency"], "monthly");
        assert!(restricted.get("donor").is_none());

        d.gateway = Some(Gateway::General);
        d.gateway_pinned = true;
        let general = router().route(&d).unwrap().request.payload();
        assert_eq!(general["amount"], 3600);
        assert_eq!(general["currency"], "ils");
        assert_eq!(general["recurring"]["count"], 12);
        assert!(general["metadata"].get("donor_id").is_none());
    }
}
