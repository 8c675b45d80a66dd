// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-currency donation limits and the unit-of-18 rule.
//!
//! Everything here is pure: the table is built once at startup and shared
//! read-only between the validator and the service.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use super::Currency;

/// Amount whose multiples carry cultural significance ("chai").
pub const UNIT_CONSTANT: u32 = 18;

/// Inclusive amount range accepted for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AmountLimits {
    pub minimum: Decimal,
    pub maximum: Decimal,
}

impl AmountLimits {
    pub fn new(minimum: impl Into<Decimal>, maximum: impl Into<Decimal>) -> Self {
        Self {
            minimum: minimum.into(),
            maximum: maximum.into(),
        }
    }
}

/// Outcome of [`CurrencyRules::validate_amount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountCheck {
    Valid,
    BelowMinimum { minimum: Decimal },
    AboveMaximum { maximum: Decimal },
    UnsupportedCurrency,
}

impl AmountCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, AmountCheck::Valid)
    }
}

/// Table of supported currencies and their limits.
#[derive(Debug, Clone)]
pub struct CurrencyRules {
    limits: HashMap<Currency, AmountLimits>,
    unit: Decimal,
}

impl Default for CurrencyRules {
    fn default() -> Self {
        Self::new([
            (Currency::Ils, AmountLimits::new(5, 250_000)),
            (Currency::Usd, AmountLimits::new(1, 100_000)),
            (Currency::Eur, AmountLimits::new(1, 100_000)),
            (Currency::Gbp, AmountLimits::new(1, 100_000)),
        ])
    }
}

impl CurrencyRules {
    pub fn new(limits: impl IntoIterator<Item = (Currency, AmountLimits)>) -> Self {
        Self {
            limits: limits.into_iter().collect(),
            unit: Decimal::from(UNIT_CONSTANT),
        }
    }

    pub fn limits(&self, currency: Currency) -> Option<AmountLimits> {
        self.limits.get(&currency).copied()
    }

    pub fn supported_currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.limits.keys().copied().collect();
        currencies.sort();
        currencies
    }

    /// Check `amount` against the range for `currency`. Both bounds are inclusive.
    pub fn validate_amount(&self, amount: Decimal, currency: Currency) -> AmountCheck {
        let Some(limits) = self.limits.get(&currency) else {
            return AmountCheck::UnsupportedCurrency;
        };
        if amount < limits.minimum {
            AmountCheck::BelowMinimum {
                minimum: limits.minimum,
            }
        } else if amount > limits.maximum {
            AmountCheck::AboveMaximum {
                maximum: limits.maximum,
            }
        } else {
            AmountCheck::Valid
        }
    }

    /// True when `amount` has no more decimal places than the currency allows.
    pub fn has_valid_precision(&self, amount: Decimal, currency: Currency) -> bool {
        amount.normalize().scale() <= currency.minor_units()
    }

    /// True when `amount` is a positive exact multiple of [`UNIT_CONSTANT`].
    pub fn is_unit_multiple(&self, amount: Decimal) -> bool {
        amount > Decimal::ZERO && (amount % self.unit).is_zero()
    }

    pub fn unit(&self) -> Decimal {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minimum_is_inclusive() {
        let rules = CurrencyRules::default();
        for currency in rules.supported_currencies() {
            let limits = rules.limits(currency).unwrap();
            assert_eq!(rules.validate_amount(limits.minimum, currency), AmountCheck::Valid);
            assert_eq!(
                rules.validate_amount(limits.minimum - Decimal::ONE, currency),
                AmountCheck::BelowMinimum {
                    minimum: limits.minimum
                }
            );
        }
    }

    #[test]
    fn maximum_is_inclusive() {
        let rules = CurrencyRules::default();
        assert!(rules.validate_amount(dec!(100000), Currency::Usd).is_valid());
        assert_eq!(
            rules.validate_amount(dec!(100000.01), Currency::Usd),
            AmountCheck::AboveMaximum {
                maximum: dec!(100000)
            }
        );
    }

    #[test]
    fn unknown_table_entry_is_unsupported() {
        let rules = CurrencyRules::default();
        assert_eq!(
            rules.validate_amount(dec!(50), Currency::Chf),
            AmountCheck::UnsupportedCurrency
        );
    }

    #[test]
    fn unit_multiples() {
        let rules = CurrencyRules::default();
        assert!(rules.is_unit_multiple(dec!(18)));
        assert!(rules.is_unit_multiple(dec!(36.00)));
        assert!(rules.is_unit_multiple(dec!(180)));
        assert!(!rules.is_unit_multiple(dec!(20)));
        assert!(!rules.is_unit_multiple(dec!(18.5)));
        assert!(!rules.is_unit_multiple(Decimal::ZERO));
    }

    #[test]
    fn precision_follows_minor_units() {
        let rules = CurrencyRules::default();
        assert!(rules.has_valid_precision(dec!(10.25), Currency::Usd));
        assert!(rules.has_valid_precision(dec!(10.500), Currency::Usd));
        assert!(!rules.has_valid_precision(dec!(10.255), Currency::Usd));
    }
}
