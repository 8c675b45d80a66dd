// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Currencies
//!
//! Closed set of ISO currency codes the engine understands, the amount rules
//! applied to each of them, and the exchange-rate converter used for display
//! and cross-currency checks.
//!
//! Only currencies with an entry in [`CurrencyRules`] are accepted for
//! donations; the remaining variants exist so that an unsupported but
//! well-formed code can be reported as such instead of failing to parse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod converter;
pub mod format_cache;
pub mod rules;

pub use converter::{
    ConversionError, CurrencyConverter, ExchangeRateTable, HttpRateSource, RateSource,
    StaticRateSource,
};
pub use rules::{AmountCheck, AmountLimits, CurrencyRules, UNIT_CONSTANT};

/// ISO 4217 currency code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Israeli new shekel
    Ils,
    /// US dollar
    Usd,
    /// Euro
    Eur,
    /// Pound sterling
    Gbp,
    /// Canadian dollar
    Cad,
    /// Australian dollar
    Aud,
    /// Swiss franc
    Chf,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Ils,
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Cad,
        Currency::Aud,
        Currency::Chf,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ils => "ILS",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Ils => "₪",
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Gbp => "£",
            Currency::Cad => "CA$",
            Currency::Aud => "A$",
            Currency::Chf => "CHF ",
        }
    }

    /// Number of decimal places in the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        2
    }

    /// Region whose payment rails settle this currency.
    pub fn region(&self) -> Region {
        match self {
            Currency::Ils => Region::Israel,
            Currency::Usd => Region::UnitedStates,
            Currency::Eur => Region::Eurozone,
            Currency::Gbp => Region::UnitedKingdom,
            Currency::Cad => Region::Canada,
            Currency::Aud => Region::Australia,
            Currency::Chf => Region::Switzerland,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(UnknownCurrency(s.to_string()))
    }
}

/// Settlement region, used to decide which payment methods are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Israel,
    UnitedStates,
    Eurozone,
    UnitedKingdom,
    Canada,
    Australia,
    Switzerland,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ils".parse::<Currency>().unwrap(), Currency::Ils);
        assert_eq!(" Usd ".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn serde_uses_iso_codes() {
        let json = serde_json::to_string(&Currency::Gbp).unwrap();
        assert_eq!(json, r#""GBP""#);
        let parsed: Currency = serde_json::from_str(r#""EUR""#).unwrap();
        assert_eq!(parsed, Currency::Eur);
    }
}
