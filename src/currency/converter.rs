// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Currency Converter
//!
//! Converts amounts between supported currencies using an
//! [`ExchangeRateTable`] fetched from a [`RateSource`].
//!
//! ## Staleness
//!
//! A table older than the refresh interval is never used: [`CurrencyConverter::convert`]
//! fails with [`ConversionError::StaleRates`] and the caller must refresh
//! explicitly (or use [`CurrencyConverter::convert_fresh`], which does it for
//! them).
//!
//! ## Refresh
//!
//! Refreshes are single-writer. Callers that arrive while a refresh is in
//! flight wait for it and then return without fetching again.
//!
//! ## Formatting cache
//!
//! Formatted strings embed an approximate value in the display currency, so
//! the cache is cleared under the table write lock on every refresh, and
//! bypassed and cleared once the table goes stale.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::format_cache::FormatCache;
use super::Currency;

const DEFAULT_FORMAT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("exchange rates are stale (last updated: {last_updated:?})")]
    StaleRates { last_updated: Option<DateTime<Utc>> },

    #[error("no exchange rate for {0}")]
    MissingRate(Currency),

    #[error("exchange rate refresh failed: {0}")]
    RefreshFailed(String),
}

/// Rates expressed as units of each currency per one unit of `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateTable {
    pub base: Currency,
    pub rates: HashMap<Currency, Decimal>,
    pub last_updated: DateTime<Utc>,
}

impl ExchangeRateTable {
    /// Build a table, dropping any non-positive rate.
    pub fn new(
        base: Currency,
        rates: impl IntoIterator<Item = (Currency, Decimal)>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            base,
            rates: rates
                .into_iter()
                .filter(|(_, rate)| *rate > Decimal::ZERO)
                .collect(),
            last_updated,
        }
    }

    pub fn rate(&self, currency: Currency) -> Option<Decimal> {
        if currency == self.base {
            Some(Decimal::ONE)
        } else {
            self.rates.get(&currency).copied()
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        now - self.last_updated > interval
    }
}

/// Where rate tables come from.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<ExchangeRateTable, ConversionError>;
}

/// Rate table shared by validation and display paths.
pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    table: RwLock<Option<ExchangeRateTable>>,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    refresh_interval: chrono::Duration,
    display_currency: Currency,
    formats: FormatCache,
}

impl CurrencyConverter {
    pub fn new(
        source: Arc<dyn RateSource>,
        refresh_interval: Duration,
        display_currency: Currency,
    ) -> Self {
        Self {
            source,
            table: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            refresh_interval: chrono::Duration::from_std(refresh_interval)
                .unwrap_or(chrono::Duration::MAX),
            display_currency,
            formats: FormatCache::new(DEFAULT_FORMAT_CACHE_CAPACITY),
        }
    }

    pub fn display_currency(&self) -> Currency {
        self.display_currency
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        let guard = self.table.read().ok()?;
        let table: Option<&ExchangeRateTable> = guard.as_ref();
        table.map(|t| t.last_updated)
    }

    pub fn is_stale(&self) -> bool {
        let Ok(guard) = self.table.read() else {
            return true;
        };
        let table: Option<&ExchangeRateTable> = guard.as_ref();
        table.map_or(true, |t| t.is_stale(Utc::now(), self.refresh_interval))
    }

    /// Replace the rate table and drop every cached format.
    pub fn install(&self, table: ExchangeRateTable) {
        if let Ok(mut current) = self.table.write() {
            *current = Some(table);
            self.formats.clear();
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Fetch a new table from the source.
    ///
    /// If another caller completed a refresh while this one was waiting for
    /// the lock, returns without fetching.
    pub async fn refresh(&self) -> Result<(), ConversionError> {
        let seen = self.generation();
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != seen {
            return Ok(());
        }

        match self.source.fetch().await {
            Ok(table) => {
                info!(
                    base = %table.base,
                    rates = table.rates.len(),
                    "Exchange rates refreshed"
                );
                self.install(table);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Exchange rate refresh failed");
                Err(ConversionError::RefreshFailed(e.to_string()))
            }
        }
    }

    /// Convert using the current table. Never refreshes.
    pub fn convert(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> Result<Decimal, ConversionError> {
        if from == to {
            return Ok(amount);
        }
        let guard = self.table.read().map_err(|_| ConversionError::StaleRates {
            last_updated: None,
        })?;
        let table: &ExchangeRateTable = guard
            .as_ref()
            .ok_or(ConversionError::StaleRates { last_updated: None })?;
        if table.is_stale(Utc::now(), self.refresh_interval) {
            return Err(ConversionError::StaleRates {
                last_updated: Some(table.last_updated),
            });
        }
        convert_with(table, amount, from, to)
    }

    /// Convert, refreshing first if the table is stale.
    pub async fn convert_fresh(
        &self,
        amount: Decimal,
        from: Currency,
        to: Currency,
    ) -> Result<Decimal, ConversionError> {
        match self.convert(amount, from, to) {
            Err(ConversionError::StaleRates { .. }) => {
                self.refresh().await?;
                self.convert(amount, from, to)
            }
            other => other,
        }
    }

    /// Refresh every `refresh_interval` until `shutdown` fires.
    ///
    /// ```rust,ignore
    /// tokio::spawn(Arc::clone(&converter).run_refresh(shutdown.clone()));
    /// ```
    pub async fn run_refresh(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self
            .refresh_interval
            .to_std()
            .unwrap_or(Duration::from_secs(3600));
        info!(interval_secs = period.as_secs(), "Exchange rate refresher starting");

        loop {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Scheduled rate refresh failed; keeping previous table");
            }

            tokio::select! {
                _ = tokio::time::sleep(period) => {},
                _ = shutdown.cancelled() => {
                    info!("Exchange rate refresher shutting down");
                    return;
                }
            }
        }
    }

    /// Display string for an amount, e.g. `₪180.00 (≈ $49.32)`.
    ///
    /// The equivalent is omitted while rates are missing or stale. Only
    /// strings built from a fresh table are cached.
    pub fn format(&self, amount: Decimal, currency: Currency) -> String {
        // Hold the read lock across lookup, compute and insert so a concurrent
        // install cannot clear the cache in between.
        let Ok(guard) = self.table.read() else {
            return format_plain(amount, currency);
        };
        let fresh: Option<&ExchangeRateTable> = guard
            .as_ref()
            .filter(|t| !t.is_stale(Utc::now(), self.refresh_interval));
        let Some(table) = fresh else {
            // Everything cached was built from this table before it aged out.
            self.formats.clear();
            return format_plain(amount, currency);
        };

        if let Some(cached) = self.formats.get(amount, currency) {
            return cached;
        }

        let mut formatted = format_plain(amount, currency);
        if currency != self.display_currency {
            if let Ok(approx) = convert_with(table, amount, currency, self.display_currency) {
                formatted.push_str(" (≈ ");
                formatted.push_str(&format_plain(approx, self.display_currency));
                formatted.push(')');
            }
        }

        self.formats.put(amount, currency, formatted.clone());
        formatted
    }
}

fn convert_with(
    table: &ExchangeRateTable,
    amount: Decimal,
    from: Currency,
    to: Currency,
) -> Result<Decimal, ConversionError> {
    let from_rate = table.rate(from).ok_or(ConversionError::MissingRate(from))?;
    let to_rate = table.rate(to).ok_or(ConversionError::MissingRate(to))?;
    let base_amount = amount
        .checked_div(from_rate)
        .ok_or(ConversionError::MissingRate(from))?;
    let converted = base_amount
        .checked_mul(to_rate)
        .ok_or(ConversionError::MissingRate(to))?;
    Ok(converted.round_dp_with_strategy(to.minor_units(), RoundingStrategy::MidpointAwayFromZero))
}

/// `₪1,234.50` style rendering with thousands separators.
pub fn format_plain(amount: Decimal, currency: Currency) -> String {
    let rounded = amount.round_dp_with_strategy(
        currency.minor_units(),
        RoundingStrategy::MidpointAwayFromZero,
    );
    let text = format!("{:.*}", currency.minor_units() as usize, rounded.abs());
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(f) => format!("{sign}{}{grouped}.{f}", currency.symbol()),
        None => format!("{sign}{}{grouped}", currency.symbol()),
    }
}

// =============================================================================
// Rate Sources
// =============================================================================

/// Fixed rates, stamped with the fetch time. Counts fetches.
pub struct StaticRateSource {
    base: Currency,
    rates: HashMap<Currency, Decimal>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl StaticRateSource {
    pub fn new(base: Currency, rates: impl IntoIterator<Item = (Currency, Decimal)>) -> Self {
        Self {
            base,
            rates: rates.into_iter().collect(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Rates roughly in line with the shekel/dollar/euro/pound market.
    pub fn reference() -> Self {
        Self::new(
            Currency::Usd,
            [
                (Currency::Ils, Decimal::new(365, 2)),
                (Currency::Eur, Decimal::new(92, 2)),
                (Currency::Gbp, Decimal::new(79, 2)),
            ],
        )
    }

    /// Sleep before answering, to widen the refresh window in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch(&self) -> Result<ExchangeRateTable, ConversionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ExchangeRateTable::new(
            self.base,
            self.rates.clone(),
            Utc::now(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    base: String,
    rates: HashMap<String, serde_json::Value>,
}

/// JSON rate feed: `{"base": "USD", "rates": {"ILS": 3.65, ...}}`.
pub struct HttpRateSource {
    url: String,
    http: Client,
}

impl HttpRateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConversionError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            ConversionError::RefreshFailed(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(&self) -> Result<ExchangeRateTable, ConversionError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ConversionError::RefreshFailed(format!("GET {} failed: {e}", self.url)))?;

        if !response.status().is_success() {
            return Err(ConversionError::RefreshFailed(format!(
                "GET {} returned {}",
                self.url,
                response.status()
            )));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| ConversionError::RefreshFailed(format!("invalid rate JSON: {e}")))?;
        parse_rates(body)
    }
}

fn parse_rates(body: RatesResponse) -> Result<ExchangeRateTable, ConversionError> {
    let base = Currency::from_str(&body.base)
        .map_err(|e| ConversionError::RefreshFailed(e.to_string()))?;

    let mut rates = HashMap::new();
    for (code, value) in body.rates {
        // Feeds list far more currencies than we support.
        let Ok(currency) = Currency::from_str(&code) else {
            continue;
        };
        let raw = match &value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)) {
            Ok(rate) => {
                rates.insert(currency, rate);
            }
            Err(e) => {
                warn!(currency = %currency, value = %raw, error = %e, "Skipping unparseable rate");
            }
        }
    }

    Ok(ExchangeRateTable::new(base, rates, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn converter(source: Arc<StaticRateSource>) -> CurrencyConverter {
        CurrencyConverter::new(source, Duration::from_secs(3600), Currency::Usd)
    }

    #[tokio::test]
    async fn convert_before_any_refresh_is_stale() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        assert_eq!(
            conv.convert(dec!(10), Currency::Usd, Currency::Ils),
            Err(ConversionError::StaleRates { last_updated: None })
        );
    }

    #[tokio::test]
    async fn convert_after_refresh() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        conv.refresh().await.unwrap();

        assert_eq!(
            conv.convert(dec!(100), Currency::Usd, Currency::Ils).unwrap(),
            dec!(365.00)
        );
        assert_eq!(
            conv.convert(dec!(365), Currency::Ils, Currency::Usd).unwrap(),
            dec!(100.00)
        );
        // Cross rate through the base currency.
        assert_eq!(
            conv.convert(dec!(92), Currency::Eur, Currency::Gbp).unwrap(),
            dec!(79.00)
        );
    }

    #[tokio::test]
    async fn same_currency_needs_no_rates() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        assert_eq!(
            conv.convert(dec!(18), Currency::Ils, Currency::Ils).unwrap(),
            dec!(18)
        );
    }

    #[tokio::test]
    async fn old_table_is_rejected() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        let old = Utc::now() - chrono::Duration::hours(2);
        conv.install(ExchangeRateTable::new(
            Currency::Usd,
            [(Currency::Ils, dec!(3.65))],
            old,
        ));

        assert!(conv.is_stale());
        assert_eq!(
            conv.convert(dec!(1), Currency::Usd, Currency::Ils),
            Err(ConversionError::StaleRates {
                last_updated: Some(old)
            })
        );
    }

    #[tokio::test]
    async fn convert_fresh_refreshes_stale_table() {
        let source = Arc::new(StaticRateSource::reference());
        let conv = converter(source.clone());

        let value = conv
            .convert_fresh(dec!(10), Currency::Usd, Currency::Ils)
            .await
            .unwrap();
        assert_eq!(value, dec!(36.50));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn missing_rate_is_reported() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        conv.refresh().await.unwrap();
        assert_eq!(
            conv.convert(dec!(10), Currency::Usd, Currency::Chf),
            Err(ConversionError::MissingRate(Currency::Chf))
        );
    }

    #[tokio::test]
    async fn concurrent_refreshes_fetch_once() {
        let source = Arc::new(StaticRateSource::reference().with_delay(Duration::from_millis(50)));
        let conv = Arc::new(converter(source.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let conv = conv.clone();
            handles.push(tokio::spawn(async move { conv.refresh().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(source.fetch_count(), 1);
        assert_eq!(conv.generation(), 1);
    }

    #[tokio::test]
    async fn format_includes_display_equivalent() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        conv.refresh().await.unwrap();

        assert_eq!(conv.format(dec!(365), Currency::Ils), "₪365.00 (≈ $100.00)");
        assert_eq!(conv.format(dec!(1234.5), Currency::Usd), "$1,234.50");
    }

    #[tokio::test]
    async fn refresh_invalidates_formats() {
        let conv = converter(Arc::new(StaticRateSource::reference()));
        conv.install(ExchangeRateTable::new(
            Currency::Usd,
            [(Currency::Ils, dec!(4))],
            Utc::now(),
        ));
        assert_eq!(conv.format(dec!(40), Currency::Ils), "₪40.00 (≈ $10.00)");

        conv.install(ExchangeRateTable::new(
            Currency::Usd,
            [(Currency::Ils, dec!(5))],
            Utc::now(),
        ));
        assert_eq!(conv.format(dec!(40), Currency::Ils), "₪40.00 (≈ $8.00)");
    }

    #[tokio::test]
    async fn stale_rates_drop_cached_equivalent() {
        let conv = CurrencyConverter::new(
            Arc::new(StaticRateSource::reference()),
            Duration::from_millis(50),
            Currency::Usd,
        );
        conv.install(ExchangeRateTable::new(
            Currency::Usd,
            [(Currency::Ils, dec!(4))],
            Utc::now(),
        ));
        assert_eq!(conv.format(dec!(40), Currency::Ils), "₪40.00 (≈ $10.00)");
        assert!(!conv.formats.is_empty());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(conv.is_stale());
        assert_eq!(conv.format(dec!(40), Currency::Ils), "₪40.00");
        assert!(conv.formats.is_empty());
    }

    #[test]
    fn format_plain_groups_thousands() {
        assert_eq!(format_plain(dec!(0.5), Currency::Eur), "€0.50");
        assert_eq!(format_plain(dec!(1000), Currency::Gbp), "£1,000.00");
        assert_eq!(format_plain(dec!(250000), Currency::Ils), "₪250,000.00");
    }

    #[test]
    fn parse_rates_skips_unknown_codes() {
        let body: RatesResponse = serde_json::from_str(
            r#"{"base":"USD","rates":{"ILS":3.65,"EUR":"0.92","JPY":150.1}}"#,
        )
        .unwrap();
        let table = parse_rates(body).unwrap();
        assert_eq!(table.base, Currency::Usd);
        assert_eq!(table.rate(Currency::Ils), Some(dec!(3.65)));
        assert_eq!(table.rate(Currency::Eur), Some(dec!(0.92)));
        assert_eq!(table.rates.len(), 2);
    }
}
