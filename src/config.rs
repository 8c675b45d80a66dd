// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup by [`EngineConfig::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `MAX_ATTEMPTS` | Gateway attempts per donation | `5` |
//! | `RETRY_BASE_DELAY_MS` | First retry delay | `500` |
//! | `RETRY_MAX_DELAY_MS` | Retry delay cap | `30000` |
//! | `MAX_SYNC_ATTEMPTS` | Backend sync attempts per donation | `10` |
//! | `SYNC_INTERVAL_SECS` | Periodic queue drain interval | `30` |
//! | `RATE_REFRESH_SECS` | Exchange rate staleness interval | `3600` |
//! | `RATES_URL` | Exchange rate feed (`{base, rates}` JSON) | Built-in reference rates |
//! | `DISPLAY_CURRENCY` | Currency shown next to every amount | `USD` |
//! | `GENERAL_GATEWAY_URL` | Multi-currency provider base URL | Sandbox gateway |
//! | `GENERAL_GATEWAY_API_KEY` | Bearer token for the general provider | Optional |
//! | `RESTRICTED_GATEWAY_URL` | ILS provider base URL | Sandbox gateway |
//! | `RESTRICTED_GATEWAY_API_KEY` | Bearer token for the ILS provider | Optional |
//! | `BACKEND_URL` | System of record base URL | In-memory backend |
//! | `BACKEND_API_KEY` | Bearer token for the system of record | Optional |
//! | `BLACKOUT_WINDOW` | Weekly closed window, e.g. `fri 16:00 - sat 20:00 +02:00` | None |
//! | `HTTP_TIMEOUT_SECS` | Timeout for outbound HTTP calls | `15` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::currency::Currency;
use crate::executor::RetryPolicy;
use crate::sync::SyncPolicy;
use crate::validation::WeeklyBlackout;

/// Directory holding the redb database file.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// `json` for production log shipping, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const MAX_ATTEMPTS_ENV: &str = "MAX_ATTEMPTS";
pub const RETRY_BASE_DELAY_MS_ENV: &str = "RETRY_BASE_DELAY_MS";
pub const RETRY_MAX_DELAY_MS_ENV: &str = "RETRY_MAX_DELAY_MS";
pub const MAX_SYNC_ATTEMPTS_ENV: &str = "MAX_SYNC_ATTEMPTS";
pub const SYNC_INTERVAL_SECS_ENV: &str = "SYNC_INTERVAL_SECS";

pub const RATE_REFRESH_SECS_ENV: &str = "RATE_REFRESH_SECS";
pub const RATES_URL_ENV: &str = "RATES_URL";
pub const DISPLAY_CURRENCY_ENV: &str = "DISPLAY_CURRENCY";

pub const GENERAL_GATEWAY_URL_ENV: &str = "GENERAL_GATEWAY_URL";
pub const GENERAL_GATEWAY_API_KEY_ENV: &str = "GENERAL_GATEWAY_API_KEY";
pub const RESTRICTED_GATEWAY_URL_ENV: &str = "RESTRICTED_GATEWAY_URL";
pub const RESTRICTED_GATEWAY_API_KEY_ENV: &str = "RESTRICTED_GATEWAY_API_KEY";
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";
pub const BACKEND_API_KEY_ENV: &str = "BACKEND_API_KEY";

/// Weekly compliance window. Unset means always open.
pub const BLACKOUT_WINDOW_ENV: &str = "BLACKOUT_WINDOW";
pub const HTTP_TIMEOUT_SECS_ENV: &str = "HTTP_TIMEOUT_SECS";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Outbound HTTP endpoint with optional bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub json_logs: bool,
    pub retry: RetryPolicy,
    pub sync: SyncPolicy,
    pub sync_interval: Duration,
    pub rate_refresh: Duration,
    pub rates_url: Option<String>,
    pub display_currency: Currency,
    pub general_gateway: Option<Endpoint>,
    pub restricted_gateway: Option<Endpoint>,
    pub backend: Option<Endpoint>,
    pub blackout: Option<WeeklyBlackout>,
    pub http_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            json_logs: false,
            retry: RetryPolicy::default(),
            sync: SyncPolicy::default(),
            sync_interval: Duration::from_secs(30),
            rate_refresh: Duration::from_secs(3600),
            rates_url: None,
            display_currency: Currency::Usd,
            general_gateway: None,
            restricted_gateway: None,
            backend: None,
            blackout: None,
            http_timeout: Duration::from_secs(15),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, MAX_ATTEMPTS_ENV, defaults.retry.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                RETRY_BASE_DELAY_MS_ENV,
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &get,
                RETRY_MAX_DELAY_MS_ENV,
                defaults.retry.max_delay.as_millis() as u64,
            )?),
        };
        if retry.max_attempts == 0 {
            return Err(invalid(MAX_ATTEMPTS_ENV, "0", "must be at least 1"));
        }

        let sync = SyncPolicy {
            max_sync_attempts: parse_or(
                &get,
                MAX_SYNC_ATTEMPTS_ENV,
                defaults.sync.max_sync_attempts,
            )?,
            base_delay: retry.base_delay,
            max_delay: retry.max_delay,
        };

        let endpoint = |url_name: &'static str, key_name: &str| {
            get(url_name)
                .map(|raw| {
                    Ok::<_, ConfigError>(Endpoint {
                        url: parse_url(url_name, &raw)?,
                        api_key: get(key_name),
                    })
                })
                .transpose()
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: get(HOST_ENV).unwrap_or(defaults.host),
            port: parse_or(&get, PORT_ENV, defaults.port)?,
            json_logs: get(LOG_FORMAT_ENV).is_some_and(|f| f.eq_ignore_ascii_case("json")),
            retry,
            sync,
            sync_interval: Duration::from_secs(parse_or(
                &get,
                SYNC_INTERVAL_SECS_ENV,
                defaults.sync_interval.as_secs(),
            )?),
            rate_refresh: Duration::from_secs(parse_or(
                &get,
                RATE_REFRESH_SECS_ENV,
                defaults.rate_refresh.as_secs(),
            )?),
            rates_url: get(RATES_URL_ENV)
                .map(|raw| parse_url(RATES_URL_ENV, &raw))
                .transpose()?,
            display_currency: parse_or(&get, DISPLAY_CURRENCY_ENV, defaults.display_currency)?,
            general_gateway: endpoint(GENERAL_GATEWAY_URL_ENV, GENERAL_GATEWAY_API_KEY_ENV)?,
            restricted_gateway: endpoint(RESTRICTED_GATEWAY_URL_ENV, RESTRICTED_GATEWAY_API_KEY_ENV)?,
            backend: endpoint(BACKEND_URL_ENV, BACKEND_API_KEY_ENV)?,
            blackout: get(BLACKOUT_WINDOW_ENV)
                .map(|raw| {
                    raw.parse::<WeeklyBlackout>()
                        .map_err(|e| invalid(BLACKOUT_WINDOW_ENV, &raw, e))
                })
                .transpose()?,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                HTTP_TIMEOUT_SECS_ENV,
                defaults.http_timeout.as_secs(),
            )?),
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::DATABASE_FILE)
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e| invalid(name, &raw, e)),
        None => Ok(default),
    }
}

/// Absolute http(s) URL, returned without a trailing slash.
fn parse_url(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(raw).map_err(|e| invalid(name, raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(name, raw, "scheme must be http or https"));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn invalid(name: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
