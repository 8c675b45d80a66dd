// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP adapter for a payment provider.
//!
//! `POST {base_url}/charges` with the provider-specific JSON body built by
//! [`GatewayRequest::payload`] and an `Idempotency-Key` header. Network
//! errors, 408, 429 and 5xx are retryable; any other 4xx is a decline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{GatewayError, GatewayResponse, PaymentGateway};
use crate::models::Gateway;
use crate::routing::GatewayRequest;

const CHARGES_PATH: &str = "/charges";

#[derive(Debug, Clone)]
pub struct HttpGateway {
    gateway: Gateway,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl HttpGateway {
    pub fn new(
        gateway: Gateway,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            GatewayError::terminal("client_build", format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            gateway,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn charge(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let url = format!("{}{}", self.base_url, CHARGES_PATH);
        debug!(gateway = %self.gateway, donation_id = %request.idempotency_key, "Submitting charge");

        let mut builder = self
            .http
            .post(&url)
            .header("Idempotency-Key", request.idempotency_key.as_str())
            .json(&request.payload());
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            let code = if e.is_timeout() { "timeout" } else { "network" };
            GatewayError::transient(code, format!("POST {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(gateway = %self.gateway, %status, "Charge rejected by provider");
            return Err(classify_status(status, &body));
        }

        let body: Value = response.json().await.map_err(|e| {
            GatewayError::transient("invalid_response", format!("POST {url} invalid JSON: {e}"))
        })?;
        let transaction_ref = extract_reference(&body).ok_or_else(|| {
            GatewayError::transient("invalid_response", "missing transaction reference in response")
        })?;

        Ok(GatewayResponse { transaction_ref })
    }
}

/// Map a non-success HTTP status to a gateway error.
pub fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = format!("provider returned {status}: {body}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::transient(format!("http_{}", status.as_u16()), message)
    } else {
        let code = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("http_{}", status.as_u16()));
        GatewayError::terminal(code, message)
    }
}

/// Providers name the reference differently; accept the common spellings.
fn extract_reference(body: &Value) -> Option<String> {
    ["id", "transaction_id", "reference"]
        .iter()
        .find_map(|key| body.get(*key))
        .and_then(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
