// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Gateways
//!
//! The engine talks to exactly two providers: a general multi-currency
//! processor and a restricted single-currency one. Both sit behind
//! [`PaymentGateway`] so the executor never knows which wire format it uses.
//!
//! Every charge carries the donation id as idempotency key. Providers are
//! expected to return the original result when they see a key twice.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::Gateway;
use crate::routing::GatewayRequest;

pub mod http;
pub mod scripted;

pub use http::HttpGateway;
pub use scripted::ScriptedGateway;

/// Successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub transaction_ref: String,
}

/// Failed charge, classified by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
    /// Transient failures (network, timeout, provider overload) are retried;
    /// declines and malformed requests are not.
    pub retryable: bool,
}

impl GatewayError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn terminal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// The two configured providers.
#[derive(Clone)]
pub struct Gateways {
    general: Arc<dyn PaymentGateway>,
    restricted: Arc<dyn PaymentGateway>,
}

impl Gateways {
    pub fn new(general: Arc<dyn PaymentGateway>, restricted: Arc<dyn PaymentGateway>) -> Self {
        Self {
            general,
            restricted,
        }
    }

    pub fn get(&self, gateway: Gateway) -> &Arc<dyn PaymentGateway> {
        match gateway {
            Gateway::General => &self.general,
            Gateway::Restricted => &self.restricted,
        }
    }
}
