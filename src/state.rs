// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state and engine wiring.
//!
//! [`Collaborators`] are the external seams (store, gateways, backend, rate
//! feed, compliance policy). [`AppState::assemble`] wires them into the
//! executor, sync engine and service. Tests pass in-process fakes; `main`
//! builds them from [`EngineConfig`].

use std::sync::Arc;

use tracing::warn;

use crate::config::{EngineConfig, Endpoint};
use crate::currency::{
    ConversionError, CurrencyConverter, CurrencyRules, HttpRateSource, RateSource,
    StaticRateSource,
};
use crate::executor::TransactionExecutor;
use crate::gateway::{GatewayError, Gateways, HttpGateway, PaymentGateway, ScriptedGateway};
use crate::models::Gateway;
use crate::routing::{GatewayCapabilities, GatewayRouter};
use crate::service::DonationService;
use crate::storage::DonationStore;
use crate::sync::{
    Connectivity, HttpSystemOfRecord, InMemoryBackend, SyncEngine, SyncError, SystemOfRecord,
};
use crate::validation::{AlwaysOpen, CompliancePolicy, DonationValidator, RegionRules};

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("backend setup failed: {0}")]
    Backend(#[from] SyncError),

    #[error("rate source setup failed: {0}")]
    Rates(#[from] ConversionError),
}

/// External collaborators of the engine.
pub struct Collaborators {
    pub store: Arc<DonationStore>,
    pub gateways: Gateways,
    pub backend: Arc<dyn SystemOfRecord>,
    pub rates: Arc<dyn RateSource>,
    pub compliance: Arc<dyn CompliancePolicy>,
}

impl Collaborators {
    /// HTTP adapters where a URL is configured, in-process stand-ins elsewhere.
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<DonationStore>,
    ) -> Result<Self, WiringError> {
        let gateways = Gateways::new(
            gateway_for(Gateway::General, config.general_gateway.as_ref(), config)?,
            gateway_for(Gateway::Restricted, config.restricted_gateway.as_ref(), config)?,
        );

        let backend: Arc<dyn SystemOfRecord> = match &config.backend {
            Some(endpoint) => Arc::new(HttpSystemOfRecord::new(
                endpoint.url.clone(),
                endpoint.api_key.clone(),
                config.http_timeout,
            )?),
            None => {
                warn!("BACKEND_URL not set; using in-memory system of record");
                Arc::new(InMemoryBackend::new())
            }
        };

        let rates: Arc<dyn RateSource> = match &config.rates_url {
            Some(url) => Arc::new(HttpRateSource::new(url.clone(), config.http_timeout)?),
            None => {
                warn!("RATES_URL not set; using built-in reference rates");
                Arc::new(StaticRateSource::reference())
            }
        };

        let compliance: Arc<dyn CompliancePolicy> = match &config.blackout {
            Some(window) => Arc::new(window.clone()),
            None => Arc::new(AlwaysOpen),
        };

        Ok(Self {
            store,
            gateways,
            backend,
            rates,
            compliance,
        })
    }
}

fn gateway_for(
    gateway: Gateway,
    endpoint: Option<&Endpoint>,
    config: &EngineConfig,
) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
    match endpoint {
        Some(endpoint) => Ok(Arc::new(HttpGateway::new(
            gateway,
            endpoint.url.clone(),
            endpoint.api_key.clone(),
            config.http_timeout,
        )?)),
        None => {
            warn!(%gateway, "Gateway URL not set; using sandbox gateway");
            Ok(Arc::new(ScriptedGateway::new(format!("sandbox_{gateway}"))))
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DonationService>,
    pub store: Arc<DonationStore>,
}

impl AppState {
    pub fn assemble(
        config: &EngineConfig,
        collaborators: Collaborators,
        connectivity: Connectivity,
    ) -> Self {
        let Collaborators {
            store,
            gateways,
            backend,
            rates,
            compliance,
        } = collaborators;

        let capabilities = GatewayCapabilities::default();
        let router = GatewayRouter::new(capabilities.clone());
        let validator = DonationValidator::new(
            Arc::new(CurrencyRules::default()),
            capabilities,
            RegionRules::default(),
            compliance,
        );
        let executor = Arc::new(TransactionExecutor::new(
            Arc::clone(&store),
            gateways,
            router.clone(),
            config.retry,
            connectivity.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&executor),
            backend,
            connectivity.clone(),
            config.sync,
        ));
        let converter = Arc::new(CurrencyConverter::new(
            rates,
            config.rate_refresh,
            config.display_currency,
        ));
        let service = Arc::new(DonationService::new(
            Arc::clone(&store),
            validator,
            router,
            executor,
            sync,
            converter,
            connectivity,
        ));

        Self { service, store }
    }
}
