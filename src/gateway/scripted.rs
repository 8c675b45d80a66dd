// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process gateway with scripted outcomes.
//!
//! Used as the sandbox provider when no gateway URL is configured, and by
//! tests. It deduplicates on the idempotency key like a real provider:
//! charging the same key twice returns the first reference without a second
//! charge.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GatewayError, GatewayResponse, PaymentGateway};
use crate::routing::GatewayRequest;

#[derive(Default)]
struct Script {
    queued: VecDeque<GatewayError>,
    always: Option<GatewayError>,
    charged: HashMap<String, String>,
}

pub struct ScriptedGateway {
    prefix: String,
    delay: Duration,
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delay: Duration::ZERO,
            script: Mutex::new(Script::default()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next call with `error`; calls queue in order.
    pub fn fail_next(&self, error: GatewayError) {
        if let Ok(mut script) = self.script.lock() {
            script.queued.push_back(error);
        }
    }

    /// Fail every call with `error` until [`Self::recover`] is called.
    pub fn fail_always(&self, error: GatewayError) {
        if let Ok(mut script) = self.script.lock() {
            script.always = Some(error);
        }
    }

    pub fn recover(&self) {
        if let Ok(mut script) = self.script.lock() {
            script.always = None;
            script.queued.clear();
        }
    }

    /// Calls received, including failed and deduplicated ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct successful charges.
    pub fn charge_count(&self) -> usize {
        self.script.lock().map(|s| s.charged.len()).unwrap_or(0)
    }

    pub fn was_charged(&self, idempotency_key: &str) -> bool {
        self.script
            .lock()
            .map(|s| s.charged.contains_key(idempotency_key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut script = self
            .script
            .lock()
            .map_err(|_| GatewayError::transient("unavailable", "gateway state poisoned"))?;

        if let Some(existing) = script.charged.get(&request.idempotency_key) {
            return Ok(GatewayResponse {
                transaction_ref: existing.clone(),
            });
        }
        if let Some(error) = script.queued.pop_front() {
            return Err(error);
        }
        if let Some(error) = &script.always {
            return Err(error.clone());
        }

        let transaction_ref = format!("{}_{call:06}", self.prefix);
        script
            .charged
            .insert(request.idempotency_key.clone(), transaction_ref.clone());
        Ok(GatewayResponse { transaction_ref })
    }
}
