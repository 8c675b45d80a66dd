// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backend system of record.
//!
//! Completed donations are pushed with the donation id as idempotency key.
//! A conflict means the server already holds a different record for this id;
//! the local record is never overwritten in that case.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::models::Donation;

const DONATIONS_PATH: &str = "/donations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAck {
    pub server_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("backend holds a conflicting record: {0}")]
    Conflict(String),

    #[error("backend rejected the donation: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Transient(String),
}

#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    async fn sync_donation(&self, donation: &Donation) -> Result<SyncAck, SyncError>;
}

// =============================================================================
// HTTP backend
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpSystemOfRecord {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl HttpSystemOfRecord {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl SystemOfRecord for HttpSystemOfRecord {
    async fn sync_donation(&self, donation: &Donation) -> Result<SyncAck, SyncError> {
        let url = format!("{}{}", self.base_url, DONATIONS_PATH);
        debug!(donation_id = %donation.id, "Pushing donation to backend");

        let mut builder = self
            .http
            .post(&url)
            .header("Idempotency-Key", donation.id.as_str())
            .json(donation);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("POST {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::Transient(format!("POST {url} invalid JSON: {e}")))?;
        let server_id = ["server_id", "id"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::Transient("missing server id in response".to_string()))?;

        Ok(SyncAck {
            server_id: server_id.to_string(),
        })
    }
}

/// Map a non-success HTTP status to a sync error.
pub fn classify_status(status: StatusCode, body: String) -> SyncError {
    let message = format!("{status}: {body}");
    if status == StatusCode::CONFLICT {
        SyncError::Conflict(message)
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        SyncError::Transient(message)
    } else {
        SyncError::Rejected(message)
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Backend kept in process memory.
///
/// Stands in for the system of record when `BACKEND_URL` is unset, and in
/// tests. Acknowledging the same id twice returns the same server id.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    records: HashMap<String, String>,
    conflicts: HashMap<String, String>,
    failures: VecDeque<SyncError>,
    calls: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the backend report a conflict for `donation_id`.
    pub fn insert_conflict(&self, donation_id: impl Into<String>, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.conflicts.insert(donation_id.into(), reason.into());
        }
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: SyncError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(error);
        }
    }

    pub fn server_id(&self, donation_id: &str) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.records.get(donation_id).cloned())
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().map(|s| s.calls).unwrap_or(0)
    }
}

#[async_trait]
impl SystemOfRecord for InMemoryBackend {
    async fn sync_donation(&self, donation: &Donation) -> Result<SyncAck, SyncError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SyncError::Transient("backend state poisoned".to_string()))?;
        state.calls += 1;

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        if let Some(reason) = state.conflicts.get(&donation.id) {
            return Err(SyncError::Conflict(reason.clone()));
        }

        let next = state.records.len() + 1;
        let server_id = state
            .records
            .entry(donation.id.clone())
            .or_insert_with(|| format!("srv-{next}"))
            .clone();
        Ok(SyncAck { server_id })
    }
}
