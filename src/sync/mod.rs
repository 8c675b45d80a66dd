// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Offline Queue & Synchronization
//!
//! Donations that could not reach a gateway, and completed donations the
//! backend has not acknowledged yet, wait in the durable `sync_queue` table.
//! [`SyncEngine::drain`] works through it in creation order; [`SyncWorker`]
//! triggers drains in the background.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Donation;

pub mod backend;
pub mod connectivity;
pub mod engine;
pub mod worker;

pub use backend::{HttpSystemOfRecord, InMemoryBackend, SyncAck, SyncError, SystemOfRecord};
pub use connectivity::Connectivity;
pub use engine::{SyncEngine, SyncPolicy};
pub use worker::SyncWorker;

/// Queue entry. References the donation by id; the stored donation record is
/// the only authoritative copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub donation_id: String,
    /// FIFO ordering key.
    pub donation_created_at: DateTime<Utc>,
    /// Backend sync attempts (gateway attempts are counted on the donation).
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncQueueEntry {
    pub fn new(donation: &Donation) -> Self {
        Self {
            donation_id: donation.id.clone(),
            donation_created_at: donation.created_at,
            attempt_count: 0,
            next_attempt_at: None,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Where each queued donation ended up after one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DrainReport {
    pub succeeded: Vec<String>,
    pub still_pending: Vec<String>,
    pub abandoned: Vec<String>,
    pub conflicts: Vec<String>,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.still_pending.len() + self.abandoned.len() + self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
