// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sync Engine
//!
//! Owns the offline queue. A drain walks the queue in FIFO order of donation
//! creation and, per entry:
//!
//! | Stored status                         | Action                                   |
//! |---------------------------------------|------------------------------------------|
//! | `PENDING_SYNC`, `FAILED`, `SUBMITTING`| re-execute through the executor          |
//! | `COMPLETED`, not acknowledged         | push to the backend                      |
//! | `ABANDONED`, `CANCELLED`              | dequeue                                  |
//!
//! Only one drain runs at a time. Entries whose backoff has not elapsed, or
//! whose donation is claimed by another caller, are reported as still pending
//! without being touched. Executor errors and transient backend errors share
//! one attempt budget per entry; once `max_sync_attempts` is spent the entry
//! is dropped and the donation is flagged for attention.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

use super::{Connectivity, DrainReport, SyncError, SyncQueueEntry, SystemOfRecord};
use crate::executor::{capped_backoff, ExecutionOutcome, TransactionExecutor};
use crate::lifecycle::DonationStatus;
use crate::models::Donation;
use crate::storage::{AuditEventType, DonationStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Backend attempts before a completed donation is given up on.
    pub max_sync_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_sync_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl SyncPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        capped_backoff(self.base_delay, self.max_delay, attempt)
    }
}

enum Bucket {
    Succeeded,
    StillPending,
    Abandoned,
    Conflict,
}

pub struct SyncEngine {
    store: Arc<DonationStore>,
    executor: Arc<TransactionExecutor>,
    backend: Arc<dyn SystemOfRecord>,
    connectivity: Connectivity,
    policy: SyncPolicy,
    drain_lock: Mutex<()>,
    work_available: Arc<Notify>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<DonationStore>,
        executor: Arc<TransactionExecutor>,
        backend: Arc<dyn SystemOfRecord>,
        connectivity: Connectivity,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            store,
            executor,
            backend,
            connectivity,
            policy,
            drain_lock: Mutex::new(()),
            work_available: Arc::new(Notify::new()),
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Signalled whenever something is enqueued.
    pub fn work_available(&self) -> Arc<Notify> {
        Arc::clone(&self.work_available)
    }

    /// Persist the donation and add it to the queue in one write.
    pub fn enqueue(&self, donation: &Donation) -> StoreResult<()> {
        self.store
            .save_and_enqueue(donation, &SyncQueueEntry::new(donation))?;
        info!(donation_id = %donation.id, status = %donation.status, "Donation queued for sync");
        self.work_available.notify_one();
        Ok(())
    }

    pub fn pending_count(&self) -> StoreResult<usize> {
        self.store.queue_len()
    }

    /// Process every due queue entry once.
    pub async fn drain(&self) -> StoreResult<DrainReport> {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();
        let entries = self.store.queued()?;
        if entries.is_empty() {
            return Ok(report);
        }
        info!(count = entries.len(), online = self.connectivity.is_online(), "Draining sync queue");

        for entry in entries {
            let id = entry.donation_id.clone();
            let bucket = self.process(entry).await?;
            match bucket {
                Bucket::Succeeded => report.succeeded.push(id),
                Bucket::StillPending => report.still_pending.push(id),
                Bucket::Abandoned => report.abandoned.push(id),
                Bucket::Conflict => report.conflicts.push(id),
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            still_pending = report.still_pending.len(),
            abandoned = report.abandoned.len(),
            conflicts = report.conflicts.len(),
            "Sync drain finished"
        );
        Ok(report)
    }

    async fn process(&self, entry: SyncQueueEntry) -> StoreResult<Bucket> {
        if !entry.is_due(Utc::now()) {
            return Ok(Bucket::StillPending);
        }

        // Read under the claim so a concurrent cancel or submit is not
        // overwritten by a stale copy.
        let Some(claim) = self.executor.try_claim(&entry.donation_id) else {
            return Ok(Bucket::StillPending);
        };
        let Some(mut donation) = self.store.get(&entry.donation_id)? else {
            warn!(donation_id = %entry.donation_id, "Queued donation missing from store");
            self.store.dequeue(&entry.donation_id)?;
            return Ok(Bucket::Abandoned);
        };

        match donation.status {
            DonationStatus::Validated
            | DonationStatus::PendingSync
            | DonationStatus::Failed
            | DonationStatus::Submitting => {
                if !self.connectivity.is_online() {
                    return Ok(Bucket::StillPending);
                }
                match self.executor.execute(&claim, &mut donation).await {
                    Ok(ExecutionOutcome::Completed) => self.reconcile(entry, donation).await,
                    Ok(ExecutionOutcome::Deferred) => Ok(Bucket::StillPending),
                    Ok(ExecutionOutcome::Abandoned) => {
                        self.store.dequeue(&donation.id)?;
                        Ok(Bucket::Abandoned)
                    }
                    Err(e) => {
                        error!(donation_id = %donation.id, error = %e, "Queued donation failed to execute");
                        self.back_off_or_give_up(entry, donation, e.to_string())
                    }
                }
            }
            DonationStatus::Completed => {
                if donation.server_id.is_some() {
                    self.store.dequeue(&donation.id)?;
                    Ok(Bucket::Succeeded)
                } else if donation.sync_conflict.is_some() {
                    self.store.dequeue(&donation.id)?;
                    Ok(Bucket::Conflict)
                } else {
                    self.reconcile(entry, donation).await
                }
            }
            DonationStatus::Abandoned | DonationStatus::Cancelled | DonationStatus::Draft => {
                self.store.dequeue(&donation.id)?;
                Ok(Bucket::Abandoned)
            }
        }
    }

    /// Push a completed donation to the backend.
    async fn reconcile(
        &self,
        entry: SyncQueueEntry,
        mut donation: Donation,
    ) -> StoreResult<Bucket> {
        if !self.connectivity.is_online() {
            return Ok(Bucket::StillPending);
        }

        match self.backend.sync_donation(&donation).await {
            Ok(ack) => {
                info!(donation_id = %donation.id, server_id = %ack.server_id, "Backend acknowledged donation");
                donation.record_event(AuditEventType::SyncAcknowledged, Some(ack.server_id.clone()));
                donation.server_id = Some(ack.server_id);
                self.store.save_and_dequeue(&donation)?;
                Ok(Bucket::Succeeded)
            }
            Err(e @ (SyncError::Conflict(_) | SyncError::Rejected(_))) => {
                warn!(donation_id = %donation.id, error = %e, "Backend conflict; keeping local record");
                donation.record_event(AuditEventType::SyncConflict, Some(e.to_string()));
                donation.sync_conflict = Some(e.to_string());
                self.store.save_and_dequeue(&donation)?;
                Ok(Bucket::Conflict)
            }
            Err(e @ SyncError::Transient(_)) => {
                self.back_off_or_give_up(entry, donation, e.to_string())
            }
        }
    }

    /// Count a failed attempt against the entry. Past `max_sync_attempts`
    /// the entry is dropped and the donation flagged with `SyncAbandoned`.
    fn back_off_or_give_up(
        &self,
        mut entry: SyncQueueEntry,
        mut donation: Donation,
        reason: String,
    ) -> StoreResult<Bucket> {
        entry.attempt_count += 1;
        entry.last_error = Some(reason.clone());
        donation.last_error = Some(reason.clone());
        if entry.attempt_count >= self.policy.max_sync_attempts {
            warn!(
                donation_id = %donation.id,
                status = %donation.status,
                attempts = entry.attempt_count,
                error = %reason,
                "Giving up on queued donation"
            );
            donation.record_event(AuditEventType::SyncAbandoned, Some(reason));
            self.store.save_and_dequeue(&donation)?;
            return Ok(Bucket::Abandoned);
        }
        entry.next_attempt_at = Some(self.next_attempt(entry.attempt_count));
        self.store.save_with_entry(&donation, &entry)?;
        Ok(Bucket::StillPending)
    }

    fn next_attempt(&self, attempt: u32) -> chrono::DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.policy.backoff(attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        Utc::now() + delay
    }
}
