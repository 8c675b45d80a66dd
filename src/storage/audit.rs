// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-donation audit trail.
//!
//! Every lifecycle transition and every reconciliation event is appended to
//! the donation's trail in the same record write that changes its state.
//! Entries are never edited or removed; compliance reporting reads them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::lifecycle::DonationStatus;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Lifecycle transitions
    Validated,
    Submitting,
    Completed,
    Failed,
    PendingSync,
    Abandoned,
    Cancelled,

    // Backend reconciliation
    SyncAcknowledged,
    SyncConflict,
    SyncAbandoned,
}

impl AuditEventType {
    /// Event recorded when a donation enters `status`.
    pub fn for_status(status: DonationStatus) -> Option<Self> {
        match status {
            DonationStatus::Draft => None,
            DonationStatus::Validated => Some(Self::Validated),
            DonationStatus::Submitting => Some(Self::Submitting),
            DonationStatus::Completed => Some(Self::Completed),
            DonationStatus::Failed => Some(Self::Failed),
            DonationStatus::PendingSync => Some(Self::PendingSync),
            DonationStatus::Abandoned => Some(Self::Abandoned),
            DonationStatus::Cancelled => Some(Self::Cancelled),
        }
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AuditEntry {
    /// Position in the trail, starting at 1.
    pub sequence: u32,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Status before the transition (absent for non-transition events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<DonationStatus>,
    /// Status after the transition (absent for non-transition events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_status: Option<DonationStatus>,
    /// Free-form detail (gateway reference, error message, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn is_transition(&self) -> bool {
        self.to_status.is_some()
    }
}

/// Append-only sequence of audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditEntry>);

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transition(
        &mut self,
        from: DonationStatus,
        to: DonationStatus,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        if let Some(event_type) = AuditEventType::for_status(to) {
            self.push(event_type, Some(from), Some(to), detail, at);
        }
    }

    pub(crate) fn record_event(
        &mut self,
        event_type: AuditEventType,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.push(event_type, None, None, detail, at);
    }

    fn push(
        &mut self,
        event_type: AuditEventType,
        from_status: Option<DonationStatus>,
        to_status: Option<DonationStatus>,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        // Clamp so timestamps never run backwards within a trail.
        let timestamp = match self.0.last() {
            Some(last) if last.timestamp > at => last.timestamp,
            _ => at,
        };
        self.0.push(AuditEntry {
            sequence: self.0.len() as u32 + 1,
            timestamp,
            event_type,
            from_status,
            to_status,
            detail,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.0.last()
    }

    pub fn count(&self, event_type: AuditEventType) -> usize {
        self.0.iter().filter(|e| e.event_type == event_type).count()
    }

    /// Sequence of statuses entered, in order.
    pub fn status_path(&self) -> Vec<DonationStatus> {
        self.0.iter().filter_map(|e| e.to_status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_numbered_in_order() {
        let mut trail = AuditTrail::new();
        let now = Utc::now();
        trail.record_transition(DonationStatus::Draft, DonationStatus::Validated, None, now);
        trail.record_transition(
            DonationStatus::Validated,
            DonationStatus::Submitting,
            None,
            now,
        );
        trail.record_event(AuditEventType::SyncAcknowledged, Some("srv-1".into()), now);

        let seq: Vec<u32> = trail.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(seq, vec![1, 2, 3]);
        assert_eq!(
            trail.status_path(),
            vec![DonationStatus::Validated, DonationStatus::Submitting]
        );
        assert!(!trail.last().unwrap().is_transition());
    }

    #[test]
    fn timestamps_never_run_backwards() {
        let mut trail = AuditTrail::new();
        let now = Utc::now();
        trail.record_transition(DonationStatus::Draft, DonationStatus::Validated, None, now);
        trail.record_transition(
            DonationStatus::Validated,
            DonationStatus::Cancelled,
            None,
            now - chrono::Duration::seconds(10),
        );
        assert_eq!(trail.entries()[1].timestamp, now);
    }

    #[test]
    fn count_by_type() {
        let mut trail = AuditTrail::new();
        let now = Utc::now();
        trail.record_transition(DonationStatus::Submitting, DonationStatus::Failed, None, now);
        trail.record_transition(DonationStatus::Failed, DonationStatus::PendingSync, None, now);
        trail.record_transition(DonationStatus::PendingSync, DonationStatus::Submitting, None, now);
        trail.record_transition(DonationStatus::Submitting, DonationStatus::Failed, None, now);
        assert_eq!(trail.count(AuditEventType::Failed), 2);
        assert_eq!(trail.count(AuditEventType::PendingSync), 1);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut trail = AuditTrail::new();
        trail.record_event(AuditEventType::SyncConflict, Some("ref mismatch".into()), Utc::now());
        let json = serde_json::to_value(&trail).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["event_type"], "sync_conflict");
        assert!(json[0].get("to_status").is_none());
    }
}
