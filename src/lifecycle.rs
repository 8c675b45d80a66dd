// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Donation Lifecycle
//!
//! ```text
//!  DRAFT ──► VALIDATED ──► SUBMITTING ──► COMPLETED
//!    │           │    │         │
//!    │           │    │         ▼
//!    │           │    └──► PENDING_SYNC ◄── FAILED ──► ABANDONED
//!    │           │              │            ▲
//!    │           │              └──► SUBMITTING
//!    └───────────┴──► CANCELLED
//! ```
//!
//! Transitions are monotonic; the only backwards edge is the
//! `FAILED → PENDING_SYNC` retry edge.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    /// Built from user input, not yet validated
    Draft,
    /// Passed validation and durably persisted
    Validated,
    /// A gateway call is in flight
    Submitting,
    /// Charged; the gateway transaction reference is recorded
    Completed,
    /// The last gateway attempt failed
    Failed,
    /// Waiting in the offline queue for a (re)submission
    PendingSync,
    /// No more automatic attempts will be made
    Abandoned,
    /// Withdrawn by the donor before any gateway call
    Cancelled,
}

impl Default for DonationStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl DonationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DonationStatus::Completed | DonationStatus::Abandoned | DonationStatus::Cancelled
        )
    }

    /// Cancellation is honoured only before a gateway call can be in flight.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, DonationStatus::Draft | DonationStatus::Validated)
    }

    pub fn can_transition_to(&self, to: DonationStatus) -> bool {
        use DonationStatus::*;
        matches!(
            (self, to),
            (Draft, Validated)
                | (Draft, Cancelled)
                | (Validated, Submitting)
                | (Validated, PendingSync)
                | (Validated, Cancelled)
                | (Submitting, Completed)
                | (Submitting, Failed)
                | (Failed, PendingSync)
                | (Failed, Abandoned)
                | (PendingSync, Submitting)
        )
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DonationStatus::Draft => "DRAFT",
            DonationStatus::Validated => "VALIDATED",
            DonationStatus::Submitting => "SUBMITTING",
            DonationStatus::Completed => "COMPLETED",
            DonationStatus::Failed => "FAILED",
            DonationStatus::PendingSync => "PENDING_SYNC",
            DonationStatus::Abandoned => "ABANDONED",
            DonationStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: DonationStatus,
        to: DonationStatus,
    },

    #[error("completion requires a gateway transaction reference")]
    MissingTransactionRef,
}

#[cfg(test)]
mod tests {
    use super::DonationStatus::*;
    use super::*;

    const ALL: [DonationStatus; 8] = [
        Draft,
        Validated,
        Submitting,
        Completed,
        Failed,
        PendingSync,
        Abandoned,
        Cancelled,
    ];

    #[test]
    fn happy_path_edges() {
        assert!(Draft.can_transition_to(Validated));
        assert!(Validated.can_transition_to(Submitting));
        assert!(Submitting.can_transition_to(Completed));
    }

    #[test]
    fn retry_loop_edges() {
        assert!(Submitting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(PendingSync));
        assert!(PendingSync.can_transition_to(Submitting));
        assert!(Failed.can_transition_to(Abandoned));
    }

    #[test]
    fn offline_entry_skips_submitting() {
        assert!(Validated.can_transition_to(PendingSync));
    }

    #[test]
    fn no_skips_or_reversals() {
        assert!(!Draft.can_transition_to(Submitting));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Validated.can_transition_to(Completed));
        assert!(!Submitting.can_transition_to(Validated));
        assert!(!Submitting.can_transition_to(PendingSync));
        assert!(!PendingSync.can_transition_to(Completed));
        assert!(!Submitting.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Completed, Abandoned, Cancelled] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn cancellable_only_before_submission() {
        let cancellable: Vec<_> = ALL.into_iter().filter(|s| s.is_cancellable()).collect();
        assert_eq!(cancellable, vec![Draft, Validated]);
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&PendingSync).unwrap(),
            r#""PENDING_SYNC""#
        );
    }
}
