// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state lives in a single redb file under `DATA_DIR`:
//!
//! ```text
//! {DATA_DIR}/
//!   donations.redb
//!     donations    # id → Donation (with its audit trail)
//!     sync_queue   # id → SyncQueueEntry
//! ```
//!
//! The audit trail is stored inside each donation record, so the record and
//! its history are always written in the same transaction.

pub mod audit;
pub mod donation_db;

pub use audit::{AuditEntry, AuditEventType, AuditTrail};
pub use donation_db::{DonationStore, StoreError, StoreResult};

/// Database file name under the data directory.
pub const DATABASE_FILE: &str = "donations.redb";
