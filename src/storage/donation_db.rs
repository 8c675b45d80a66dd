// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded donation database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `donations`: donation id → serialized [`Donation`] (JSON, audit trail included)
//! - `sync_queue`: donation id → serialized [`SyncQueueEntry`]
//!
//! A donation is written before any gateway call and every status change is
//! persisted before the next step runs, so a crash never loses a record.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::models::Donation;
use crate::sync::SyncQueueEntry;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: donation id → serialized Donation (JSON bytes).
const DONATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("donations");

/// Offline queue: donation id → serialized SyncQueueEntry (JSON bytes).
const SYNC_QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_queue");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// DonationStore
// =============================================================================

/// Durable store for donations and the offline sync queue.
pub struct DonationStore {
    db: Database,
}

impl DonationStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DONATIONS)?;
            let _ = write_txn.open_table(SYNC_QUEUE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Donations
    // =========================================================================

    /// Insert or replace a donation.
    pub fn save(&self, donation: &Donation) -> StoreResult<()> {
        let json = serde_json::to_vec(donation)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DONATIONS)?;
            table.insert(donation.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<Donation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DONATIONS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DONATIONS)?;
        Ok(table.get(id)?.is_some())
    }

    /// All donations, oldest first.
    pub fn list(&self) -> StoreResult<Vec<Donation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DONATIONS)?;
        let mut donations = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            donations.push(serde_json::from_slice::<Donation>(value.value())?);
        }
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(donations)
    }

    /// Abandoned donations and unresolved backend conflicts, oldest first.
    pub fn list_attention_required(&self) -> StoreResult<Vec<Donation>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(Donation::needs_attention)
            .collect())
    }

    // =========================================================================
    // Sync Queue
    // =========================================================================

    /// Persist the donation and queue it in one write transaction.
    ///
    /// An existing queue entry is kept as is so its attempt count survives.
    pub fn save_and_enqueue(&self, donation: &Donation, entry: &SyncQueueEntry) -> StoreResult<()> {
        let donation_json = serde_json::to_vec(donation)?;
        let entry_json = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut donations = write_txn.open_table(DONATIONS)?;
            donations.insert(donation.id.as_str(), donation_json.as_slice())?;

            let mut queue = write_txn.open_table(SYNC_QUEUE)?;
            let exists = queue.get(entry.donation_id.as_str())?.is_some();
            if !exists {
                queue.insert(entry.donation_id.as_str(), entry_json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Persist the donation and drop its queue entry in one write transaction.
    pub fn save_and_dequeue(&self, donation: &Donation) -> StoreResult<()> {
        let json = serde_json::to_vec(donation)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut donations = write_txn.open_table(DONATIONS)?;
            donations.insert(donation.id.as_str(), json.as_slice())?;

            let mut queue = write_txn.open_table(SYNC_QUEUE)?;
            queue.remove(donation.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Persist the donation together with an updated queue entry.
    pub fn save_with_entry(&self, donation: &Donation, entry: &SyncQueueEntry) -> StoreResult<()> {
        let donation_json = serde_json::to_vec(donation)?;
        let entry_json = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut donations = write_txn.open_table(DONATIONS)?;
            donations.insert(donation.id.as_str(), donation_json.as_slice())?;

            let mut queue = write_txn.open_table(SYNC_QUEUE)?;
            queue.insert(entry.donation_id.as_str(), entry_json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn update_entry(&self, entry: &SyncQueueEntry) -> StoreResult<()> {
        let json = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut queue = write_txn.open_table(SYNC_QUEUE)?;
            queue.insert(entry.donation_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn dequeue(&self, donation_id: &str) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut queue = write_txn.open_table(SYNC_QUEUE)?;
            queue.remove(donation_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn queue_entry(&self, donation_id: &str) -> StoreResult<Option<SyncQueueEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_QUEUE)?;
        match table.get(donation_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Queue entries in FIFO order of donation creation.
    pub fn queued(&self) -> StoreResult<Vec<SyncQueueEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_QUEUE)?;
        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            entries.push(serde_json::from_slice::<SyncQueueEntry>(value.value())?);
        }
        entries.sort_by(|a, b| {
            a.donation_created_at
                .cmp(&b.donation_created_at)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
                .then_with(|| a.donation_id.cmp(&b.donation_id))
        });
        Ok(entries)
    }

    pub fn queue_len(&self) -> StoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_QUEUE)?;
        Ok(table.len()? as usize)
    }
}
