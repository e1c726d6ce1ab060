//! In-memory purchase ledger
//!
//! Single-process ledger for development and tests. One async mutex guards
//! the whole table, so the active-row check and the insert are atomic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::debug;

use super::PurchaseLedger;
use crate::settlement::error::LedgerError;
use crate::settlement::state::PurchaseState;
use crate::settlement::types::{ListingId, PurchaseId, PurchaseRecord, UserId};

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<PurchaseId, PurchaseRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by id
    pub async fn records(&self) -> Vec<PurchaseRecord> {
        let records = self.records.lock().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Records for one (listing, buyer) pair
    pub async fn records_for(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Vec<PurchaseRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.listing_id == listing_id && r.buyer_id == buyer_id)
            .collect()
    }

    /// Shift a record's timestamps into the past (simulates elapsed time)
    #[cfg(any(test, feature = "mock-provider"))]
    pub async fn backdate(&self, id: PurchaseId, by: Duration) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        let delta = chrono::Duration::from_std(by)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        record.created_at -= delta;
        record.updated_at -= delta;
        Ok(())
    }

    /// CAS transition shared by all state updates.
    ///
    /// A call that finds the record already in `to` is a no-op when
    /// `is_replay` accepts it, and an invalid transition otherwise.
    async fn transition(
        &self,
        id: PurchaseId,
        to: PurchaseState,
        apply: impl FnOnce(&mut PurchaseRecord),
        is_replay: impl FnOnce(&PurchaseRecord) -> bool,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;

        if record.state == to && is_replay(&*record) {
            debug!(purchase_id = %id, state = %to, "Ledger transition replayed (no-op)");
            return Ok(());
        }

        if !record.state.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                id,
                from: record.state,
                to,
            });
        }

        record.state = to;
        record.updated_at = Utc::now();
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl PurchaseLedger for MemoryLedger {
    async fn insert(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
        amount: Decimal,
    ) -> Result<PurchaseRecord, LedgerError> {
        let mut records = self.records.lock().await;

        let pair_taken = records.values().any(|r| {
            r.listing_id == listing_id
                && r.buyer_id == buyer_id
                && (r.state.is_active() || r.state == PurchaseState::Settled)
        });
        if pair_taken {
            return Err(LedgerError::Conflict);
        }

        let record = PurchaseRecord::new(listing_id, buyer_id, amount);
        if records.contains_key(&record.id) {
            return Err(LedgerError::Storage(format!(
                "Duplicate purchase id generated: {}",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn attach_transfer(
        &self,
        id: PurchaseId,
        transfer_id: &str,
    ) -> Result<(), LedgerError> {
        self.transition(
            id,
            PurchaseState::TransferRequested,
            |r| r.transfer_id = Some(transfer_id.to_string()),
            |r| r.transfer_id.as_deref() == Some(transfer_id),
        )
        .await
    }

    async fn mark_settled(&self, id: PurchaseId) -> Result<(), LedgerError> {
        self.transition(id, PurchaseState::Settled, |_| {}, |_| true)
            .await
    }

    async fn mark_failed(&self, id: PurchaseId, reason: &str) -> Result<(), LedgerError> {
        self.transition(
            id,
            PurchaseState::Failed,
            |r| r.failure_reason = Some(reason.to_string()),
            |_| true,
        )
        .await
    }

    async fn has_settled_purchase(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<bool, LedgerError> {
        Ok(self.find_settled(listing_id, buyer_id).await?.is_some())
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, LedgerError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn find_active(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<PurchaseRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .find(|r| r.listing_id == listing_id && r.buyer_id == buyer_id && r.state.is_active())
            .cloned())
    }

    async fn find_settled(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<PurchaseRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .find(|r| {
                r.listing_id == listing_id
                    && r.buyer_id == buyer_id
                    && r.state == PurchaseState::Settled
            })
            .cloned())
    }

    async fn find_transfer_requested(
        &self,
        min_idle: Duration,
        stale_after: Duration,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let now = Utc::now();
        let records = self.records.lock().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|r| r.state == PurchaseState::TransferRequested)
            .filter(|r| (now - r.updated_at).to_std().unwrap_or(Duration::ZERO) >= min_idle)
            .filter(|r| !r.is_stale(now, stale_after))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.updated_at);
        found.truncate(limit);
        Ok(found)
    }
}
