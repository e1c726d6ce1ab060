//! Purchase Ledger
//!
//! Durable record of purchase attempts. Single source of truth for
//! "has this buyer paid for this listing".
//!
//! # Contract
//!
//! - `insert` is atomic and refuses a second active row for the same
//!   (listing, buyer) pair, or any new row once the pair is SETTLED
//!   ([`LedgerError::Conflict`]).
//! - State updates are compare-and-swap on the current state.
//! - `mark_settled` / `mark_failed` are idempotent for the same terminal
//!   state; a conflicting terminal state is `InvalidTransition`.
//! - `has_settled_purchase` only ever sees committed SETTLED rows.

pub mod db;
pub mod memory;

pub use db::PgLedger;
pub use memory::MemoryLedger;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::types::{ListingId, PurchaseId, PurchaseRecord, UserId};

#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Open a new INITIATED record with a fresh id.
    /// `Conflict` if the pair has an active or SETTLED record.
    async fn insert(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
        amount: Decimal,
    ) -> Result<PurchaseRecord, LedgerError>;

    /// INITIATED -> TRANSFER_REQUESTED, recording the provider transfer id
    async fn attach_transfer(
        &self,
        id: PurchaseId,
        transfer_id: &str,
    ) -> Result<(), LedgerError>;

    /// TRANSFER_REQUESTED -> SETTLED
    async fn mark_settled(&self, id: PurchaseId) -> Result<(), LedgerError>;

    /// INITIATED | TRANSFER_REQUESTED -> FAILED
    async fn mark_failed(&self, id: PurchaseId, reason: &str) -> Result<(), LedgerError>;

    async fn has_settled_purchase(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<bool, LedgerError>;

    async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, LedgerError>;

    /// The INITIATED / TRANSFER_REQUESTED record for the pair, if any
    async fn find_active(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<PurchaseRecord>, LedgerError>;

    /// The SETTLED record for the pair, if any
    async fn find_settled(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<PurchaseRecord>, LedgerError>;

    /// TRANSFER_REQUESTED records untouched for at least `min_idle` and
    /// created less than `stale_after` ago, oldest first. Input of the
    /// recovery sweep; `limit` counts only eligible rows.
    async fn find_transfer_requested(
        &self,
        min_idle: Duration,
        stale_after: Duration,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, LedgerError>;
}
