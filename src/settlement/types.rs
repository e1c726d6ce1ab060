//! Settlement core types

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub use crate::core_types::{ListingId, PurchaseId, UserId};

use super::state::PurchaseState;

/// One purchase attempt, as stored in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    /// Listing price at the time of purchase
    pub amount: Decimal,
    /// Provider transfer id, set when the row enters TRANSFER_REQUESTED
    pub transfer_id: Option<String>,
    pub state: PurchaseState,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// New INITIATED record with a fresh id
    pub fn new(listing_id: ListingId, buyer_id: UserId, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: PurchaseId::new(),
            listing_id,
            buyer_id,
            amount,
            transfer_id: None,
            state: PurchaseState::Initiated,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Time since the attempt was opened (zero if the clock went backwards)
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// An active record older than `stale_after` may be superseded
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.state.is_active() && self.age(now) >= stale_after
    }
}

/// Provider-issued quote. Lives only for the duration of one settle call.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub id: String,
    pub source_amount: Decimal,
    pub source_currency: String,
    pub target_currency: String,
}

/// Provider acknowledgement of a transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    pub transfer_id: String,
}

/// Provider-side transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Non-error result of `settle` / `recheck`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    /// Money moved, record SETTLED, buyer has access
    Settled { purchase_id: PurchaseId },
    /// Transfer submitted but not confirmed yet; call `recheck` later
    Pending { purchase_id: PurchaseId },
}

impl SettlementOutcome {
    pub fn purchase_id(&self) -> PurchaseId {
        match self {
            SettlementOutcome::Settled { purchase_id }
            | SettlementOutcome::Pending { purchase_id } => *purchase_id,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled { .. } => "SETTLED",
            SettlementOutcome::Pending { .. } => "PENDING",
        }
    }
}
