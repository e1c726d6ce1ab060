//! Settlement Error Types
//!
//! Three layers:
//! - [`ProviderError`]: payment network failures (transient vs terminal)
//! - [`LedgerError`]: purchase ledger failures
//! - [`SettlementError`]: what `settle` / `recheck` surface to the storefront

use thiserror::Error;

use crate::core_types::{ListingId, PurchaseId};

use super::state::PurchaseState;

/// Payment provider call failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network error, timeout, 5xx or 429. Safe to retry with the same key.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    /// 4xx or contract violation. Never retry.
    #[error("Payment provider rejected request: {0}")]
    Rejected(String),
}

impl ProviderError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

/// Purchase ledger failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),

    /// The (listing, buyer) pair already has an active or settled record
    #[error("Purchase already exists for this listing and buyer")]
    Conflict,

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: PurchaseId,
        from: PurchaseState,
        to: PurchaseState,
    },

    #[error("Purchase record not found: {0}")]
    NotFound(PurchaseId),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => LedgerError::Conflict,
            _ => LedgerError::Storage(e.to_string()),
        }
    }
}

/// Error surfaced by the settlement entry points
///
/// The storefront distinguishes retryable failures ("try again") from
/// terminal ones (show reason). `Pending` is not an error, see
/// [`super::types::SettlementOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Buyer cannot purchase their own listing")]
    SelfPurchase,

    #[error("Listing not found: {0}")]
    ListingNotFound(ListingId),

    #[error("Listing is not available for purchase: {0}")]
    ListingUnavailable(ListingId),

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    /// Another attempt for the same (listing, buyer) pair is active
    #[error("Settlement already in progress")]
    InProgress { purchase_id: Option<PurchaseId> },

    #[error("Settlement failed: {reason}")]
    Failed {
        retryable: bool,
        reason: String,
        purchase_id: Option<PurchaseId>,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SettlementError {
    pub fn failed(retryable: bool, reason: impl Into<String>, purchase_id: Option<PurchaseId>) -> Self {
        SettlementError::Failed {
            retryable,
            reason: reason.into(),
            purchase_id,
        }
    }

    /// Provider failure before or after a ledger row exists
    pub fn from_provider(e: &ProviderError, purchase_id: Option<PurchaseId>) -> Self {
        SettlementError::failed(e.is_retryable(), e.to_string(), purchase_id)
    }

    /// Whether the caller may retry `settle` for the same pair
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Failed { retryable, .. } => *retryable,
            SettlementError::Storage(_) => true,
            _ => false,
        }
    }

    pub fn purchase_id(&self) -> Option<PurchaseId> {
        match self {
            SettlementError::InProgress { purchase_id }
            | SettlementError::Failed { purchase_id, .. } => *purchase_id,
            SettlementError::PurchaseNotFound(id) => Some(*id),
            _ => None,
        }
    }

    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::SelfPurchase => "SELF_PURCHASE",
            SettlementError::ListingNotFound(_) => "LISTING_NOT_FOUND",
            SettlementError::ListingUnavailable(_) => "LISTING_UNAVAILABLE",
            SettlementError::PurchaseNotFound(_) => "PURCHASE_NOT_FOUND",
            SettlementError::InProgress { .. } => "SETTLEMENT_IN_PROGRESS",
            SettlementError::Failed {
                retryable: true, ..
            } => "SETTLEMENT_FAILED_RETRYABLE",
            SettlementError::Failed { .. } => "SETTLEMENT_FAILED",
            SettlementError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            SettlementError::ListingNotFound(_) | SettlementError::PurchaseNotFound(_) => 404,
            SettlementError::InProgress { .. } => 409,
            SettlementError::SelfPurchase
            | SettlementError::ListingUnavailable(_)
            | SettlementError::Failed {
                retryable: false, ..
            } => 422,
            SettlementError::Failed { .. } | SettlementError::Storage(_) => 503,
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Conflict => SettlementError::InProgress { purchase_id: None },
            LedgerError::NotFound(id) => SettlementError::PurchaseNotFound(id),
            LedgerError::Storage(msg) => SettlementError::Storage(msg),
            LedgerError::InvalidTransition { id, from, to } => SettlementError::failed(
                false,
                format!("Invalid transition for {id}: {from} -> {to}"),
                Some(id),
            ),
        }
    }
}
