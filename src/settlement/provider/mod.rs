//! Payment Provider
//!
//! Typed seam to the external payment network. Implementations never touch
//! the ledger.
//!
//! All three operations are safe to repeat: a quote has no side effect,
//! a transfer is keyed by the purchase id, and a status check is a read.

#[cfg(any(test, feature = "mock-provider"))]
pub mod mock;
pub mod wise;

#[cfg(any(test, feature = "mock-provider"))]
pub use mock::ScriptedProvider;
pub use wise::{WiseClient, WiseConfig};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::ProviderError;
use super::types::{PurchaseId, Quote, TransferHandle, TransferStatus};

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Price `amount` in `source_currency` paid out in `target_currency`
    async fn create_quote(
        &self,
        amount: Decimal,
        source_currency: &str,
        target_currency: &str,
    ) -> Result<Quote, ProviderError>;

    /// Submit a transfer against a quote.
    ///
    /// # Idempotency
    /// `idempotency_key` is the purchase record id. A repeated call with the
    /// same key must return the original transfer and never charge twice.
    async fn create_transfer(
        &self,
        quote_id: &str,
        idempotency_key: PurchaseId,
        destination_account: &str,
        reference: &str,
    ) -> Result<TransferHandle, ProviderError>;

    /// Current status of a submitted transfer. Unknown id is `Rejected`.
    async fn get_transfer_status(&self, transfer_id: &str)
    -> Result<TransferStatus, ProviderError>;
}
