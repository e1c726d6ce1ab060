//! Settlement Orchestrator
//!
//! Drives one purchase through quote -> ledger insert -> transfer ->
//! attach -> status check. The ledger row is written before any money
//! moves and its id is the transfer idempotency key, so a retried `settle`
//! can never charge twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::error::{LedgerError, ProviderError, SettlementError};
use super::ledger::PurchaseLedger;
use super::provider::PaymentProvider;
use super::state::PurchaseState;
use super::types::{
    ListingId, PurchaseId, PurchaseRecord, SettlementOutcome, TransferStatus, UserId,
};
use crate::listing::{Listing, ListingStore};

/// Failure reason written when a stale attempt is replaced
pub const SUPERSEDED_REASON: &str = "superseded by a newer attempt";

const NOT_SUBMITTED_REASON: &str = "transfer not submitted, retry settlement";

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Currency of listing prices and payouts
    pub currency: String,
    /// Active records older than this may be superseded
    pub stale_after: Duration,
    /// Upper bound on one provider call, retries included
    pub provider_call_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            stale_after: Duration::from_secs(15 * 60),
            provider_call_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of the transfer step
enum TransferStep {
    /// Record is TRANSFER_REQUESTED with this transfer id
    Requested(String),
    /// Record changed under us; report this instead
    Finished(Result<SettlementOutcome, SettlementError>),
}

type PairKey = (ListingId, UserId);
type LeaseTable = DashMap<PairKey, Arc<Mutex<()>>>;

/// Held for the duration of one settle/recheck on a pair
struct PairLease<'a> {
    leases: &'a LeaseTable,
    key: PairKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Nobody else holds or waits on the lock: forget it
        self.leases
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct SettlementOrchestrator {
    ledger: Arc<dyn PurchaseLedger>,
    listings: Arc<dyn ListingStore>,
    provider: Arc<dyn PaymentProvider>,
    config: SettlementConfig,
    leases: LeaseTable,
}

impl SettlementOrchestrator {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        listings: Arc<dyn ListingStore>,
        provider: Arc<dyn PaymentProvider>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            listings,
            provider,
            config,
            leases: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn PurchaseLedger> {
        &self.ledger
    }

    pub fn listings(&self) -> &Arc<dyn ListingStore> {
        &self.listings
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Pairs with a settle or recheck currently running
    pub fn active_leases(&self) -> usize {
        self.leases.len()
    }

    /// Settle a purchase of `listing_id` by `buyer_id`.
    ///
    /// Returns `Settled` or `Pending`; everything else is a
    /// [`SettlementError`]. A concurrent call for the same pair fails fast
    /// with `InProgress`.
    pub async fn settle(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let Some(_lease) = self.try_lease((listing_id, buyer_id)) else {
            debug!(listing_id = %listing_id, buyer_id = %buyer_id, "Settle already running for pair");
            return Err(SettlementError::InProgress { purchase_id: None });
        };

        let listing = self.load_listing(listing_id).await?;
        if listing.seller_id == buyer_id {
            return Err(SettlementError::SelfPurchase);
        }
        if !listing.status.is_purchasable() {
            return Err(SettlementError::ListingUnavailable(listing_id));
        }

        if let Some(settled) = self.ledger.find_settled(listing_id, buyer_id).await? {
            debug!(purchase_id = %settled.id, "Pair already settled");
            return Ok(SettlementOutcome::Settled {
                purchase_id: settled.id,
            });
        }

        let resume = match self.ledger.find_active(listing_id, buyer_id).await? {
            Some(record) if record.is_stale(Utc::now(), self.config.stale_after) => {
                warn!(
                    purchase_id = %record.id,
                    state = %record.state,
                    "Superseding stale purchase attempt"
                );
                match self.ledger.mark_failed(record.id, SUPERSEDED_REASON).await {
                    Ok(()) => None,
                    Err(LedgerError::InvalidTransition { .. }) => {
                        // Finished concurrently (recovery sweep)
                        return self.current_outcome(record.id).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(record) if record.state == PurchaseState::TransferRequested => {
                return Err(SettlementError::InProgress {
                    purchase_id: Some(record.id),
                });
            }
            Some(record) => {
                info!(purchase_id = %record.id, "Resuming initiated purchase");
                Some(record)
            }
            None => None,
        };

        // Quote before any ledger write
        let amount = resume.as_ref().map_or(listing.price, |r| r.amount);
        let currency = self.config.currency.as_str();
        let quote = match self
            .call_provider(
                "create_quote",
                self.provider.create_quote(amount, currency, currency),
            )
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                warn!(listing_id = %listing_id, error = %e, "Quote failed");
                let purchase_id = resume.as_ref().map(|r| r.id);
                if let (Some(id), false) = (purchase_id, e.is_retryable()) {
                    self.fail_record(id, &e.to_string()).await?;
                }
                return Err(SettlementError::from_provider(&e, purchase_id));
            }
        };

        let record = match resume {
            Some(record) => record,
            None => match self.ledger.insert(listing_id, buyer_id, amount).await {
                Ok(record) => {
                    info!(
                        purchase_id = %record.id,
                        listing_id = %listing_id,
                        buyer_id = %buyer_id,
                        amount = %amount,
                        "Purchase initiated"
                    );
                    record
                }
                Err(LedgerError::Conflict) => {
                    return self.insert_conflict_outcome(listing_id, buyer_id).await;
                }
                Err(e) => return Err(e.into()),
            },
        };

        let transfer_id = match self.submit_transfer(&record, &listing, &quote.id).await? {
            TransferStep::Requested(transfer_id) => transfer_id,
            TransferStep::Finished(outcome) => return outcome,
        };

        self.confirm(record.id, &transfer_id).await
    }

    /// Re-check a purchase after `Pending` (or any time).
    ///
    /// Polls the provider only for TRANSFER_REQUESTED records; the answer for
    /// terminal records comes straight from the ledger.
    pub async fn recheck(
        &self,
        purchase_id: PurchaseId,
    ) -> Result<SettlementOutcome, SettlementError> {
        let record = self
            .ledger
            .get(purchase_id)
            .await?
            .ok_or(SettlementError::PurchaseNotFound(purchase_id))?;

        let Some(_lease) = self.try_lease((record.listing_id, record.buyer_id)) else {
            return Err(SettlementError::InProgress {
                purchase_id: Some(purchase_id),
            });
        };

        // Re-read under the lease
        let record = self
            .ledger
            .get(purchase_id)
            .await?
            .ok_or(SettlementError::PurchaseNotFound(purchase_id))?;

        match (record.state, record.transfer_id.as_deref()) {
            (PurchaseState::TransferRequested, Some(transfer_id)) => {
                self.confirm(record.id, transfer_id).await
            }
            (PurchaseState::TransferRequested, None) => {
                error!(purchase_id = %record.id, "TRANSFER_REQUESTED record has no transfer id");
                Err(SettlementError::Storage(format!(
                    "Purchase {} has no transfer id",
                    record.id
                )))
            }
            _ => Self::outcome_of(&record),
        }
    }

    fn try_lease(&self, key: PairKey) -> Option<PairLease<'_>> {
        let lock = self.leases.entry(key).or_default().clone();
        let guard = lock.try_lock_owned().ok();
        let lease = PairLease {
            leases: &self.leases,
            key,
            guard,
        };
        // Dropping a guard-less lease still cleans up the table entry
        lease.guard.is_some().then_some(lease)
    }

    async fn load_listing(&self, listing_id: ListingId) -> Result<Listing, SettlementError> {
        self.listings
            .get_listing(listing_id)
            .await
            .map_err(|e| SettlementError::Storage(e.to_string()))?
            .ok_or(SettlementError::ListingNotFound(listing_id))
    }

    /// Another instance took the pair between our checks and the insert
    async fn insert_conflict_outcome(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<SettlementOutcome, SettlementError> {
        if let Some(settled) = self.ledger.find_settled(listing_id, buyer_id).await? {
            return Ok(SettlementOutcome::Settled {
                purchase_id: settled.id,
            });
        }
        let active = self.ledger.find_active(listing_id, buyer_id).await?;
        Err(SettlementError::InProgress {
            purchase_id: active.map(|r| r.id),
        })
    }

    /// Step 4: submit the transfer keyed by the record id
    async fn submit_transfer(
        &self,
        record: &PurchaseRecord,
        listing: &Listing,
        quote_id: &str,
    ) -> Result<TransferStep, SettlementError> {
        let reference = format!("Purchase for code listing {}", listing.id);
        let result = self
            .call_provider(
                "create_transfer",
                self.provider.create_transfer(
                    quote_id,
                    record.id,
                    &listing.seller_account(),
                    &reference,
                ),
            )
            .await;

        let handle = match result {
            Ok(handle) => handle,
            Err(e @ ProviderError::Rejected(_)) => {
                warn!(purchase_id = %record.id, error = %e, "Transfer rejected");
                self.fail_record(record.id, &e.to_string()).await?;
                return Err(SettlementError::from_provider(&e, Some(record.id)));
            }
            Err(e) => {
                warn!(
                    purchase_id = %record.id,
                    error = %e,
                    "Transfer not confirmed, record stays INITIATED"
                );
                return Err(SettlementError::from_provider(&e, Some(record.id)));
            }
        };

        match self
            .ledger
            .attach_transfer(record.id, &handle.transfer_id)
            .await
        {
            Ok(()) => {
                info!(
                    purchase_id = %record.id,
                    transfer_id = %handle.transfer_id,
                    provider = self.provider.name(),
                    "Transfer requested"
                );
                Ok(TransferStep::Requested(handle.transfer_id))
            }
            Err(e @ LedgerError::InvalidTransition { .. }) => {
                error!(purchase_id = %record.id, error = %e, "Attach transfer raced");
                Ok(TransferStep::Finished(self.current_outcome(record.id).await))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Step 5: poll the provider and finalize the record
    async fn confirm(
        &self,
        id: PurchaseId,
        transfer_id: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        let status = self
            .call_provider(
                "get_transfer_status",
                self.provider.get_transfer_status(transfer_id),
            )
            .await;

        match status {
            Ok(TransferStatus::Completed) => match self.ledger.mark_settled(id).await {
                Ok(()) => {
                    info!(purchase_id = %id, transfer_id = %transfer_id, "Purchase settled");
                    Ok(SettlementOutcome::Settled { purchase_id: id })
                }
                Err(e @ LedgerError::InvalidTransition { .. }) => {
                    error!(purchase_id = %id, error = %e, "Mark settled raced");
                    self.current_outcome(id).await
                }
                Err(e) => Err(e.into()),
            },
            Ok(TransferStatus::Failed) => {
                let reason = format!("Transfer {} failed at provider", transfer_id);
                warn!(purchase_id = %id, transfer_id = %transfer_id, "Transfer failed");
                self.fail_record(id, &reason).await?;
                Err(SettlementError::failed(false, reason, Some(id)))
            }
            Ok(TransferStatus::Pending) => {
                debug!(purchase_id = %id, transfer_id = %transfer_id, "Transfer pending");
                Ok(SettlementOutcome::Pending { purchase_id: id })
            }
            Err(e @ ProviderError::Unavailable(_)) => {
                warn!(purchase_id = %id, error = %e, "Status check unavailable, reporting pending");
                Ok(SettlementOutcome::Pending { purchase_id: id })
            }
            Err(e @ ProviderError::Rejected(_)) => {
                warn!(purchase_id = %id, error = %e, "Status check rejected");
                self.fail_record(id, &e.to_string()).await?;
                Err(SettlementError::from_provider(&e, Some(id)))
            }
        }
    }

    /// Mark failed; a record already FAILED is fine, anything else is logged
    async fn fail_record(&self, id: PurchaseId, reason: &str) -> Result<(), SettlementError> {
        match self.ledger.mark_failed(id, reason).await {
            Ok(()) => Ok(()),
            Err(e @ LedgerError::InvalidTransition { .. }) => {
                error!(purchase_id = %id, error = %e, "Mark failed raced");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn current_outcome(&self, id: PurchaseId) -> Result<SettlementOutcome, SettlementError> {
        let record = self
            .ledger
            .get(id)
            .await?
            .ok_or(SettlementError::PurchaseNotFound(id))?;
        Self::outcome_of(&record)
    }

    /// Outcome reported for a record without asking the provider
    fn outcome_of(record: &PurchaseRecord) -> Result<SettlementOutcome, SettlementError> {
        match record.state {
            PurchaseState::Settled => Ok(SettlementOutcome::Settled {
                purchase_id: record.id,
            }),
            PurchaseState::TransferRequested => Ok(SettlementOutcome::Pending {
                purchase_id: record.id,
            }),
            PurchaseState::Failed => Err(SettlementError::failed(
                false,
                record
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "purchase failed".to_string()),
                Some(record.id),
            )),
            PurchaseState::Initiated => Err(SettlementError::failed(
                true,
                NOT_SUBMITTED_REASON,
                Some(record.id),
            )),
        }
    }

    /// Bound one provider call; an elapsed timeout counts as unavailable
    async fn call_provider<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.config.provider_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    provider = self.provider.name(),
                    timeout_ms = self.config.provider_call_timeout.as_millis() as u64,
                    "Provider call timed out"
                );
                Err(ProviderError::Unavailable(format!("{} timed out", op)))
            }
        }
    }
}
