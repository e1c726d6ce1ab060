//! Scripted payment provider
//!
//! In-process provider for tests and `provider.mode: mock`. Each operation
//! pops its next outcome from a queue; an empty queue means success.
//! Transfers honour the idempotency contract: the same key returns the same
//! transfer id and is charged once.
//!
//! Charges and the transfer-call log are bounded: past `retention` entries
//! the oldest are evicted, so a long-running mock-mode server stays flat.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::PaymentProvider;
use crate::settlement::error::ProviderError;
use crate::settlement::types::{PurchaseId, Quote, TransferHandle, TransferStatus};

/// One charge accepted by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub idempotency_key: PurchaseId,
    pub transfer_id: String,
    pub destination_account: String,
    pub reference: String,
}

/// Default number of charges and transfer calls remembered
pub const DEFAULT_RETENTION: usize = 10_000;

/// Charges keyed by idempotency key, with insertion order for eviction
#[derive(Default)]
struct ChargeBook {
    by_key: HashMap<PurchaseId, Charge>,
    order: VecDeque<PurchaseId>,
}

pub struct ScriptedProvider {
    quote_script: Mutex<VecDeque<Result<(), ProviderError>>>,
    transfer_script: Mutex<VecDeque<Result<(), ProviderError>>>,
    status_script: Mutex<VecDeque<Result<TransferStatus, ProviderError>>>,
    /// Status once the script is drained
    default_status: Mutex<Option<TransferStatus>>,
    quote_delay: Mutex<Option<Duration>>,
    charges: Mutex<ChargeBook>,
    transfer_keys: Mutex<VecDeque<PurchaseId>>,
    retention: usize,
    next_transfer_id: AtomicU64,
    quote_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            quote_script: Mutex::default(),
            transfer_script: Mutex::default(),
            status_script: Mutex::default(),
            default_status: Mutex::default(),
            quote_delay: Mutex::default(),
            charges: Mutex::default(),
            transfer_keys: Mutex::default(),
            retention: retention.max(1),
            next_transfer_id: AtomicU64::new(0),
            quote_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_quote(&self, outcome: Result<(), ProviderError>) -> &Self {
        self.quote_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_transfer(&self, outcome: Result<(), ProviderError>) -> &Self {
        self.transfer_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_status(&self, outcome: Result<TransferStatus, ProviderError>) -> &Self {
        self.status_script.lock().unwrap().push_back(outcome);
        self
    }

    /// Status returned when the status script is empty (default: Completed)
    pub fn set_default_status(&self, status: TransferStatus) {
        *self.default_status.lock().unwrap() = Some(status);
    }

    /// Sleep inside every quote call (widens race windows in tests)
    pub fn set_quote_delay(&self, delay: Duration) {
        *self.quote_delay.lock().unwrap() = Some(delay);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Idempotency keys of every transfer call, in call order
    pub fn transfer_keys(&self) -> Vec<PurchaseId> {
        self.transfer_keys.lock().unwrap().iter().copied().collect()
    }

    /// Distinct charges (one per idempotency key)
    pub fn charges(&self) -> Vec<Charge> {
        let mut all: Vec<_> = self.charges.lock().unwrap().by_key.values().cloned().collect();
        all.sort_by_key(|c| c.idempotency_key);
        all
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_quote(
        &self,
        amount: Decimal,
        source_currency: &str,
        target_currency: &str,
    ) -> Result<Quote, ProviderError> {
        let n = self.quote_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.quote_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if amount <= Decimal::ZERO {
            return Err(ProviderError::Rejected(format!(
                "Quote amount must be positive, got {}",
                amount
            )));
        }
        let scripted = self.quote_script.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }

        Ok(Quote {
            id: format!("quote-{}", n + 1),
            source_amount: amount,
            source_currency: source_currency.to_string(),
            target_currency: target_currency.to_string(),
        })
    }

    async fn create_transfer(
        &self,
        _quote_id: &str,
        idempotency_key: PurchaseId,
        destination_account: &str,
        reference: &str,
    ) -> Result<TransferHandle, ProviderError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut keys = self.transfer_keys.lock().unwrap();
            keys.push_back(idempotency_key);
            if keys.len() > self.retention {
                keys.pop_front();
            }
        }

        let scripted = self.transfer_script.lock().unwrap().pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }

        let mut book = self.charges.lock().unwrap();
        if let Some(charge) = book.by_key.get(&idempotency_key) {
            return Ok(TransferHandle {
                transfer_id: charge.transfer_id.clone(),
            });
        }

        let charge = Charge {
            idempotency_key,
            transfer_id: format!(
                "tr-{}",
                self.next_transfer_id.fetch_add(1, Ordering::SeqCst) + 1
            ),
            destination_account: destination_account.to_string(),
            reference: reference.to_string(),
        };
        let handle = TransferHandle {
            transfer_id: charge.transfer_id.clone(),
        };
        book.by_key.insert(idempotency_key, charge);
        book.order.push_back(idempotency_key);
        while book.order.len() > self.retention {
            if let Some(evicted) = book.order.pop_front() {
                book.by_key.remove(&evicted);
            }
        }
        Ok(handle)
    }

    async fn get_transfer_status(
        &self,
        transfer_id: &str,
    ) -> Result<TransferStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let known = self
            .charges
            .lock()
            .unwrap()
            .by_key
            .values()
            .any(|c| c.transfer_id == transfer_id);
        if !known {
            return Err(ProviderError::Rejected(format!(
                "Unknown transfer: {}",
                transfer_id
            )));
        }

        let scripted = self.status_script.lock().unwrap().pop_front();
        let default_status = *self.default_status.lock().unwrap();
        scripted.unwrap_or(Ok(default_status.unwrap_or(TransferStatus::Completed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_charges_once() {
        let provider = ScriptedProvider::new();
        let key = PurchaseId::new();

        let a = provider.create_transfer("q-1", key, "s", "r").await.unwrap();
        let b = provider.create_transfer("q-2", key, "s", "r").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.transfer_calls(), 2);
        assert_eq!(provider.charges().len(), 1);

        provider
            .create_transfer("q-3", PurchaseId::new(), "s", "r")
            .await
            .unwrap();
        assert_eq!(provider.charges().len(), 2);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_charges() {
        let provider = ScriptedProvider::with_retention(2);
        let keys: Vec<_> = (0..3).map(|_| PurchaseId::new()).collect();
        let mut handles = Vec::new();
        for key in &keys {
            handles.push(provider.create_transfer("q", *key, "s", "r").await.unwrap());
        }

        assert_eq!(provider.charges().len(), 2);
        assert_eq!(provider.transfer_keys(), keys[1..].to_vec());
        assert!(
            provider
                .charges()
                .iter()
                .all(|c| c.idempotency_key != keys[0])
        );
        // Evicted transfers are forgotten by the status endpoint too
        assert!(provider.get_transfer_status(&handles[0].transfer_id).await.is_err());
        assert!(provider.get_transfer_status(&handles[2].transfer_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_outcomes_then_defaults() {
        let provider = ScriptedProvider::new();
        provider
            .push_quote(Err(ProviderError::Unavailable("timeout".into())))
            .push_quote(Ok(()));

        let dec: Decimal = "3.50".parse().unwrap();
        assert!(provider.create_quote(dec, "USD", "USD").await.is_err());
        assert!(provider.create_quote(dec, "USD", "USD").await.is_ok());
        assert!(provider.create_quote(dec, "USD", "USD").await.is_ok());
        assert_eq!(provider.quote_calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_transfer_is_not_charged() {
        let provider = ScriptedProvider::new();
        provider.push_transfer(Err(ProviderError::Rejected("invalid account".into())));

        let key = PurchaseId::new();
        assert!(provider.create_transfer("q", key, "s", "r").await.is_err());
        assert!(provider.charges().is_empty());
        assert_eq!(provider.transfer_keys(), vec![key]);
    }

    #[tokio::test]
    async fn test_status_of_unknown_transfer_rejected() {
        let provider = ScriptedProvider::new();
        let err = provider.get_transfer_status("nope").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));

        let handle = provider
            .create_transfer("q", PurchaseId::new(), "s", "r")
            .await
            .unwrap();
        provider.set_default_status(TransferStatus::Pending);
        provider.push_status(Ok(TransferStatus::Failed));
        assert_eq!(
            provider.get_transfer_status(&handle.transfer_id).await.unwrap(),
            TransferStatus::Failed
        );
        assert_eq!(
            provider.get_transfer_status(&handle.transfer_id).await.unwrap(),
            TransferStatus::Pending
        );
    }
}
