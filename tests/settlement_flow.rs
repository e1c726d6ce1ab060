//! Black-box settlement flows through the public crate API.
//!
//! In-memory ledger and scripted provider; several orchestrator instances
//! stand in for replicas sharing one ledger.

use std::sync::Arc;
use std::time::Duration;

use codemart::listing::{Listing, ListingStatus, MemoryListingStore};
use codemart::settlement::{
    AccessGate, MemoryLedger, PurchaseLedger, PurchaseState, RecoveryWorker, ScriptedProvider,
    SettlementConfig, SettlementError, SettlementOrchestrator, TransferStatus, WorkerConfig,
};
use codemart::{ListingId, UserId};
use rust_decimal::Decimal;

struct Marketplace {
    ledger: Arc<MemoryLedger>,
    listings: Arc<MemoryListingStore>,
    provider: Arc<ScriptedProvider>,
}

impl Marketplace {
    fn new(listings: Vec<Listing>) -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            listings: Arc::new(MemoryListingStore::with_listings(listings)),
            provider: Arc::new(ScriptedProvider::new()),
        }
    }

    /// A fresh replica: no in-process state carried over
    fn replica(&self) -> Arc<SettlementOrchestrator> {
        Arc::new(SettlementOrchestrator::new(
            self.ledger.clone(),
            self.listings.clone(),
            self.provider.clone(),
            SettlementConfig::default(),
        ))
    }

    fn gate(&self) -> AccessGate {
        AccessGate::new(self.ledger.clone(), self.listings.clone())
    }
}

fn published(price: Decimal) -> Listing {
    Listing {
        id: ListingId::new(),
        title: "GraphQL schema linter".to_string(),
        price,
        seller_id: UserId::new(),
        status: ListingStatus::Published,
    }
}

#[tokio::test]
async fn buyer_collects_several_listings() {
    let a = published(Decimal::new(2500, 2));
    let b = published(Decimal::new(400, 2));
    let market = Marketplace::new(vec![a.clone(), b.clone()]);
    let orchestrator = market.replica();
    let gate = market.gate();
    let buyer = UserId::new();

    for listing in [&a, &b] {
        let outcome = orchestrator.settle(listing.id, buyer).await.unwrap();
        assert!(outcome.is_settled());
        assert!(gate.has_access(listing.id, buyer).await.unwrap());
    }

    let charges = market.provider.charges();
    assert_eq!(charges.len(), 2);
    assert!(
        charges
            .iter()
            .any(|c| c.destination_account == a.seller_id.to_string())
    );
    assert!(
        charges
            .iter()
            .any(|c| c.destination_account == b.seller_id.to_string())
    );

    // Sellers always hold their own listings
    assert!(gate.has_access(a.id, a.seller_id).await.unwrap());
    assert!(!gate.has_access(a.id, b.seller_id).await.unwrap());
}

#[tokio::test]
async fn replicas_racing_on_one_pair_charge_once() {
    let listing = published(Decimal::new(1999, 2));
    let market = Marketplace::new(vec![listing.clone()]);
    let buyer = UserId::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = market.replica();
        handles.push(tokio::spawn(async move {
            orchestrator.settle(listing.id, buyer).await
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => assert!(outcome.is_settled()),
            Err(SettlementError::InProgress { .. }) => {}
            Err(e) => panic!("unexpected settlement error: {:?}", e),
        }
    }

    let settled: Vec<_> = market
        .ledger
        .records_for(listing.id, buyer)
        .await
        .into_iter()
        .filter(|r| r.state == PurchaseState::Settled)
        .collect();
    assert!(settled.len() <= 1);
    assert!(market.provider.charges().len() <= 1);

    // Whoever lost the race can settle (or read back) afterwards
    let outcome = market.replica().settle(listing.id, buyer).await.unwrap();
    assert!(outcome.is_settled());
    assert_eq!(market.provider.charges().len(), 1);
    assert_eq!(
        market.provider.charges()[0].idempotency_key,
        outcome.purchase_id()
    );
}

#[tokio::test]
async fn restarted_replica_sweeps_pending_transfer() {
    let listing = published(Decimal::new(7500, 2));
    let market = Marketplace::new(vec![listing.clone()]);
    let buyer = UserId::new();

    market.provider.set_default_status(TransferStatus::Pending);
    let pending = market.replica().settle(listing.id, buyer).await.unwrap();
    assert!(!pending.is_settled());

    // The replica that started the purchase is gone; the buyer never rechecks
    market
        .ledger
        .backdate(pending.purchase_id(), Duration::from_secs(90))
        .await
        .unwrap();
    market.provider.set_default_status(TransferStatus::Completed);

    let worker = RecoveryWorker::new(
        market.replica(),
        WorkerConfig {
            scan_interval: Duration::from_secs(1),
            min_age: Duration::from_secs(60),
            stale_after: Duration::from_secs(15 * 60),
            batch_size: 10,
        },
    );
    assert_eq!(worker.scan_and_recover().await.unwrap(), 1);

    let record = market
        .ledger
        .get(pending.purchase_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, PurchaseState::Settled);
    assert!(market.gate().has_access(listing.id, buyer).await.unwrap());
    assert_eq!(market.provider.charges().len(), 1);
}
