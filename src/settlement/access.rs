//! Access Gate
//!
//! Answers "does this buyer hold this listing". Read-only: sellers always
//! hold their own listings, everyone else needs a SETTLED purchase.

use std::sync::Arc;

use super::error::SettlementError;
use super::ledger::PurchaseLedger;
use super::types::{ListingId, UserId};
use crate::listing::ListingStore;

#[derive(Clone)]
pub struct AccessGate {
    ledger: Arc<dyn PurchaseLedger>,
    listings: Arc<dyn ListingStore>,
}

impl AccessGate {
    pub fn new(ledger: Arc<dyn PurchaseLedger>, listings: Arc<dyn ListingStore>) -> Self {
        Self { ledger, listings }
    }

    pub async fn has_access(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<bool, SettlementError> {
        let listing = self
            .listings
            .get_listing(listing_id)
            .await
            .map_err(|e| SettlementError::Storage(e.to_string()))?;

        if listing.is_some_and(|l| l.seller_id == buyer_id) {
            return Ok(true);
        }

        Ok(self.ledger.has_settled_purchase(listing_id, buyer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{Listing, ListingStatus, MemoryListingStore};
    use crate::settlement::ledger::MemoryLedger;

    #[tokio::test]
    async fn test_access_follows_settled_rows() {
        let listing = Listing {
            id: ListingId::new(),
            title: "Form builder".into(),
            price: "15".parse().unwrap(),
            seller_id: UserId::new(),
            status: ListingStatus::Published,
        };
        let ledger = Arc::new(MemoryLedger::new());
        let gate = AccessGate::new(
            ledger.clone(),
            Arc::new(MemoryListingStore::with_listings([listing.clone()])),
        );
        let buyer = UserId::new();

        // Seller always holds their listing
        assert!(gate.has_access(listing.id, listing.seller_id).await.unwrap());
        assert!(!gate.has_access(listing.id, buyer).await.unwrap());

        let record = ledger.insert(listing.id, buyer, listing.price).await.unwrap();
        ledger.attach_transfer(record.id, "tr-1").await.unwrap();
        assert!(!gate.has_access(listing.id, buyer).await.unwrap());

        ledger.mark_settled(record.id).await.unwrap();
        assert!(gate.has_access(listing.id, buyer).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_listing_has_no_access() {
        let gate = AccessGate::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryListingStore::new()),
        );
        assert!(!gate.has_access(ListingId::new(), UserId::new()).await.unwrap());
    }
}
