//! In-memory listing store (dev seed data and tests)

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Listing, ListingStore, ListingStoreError};
use crate::core_types::ListingId;

#[derive(Default)]
pub struct MemoryListingStore {
    listings: DashMap<ListingId, Listing>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let store = Self::new();
        for listing in listings {
            store.upsert(listing);
        }
        store
    }

    pub fn upsert(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, ListingStoreError> {
        Ok(self.listings.get(&id).map(|l| l.clone()))
    }
}
