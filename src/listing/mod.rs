//! Listing Store
//!
//! Read access to the marketplace listings owned by the external content
//! store. Settlement only needs price, seller and lifecycle status.

pub mod db;
pub mod memory;

pub use db::PgListingStore;
pub use memory::MemoryListingStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{ListingId, UserId};

/// Listing lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Draft,
    Published,
    Archived,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Published => "published",
            ListingStatus::Archived => "archived",
        }
    }

    /// Only published listings can be bought
    #[inline]
    pub fn is_purchasable(&self) -> bool {
        matches!(self, ListingStatus::Published)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = ListingStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ListingStatus::Draft),
            "published" => Ok(ListingStatus::Published),
            "archived" => Ok(ListingStatus::Archived),
            other => Err(ListingStoreError::InvalidData(format!(
                "Unknown listing status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    #[serde(default)]
    pub title: String,
    pub price: Decimal,
    pub seller_id: UserId,
    pub status: ListingStatus,
}

impl Listing {
    /// Account the payout goes to
    pub fn seller_account(&self) -> String {
        self.seller_id.to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingStoreError {
    #[error("Listing store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid listing data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for ListingStoreError {
    fn from(e: sqlx::Error) -> Self {
        ListingStoreError::Unavailable(e.to_string())
    }
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// `Ok(None)` if the listing does not exist
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, ListingStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("published".parse::<ListingStatus>().unwrap(), ListingStatus::Published);
        assert_eq!("draft".parse::<ListingStatus>().unwrap(), ListingStatus::Draft);
        assert!("deleted".parse::<ListingStatus>().is_err());
    }

    #[test]
    fn test_only_published_is_purchasable() {
        assert!(ListingStatus::Published.is_purchasable());
        assert!(!ListingStatus::Draft.is_purchasable());
        assert!(!ListingStatus::Archived.is_purchasable());
    }

    #[test]
    fn test_listing_yaml() {
        let yaml = r#"
id: 7f1c9a52-2f0e-4d3b-9b1a-0c8e5d2f4a61
title: React data grid
price: "49.00"
seller_id: 0b6c3c1e-52a4-4f8e-9d43-5c2a7e9b1f00
status: published
"#;
        let listing: Listing = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(listing.price, "49".parse::<Decimal>().unwrap());
        assert_eq!(listing.status, ListingStatus::Published);
        assert_eq!(
            listing.seller_account(),
            "0b6c3c1e-52a4-4f8e-9d43-5c2a7e9b1f00"
        );
    }
}
