//! PostgreSQL listing store (`code_listings`, owned by the content store)

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{Listing, ListingStore, ListingStoreError};
use crate::core_types::{ListingId, UserId};

pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, ListingStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, price::NUMERIC AS price, creator_id, status
            FROM code_listings
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(Listing {
            id: ListingId(row.try_get("id")?),
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            price: row.try_get("price")?,
            seller_id: UserId(row.try_get("creator_id")?),
            status: status.parse()?,
        }))
    }
}
