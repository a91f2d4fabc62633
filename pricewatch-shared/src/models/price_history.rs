/// Price history: append-only, chronologically ordered price observations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE price_history (
///     id BIGSERIAL PRIMARY KEY,
///     product_id UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
///     price DOUBLE PRECISION NOT NULL CHECK (price >= 0),
///     recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Entries are never updated or deleted individually. [`PriceHistory::append`]
/// clamps the new timestamp to the latest existing one, so the sequence stays
/// ordered by date even if the database clock steps backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// One observed price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PricePoint {
    /// Observed price
    pub price: f64,

    /// When it was observed
    pub date: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProductPricePoint {
    product_id: Uuid,
    price: f64,
    date: DateTime<Utc>,
}

/// Namespace for price history queries
pub struct PriceHistory;

impl PriceHistory {
    /// Appends a price to a product's history
    ///
    /// Takes any executor so callers can append inside the transaction that
    /// updates the product's current price.
    pub async fn append<'e, E>(
        executor: E,
        product_id: Uuid,
        price: f64,
    ) -> Result<PricePoint, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PricePoint>(
            r#"
            INSERT INTO price_history (product_id, price, recorded_at)
            SELECT $1, $2, GREATEST(NOW(), COALESCE(MAX(recorded_at), NOW()))
            FROM price_history
            WHERE product_id = $1
            RETURNING price, recorded_at AS date
            "#,
        )
        .bind(product_id)
        .bind(price)
        .fetch_one(executor)
        .await
    }

    /// Full history of one product, oldest first
    pub async fn list_for_product(
        pool: &PgPool,
        product_id: Uuid,
    ) -> Result<Vec<PricePoint>, sqlx::Error> {
        sqlx::query_as::<_, PricePoint>(
            r#"
            SELECT price, recorded_at AS date
            FROM price_history
            WHERE product_id = $1
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
    }

    /// Histories of several products in one round trip
    ///
    /// Products without history are absent from the map.
    pub async fn list_for_products(
        pool: &PgPool,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<PricePoint>>, sqlx::Error> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ProductPricePoint>(
            r#"
            SELECT product_id, price, recorded_at AS date
            FROM price_history
            WHERE product_id = ANY($1)
            ORDER BY product_id, recorded_at ASC, id ASC
            "#,
        )
        .bind(product_ids)
        .fetch_all(pool)
        .await?;

        let mut histories: HashMap<Uuid, Vec<PricePoint>> = HashMap::new();
        for row in rows {
            histories.entry(row.product_id).or_default().push(PricePoint {
                price: row.price,
                date: row.date,
            });
        }

        Ok(histories)
    }
}
