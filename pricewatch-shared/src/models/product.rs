/// Product model and database operations
///
/// A product is one URL tracked by one user. The `(user_id, url)` pair is
/// unique; every read and write from the API is scoped by `user_id` in the
/// `WHERE` clause, so another user's product behaves exactly like a missing
/// one.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE products (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     url TEXT NOT NULL,
///     title TEXT NOT NULL DEFAULT '',
///     image_url TEXT,
///     current_price DOUBLE PRECISION NOT NULL DEFAULT 0,
///     target_price DOUBLE PRECISION NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT products_user_url_unique UNIQUE (user_id, url)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use pricewatch_shared::models::product::{CreateProduct, Product, UpdateProduct};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let product = Product::create(&pool, CreateProduct {
///     user_id,
///     url: "https://www.amazon.com/dp/B000000000".to_string(),
///     title: "Headphones".to_string(),
///     image_url: None,
///     current_price: 129.99,
///     target_price: 99.0,
/// }).await?;
///
/// Product::update(&pool, product.id, user_id, UpdateProduct {
///     target_price: Some(89.0),
///     ..Default::default()
/// }).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};
use uuid::Uuid;

use super::price_history::PriceHistory;

const PRODUCT_COLUMNS: &str =
    "id, user_id, url, title, image_url, current_price, target_price, created_at, updated_at";

/// Errors from product writes
#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    /// The user already tracks this URL
    #[error("Product already being tracked")]
    AlreadyTracked,

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Tracked product
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,

    /// Owner
    pub user_id: Uuid,

    /// Product page URL
    pub url: String,

    /// Title; empty until known
    pub title: String,

    pub image_url: Option<String>,

    /// Latest known price (0 until the first successful scrape)
    pub current_price: f64,

    /// Price at or below which the user wants to be told
    pub target_price: f64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub user_id: Uuid,
    pub url: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: f64,
    pub target_price: f64,
}

/// User-editable fields; None leaves the column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub target_price: Option<f64>,
    pub title: Option<String>,
}

impl UpdateProduct {
    /// True when nothing would change
    pub fn is_empty(&self) -> bool {
        self.target_price.is_none() && self.title.is_none()
    }
}

impl Product {
    /// Creates a product and seeds its history with the current price
    ///
    /// A zero price means "unknown" and is not recorded as history.
    ///
    /// # Errors
    ///
    /// [`ProductError::AlreadyTracked`] if the user already tracks the URL.
    pub async fn create(pool: &PgPool, data: CreateProduct) -> Result<Self, ProductError> {
        let mut tx = pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO products (user_id, url, title, image_url, current_price, target_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        let product = sqlx::query_as::<_, Product>(&query)
            .bind(data.user_id)
            .bind(data.url.trim())
            .bind(data.title.trim())
            .bind(data.image_url)
            .bind(data.current_price)
            .bind(data.target_price)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    ProductError::AlreadyTracked
                }
                other => ProductError::Database(other),
            })?;

        if product.current_price > 0.0 {
            PriceHistory::append(&mut *tx, product.id, product.current_price).await?;
        }

        tx.commit().await?;

        Ok(product)
    }

    /// Finds a product owned by `user_id`
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query =
            format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND user_id = $2");

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Whether `user_id` already tracks `url`
    pub async fn exists_for_user(
        pool: &PgPool,
        user_id: Uuid,
        url: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE user_id = $1 AND url = $2)")
            .bind(user_id)
            .bind(url.trim())
            .fetch_one(pool)
            .await
    }

    /// All products of a user, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE user_id = $1 ORDER BY created_at DESC, id"
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Every tracked product, oldest first (scraper batch order)
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at ASC, id");

        sqlx::query_as::<_, Product>(&query).fetch_all(pool).await
    }

    /// Updates target price and/or title
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        data: UpdateProduct,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE products
            SET target_price = COALESCE($3, target_price),
                title = COALESCE($4, title),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .bind(user_id)
            .bind(data.target_price)
            .bind(data.title)
            .fetch_optional(pool)
            .await
    }

    /// Stores a scraped price and back-fills missing details
    ///
    /// `title` and `image_url` should only be Some when the stored value is
    /// empty; None keeps the column.
    pub async fn record_scrape<'e, E>(
        executor: E,
        id: Uuid,
        current_price: f64,
        title: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE products
            SET current_price = $2,
                title = COALESCE($3, title),
                image_url = COALESCE($4, image_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .bind(current_price)
            .bind(title)
            .bind(image_url)
            .fetch_optional(executor)
            .await
    }

    /// Deletes a product owned by `user_id`; history cascades
    pub async fn delete_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_product_is_empty() {
        assert!(UpdateProduct::default().is_empty());
        assert!(!UpdateProduct {
            target_price: Some(1.0),
            title: None
        }
        .is_empty());
    }

    #[test]
    fn test_product_error_message() {
        assert_eq!(
            ProductError::AlreadyTracked.to_string(),
            "Product already being tracked"
        );
    }
}
