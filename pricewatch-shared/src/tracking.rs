/// Applying scrape results to tracked products
///
/// Shared by the manual refresh endpoint and the background worker so both
/// follow the same rules:
///
/// - a history entry is appended only when the price actually changed
/// - title and image are back-filled only while the stored value is empty
/// - an alert is due when the price changed and is at or below the target
///
/// The product update and the history append run in one transaction.

use serde::Serialize;
use sqlx::PgPool;

use crate::models::price_history::PriceHistory;
use crate::models::product::Product;
use crate::models::user::User;
use crate::notify::{Notifier, PriceAlert};
use crate::scraper::ScrapedProduct;

/// Prices closer than this are treated as equal
const PRICE_EPSILON: f64 = 0.005;

/// What a scrape result changes on a product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceUpdate {
    pub previous_price: f64,
    pub new_price: f64,
    pub price_changed: bool,
    /// Title to store, when the product has none yet
    pub title: Option<String>,
    /// Image to store, when the product has none yet
    pub image_url: Option<String>,
    pub at_target: bool,
}

impl PriceUpdate {
    /// Whether anything needs to be written
    pub fn needs_write(&self) -> bool {
        self.price_changed || self.title.is_some() || self.image_url.is_some()
    }

    /// Whether the owner should be notified
    pub fn should_alert(&self) -> bool {
        self.price_changed && self.at_target
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Works out the changes `scraped` implies for `product`
pub fn plan_update(product: &Product, scraped: &ScrapedProduct) -> PriceUpdate {
    let price_changed = (scraped.price - product.current_price).abs() >= PRICE_EPSILON;

    let title = if product.title.trim().is_empty() {
        non_empty(&scraped.title)
    } else {
        None
    };

    let image_url = if non_empty(&product.image_url).is_none() {
        non_empty(&scraped.image_url)
    } else {
        None
    };

    PriceUpdate {
        previous_price: product.current_price,
        new_price: scraped.price,
        price_changed,
        title,
        image_url,
        at_target: scraped.price > 0.0 && scraped.price <= product.target_price,
    }
}

/// Applies a scrape result to `product`
///
/// Returns the stored product (unchanged if there was nothing to write) and
/// the plan that was applied.
///
/// # Errors
///
/// `sqlx::Error::RowNotFound` if the product was deleted meanwhile.
pub async fn apply_scrape(
    pool: &PgPool,
    product: &Product,
    scraped: &ScrapedProduct,
) -> Result<(Product, PriceUpdate), sqlx::Error> {
    let plan = plan_update(product, scraped);

    if !plan.needs_write() {
        return Ok((product.clone(), plan));
    }

    let mut tx = pool.begin().await?;

    let updated = Product::record_scrape(
        &mut *tx,
        product.id,
        plan.new_price,
        plan.title.as_deref(),
        plan.image_url.as_deref(),
    )
    .await?
    .ok_or(sqlx::Error::RowNotFound)?;

    if plan.price_changed {
        PriceHistory::append(&mut *tx, product.id, plan.new_price).await?;
    }

    tx.commit().await?;

    tracing::debug!(
        product_id = %product.id,
        previous_price = plan.previous_price,
        new_price = plan.new_price,
        price_changed = plan.price_changed,
        "Applied scrape result"
    );

    Ok((updated, plan))
}

/// Sends a price alert to the owner of `product` when `plan` calls for one
///
/// Returns whether an alert was delivered. Delivery failures are logged and
/// reported as `false`; only the owner lookup can fail.
pub async fn alert_if_due(
    pool: &PgPool,
    notifier: &dyn Notifier,
    product: &Product,
    plan: &PriceUpdate,
) -> Result<bool, sqlx::Error> {
    if !plan.should_alert() {
        return Ok(false);
    }

    let Some(owner) = User::find_by_id(pool, product.user_id).await? else {
        return Ok(false);
    };

    match notifier.price_alert(&PriceAlert::for_product(product, &owner)).await {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::warn!(product_id = %product.id, error = %e, "Failed to deliver price alert");
            Ok(false)
        }
    }
}
