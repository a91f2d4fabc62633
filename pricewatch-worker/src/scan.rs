/// Batch price scan
///
/// One batch run visits every tracked product in turn: scrape the page,
/// apply the result through [`tracking::apply_scrape`], then alert the owner
/// if the price dropped to target. Products are processed strictly one after
/// another. A product that fails is logged and skipped; the batch carries on.
///
/// Cancellation is checked between products, so a shutdown never interrupts
/// a half-applied update.

use async_trait::async_trait;
use pricewatch_shared::{
    models::product::Product,
    notify::Notifier,
    scraper::Scraper,
    tracking,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::scheduler::BatchJob;

/// Outcome of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Products found at the start of the run
    pub total: usize,
    /// Products whose page yielded a price
    pub scraped: usize,
    /// Products whose price changed
    pub changed: usize,
    /// Products that could not be scraped or stored
    pub failed: usize,
    pub alerts: usize,
    /// Products not visited because of shutdown
    pub skipped: usize,
}

/// Scans every tracked product
#[derive(Clone)]
pub struct ProductScanner {
    db: PgPool,
    scraper: Scraper,
    notifier: Arc<dyn Notifier>,
}

impl ProductScanner {
    pub fn new(db: PgPool, scraper: Scraper, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            scraper,
            notifier,
        }
    }

    /// Runs one batch over all products
    ///
    /// # Errors
    ///
    /// Only loading the product list can fail the batch.
    pub async fn scan_all(&self, cancel: &CancellationToken) -> Result<BatchReport, sqlx::Error> {
        let products = Product::list_all(&self.db).await?;
        let mut report = BatchReport {
            total: products.len(),
            ..Default::default()
        };

        tracing::info!(products = report.total, "Starting price scan");

        for (index, product) in products.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped = report.total - index;
                tracing::info!(skipped = report.skipped, "Price scan interrupted by shutdown");
                break;
            }

            self.scan_one(product, &mut report).await;
        }

        Ok(report)
    }

    async fn scan_one(&self, product: &Product, report: &mut BatchReport) {
        let Some(scraped) = self.scraper.scrape(&product.url).await else {
            report.failed += 1;
            return;
        };
        report.scraped += 1;

        let (updated, plan) = match tracking::apply_scrape(&self.db, product, &scraped).await {
            Ok(result) => result,
            Err(sqlx::Error::RowNotFound) => {
                tracing::debug!(product_id = %product.id, "Product deleted during scan");
                return;
            }
            Err(e) => {
                tracing::error!(
                    product_id = %product.id,
                    error = %e,
                    "Failed to store scraped price"
                );
                report.failed += 1;
                return;
            }
        };

        if plan.price_changed {
            report.changed += 1;
            tracing::info!(
                product_id = %product.id,
                previous_price = plan.previous_price,
                new_price = plan.new_price,
                "Price changed"
            );
        }

        match tracking::alert_if_due(&self.db, self.notifier.as_ref(), &updated, &plan).await {
            Ok(true) => report.alerts += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    product_id = %product.id,
                    error = %e,
                    "Failed to load product owner"
                );
            }
        }
    }
}

#[async_trait]
impl BatchJob for ProductScanner {
    async fn run_batch(&self, cancel: &CancellationToken) {
        let started = Instant::now();

        match self.scan_all(cancel).await {
            Ok(report) => tracing::info!(
                total = report.total,
                scraped = report.scraped,
                changed = report.changed,
                failed = report.failed,
                alerts = report.alerts,
                skipped = report.skipped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Price scan finished"
            ),
            Err(e) => tracing::error!(error = %e, "Price scan failed to load products"),
        }
    }
}
