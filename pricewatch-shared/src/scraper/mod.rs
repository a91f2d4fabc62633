/// Product page scraping
///
/// [`Scraper::scrape`] fetches a product page and pulls out its price, title
/// and image using per-retailer selectors (see [`extract`]). Any failure is
/// logged and reported as None; callers leave stored prices unchanged and
/// move on. There is no retry or backoff.
///
/// # Example
///
/// ```no_run
/// use pricewatch_shared::scraper::{fetcher::FetcherConfig, Scraper};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let scraper = Scraper::http(&FetcherConfig::default())?;
///
/// if let Some(product) = scraper.scrape("https://www.amazon.com/dp/B000000000").await {
///     println!("{} costs {}", product.title.unwrap_or_default(), product.price);
/// }
/// # Ok(())
/// # }
/// ```

pub mod extract;
pub mod fetcher;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use extract::{detect_site, extract_product, parse_price, Site};
pub use fetcher::{FetcherConfig, HttpFetcher, PageFetcher};

/// Scraping errors
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid product URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("No price found on page")]
    PriceNotFound,

    #[error("Could not parse price from {0:?}")]
    InvalidPrice(String),
}

/// Details scraped from a product page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    pub price: f64,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// Fetches and parses product pages
#[derive(Clone)]
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Scraper using [`HttpFetcher`]
    pub fn http(config: &FetcherConfig) -> Result<Self, ScrapeError> {
        Ok(Self::new(Arc::new(HttpFetcher::new(config)?)))
    }

    /// Scrapes `url`, returning the reason on failure
    pub async fn try_scrape(&self, url: &str) -> Result<ScrapedProduct, ScrapeError> {
        // Reject bad URLs before touching the network.
        detect_site(url)?;

        let html = self.fetcher.fetch(url).await?;
        extract_product(url, &html)
    }

    /// Scrapes `url`; failures are logged and yield None
    pub async fn scrape(&self, url: &str) -> Option<ScrapedProduct> {
        match self.try_scrape(url).await {
            Ok(product) => {
                tracing::debug!(url, price = product.price, "Scraped product page");
                Some(product)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to scrape product page");
                None
            }
        }
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper").finish_non_exhaustive()
    }
}
