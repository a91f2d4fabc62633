/// Product detail extraction from HTML
///
/// Each supported retailer has a fixed list of CSS selectors for price, title
/// and image. Selectors are tried in order; the first element whose value
/// parses wins. Unknown hosts, and known hosts whose own selectors miss, fall
/// back to the generic OpenGraph / schema.org markup most shops emit.

use ::scraper::{ElementRef, Html, Selector};
use reqwest::Url;

use super::{ScrapeError, ScrapedProduct};

/// Retailer a URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Amazon,
    Walmart,
    AliExpress,
    Generic,
}

struct SiteSelectors {
    price: &'static [&'static str],
    title: &'static [&'static str],
    /// (selector, attribute)
    image: &'static [(&'static str, &'static str)],
}

const AMAZON: SiteSelectors = SiteSelectors {
    price: &[
        ".a-price .a-offscreen",
        ".a-price-whole",
        "#priceblock_ourprice",
        "#priceblock_dealprice",
    ],
    title: &["#productTitle"],
    image: &[("#landingImage", "src"), ("#imgBlkFront", "src")],
};

const WALMART: SiteSelectors = SiteSelectors {
    price: &["[data-automation-id=\"product-price\"]", "[itemprop=\"price\"]"],
    title: &["h1"],
    image: &[],
};

const ALIEXPRESS: SiteSelectors = SiteSelectors {
    price: &[".product-price-value"],
    title: &["h1"],
    image: &[],
};

const GENERIC: SiteSelectors = SiteSelectors {
    price: &[
        "meta[property=\"product:price:amount\"]",
        "meta[property=\"og:price:amount\"]",
        "[itemprop=\"price\"]",
    ],
    title: &["meta[property=\"og:title\"]", "title"],
    image: &[("meta[property=\"og:image\"]", "content")],
};

impl Site {
    fn selectors(self) -> &'static SiteSelectors {
        match self {
            Site::Amazon => &AMAZON,
            Site::Walmart => &WALMART,
            Site::AliExpress => &ALIEXPRESS,
            Site::Generic => &GENERIC,
        }
    }
}

fn parse_url(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url.trim()).map_err(|_| ScrapeError::InvalidUrl(url.to_string()))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(ScrapeError::InvalidUrl(url.to_string())),
    }
}

/// Classifies `url` by host
///
/// Amazon matches on any `amazon` label (amazon.com, amazon.co.uk, ...).
pub fn detect_site(url: &str) -> Result<Site, ScrapeError> {
    let parsed = parse_url(url)?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    let is_domain = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

    let site = if host.split('.').any(|label| label == "amazon") {
        Site::Amazon
    } else if is_domain("walmart.com") {
        Site::Walmart
    } else if is_domain("aliexpress.com") || is_domain("aliexpress.us") {
        Site::AliExpress
    } else {
        Site::Generic
    };

    Ok(site)
}

/// Parses a price from display text
///
/// Everything except digits and `.` is dropped, so currency symbols,
/// labels and thousands separators are ignored. Zero, negative and
/// unparsable values yield None; zero is reserved for "price unknown".
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price > 0.0)
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::error!(css, error = ?e, "Invalid CSS selector");
            None
        }
    }
}

/// `content` attribute for meta-like elements, otherwise the collapsed text
fn element_value(element: &ElementRef<'_>) -> String {
    if let Some(content) = element.value().attr("content") {
        return content.trim().to_string();
    }

    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_price(document: &Html, lists: &[&[&str]]) -> Result<f64, ScrapeError> {
    let mut rejected: Option<String> = None;

    for css in lists.iter().flat_map(|list| list.iter()) {
        let Some(selector) = selector(css) else { continue };

        for element in document.select(&selector) {
            let text = element_value(&element);
            match parse_price(&text) {
                Some(price) => return Ok(price),
                None if rejected.is_none() && !text.is_empty() => rejected = Some(text),
                None => {}
            }
        }
    }

    Err(match rejected {
        Some(text) => ScrapeError::InvalidPrice(text),
        None => ScrapeError::PriceNotFound,
    })
}

fn find_text(document: &Html, lists: &[&[&str]]) -> Option<String> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .filter_map(|css| selector(css))
        .find_map(|selector| {
            document
                .select(&selector)
                .map(|element| element_value(&element))
                .find(|value| !value.is_empty())
        })
}

fn find_attr(document: &Html, lists: &[&[(&str, &str)]]) -> Option<String> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .find_map(|(css, attr)| {
            let selector = selector(css)?;
            document
                .select(&selector)
                .filter_map(|element| element.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
}

/// Extracts price, title and image from a product page
///
/// Relative image URLs are resolved against `url`.
///
/// # Errors
///
/// - [`ScrapeError::InvalidUrl`] for non-HTTP(S) URLs
/// - [`ScrapeError::PriceNotFound`] when no price selector matches
/// - [`ScrapeError::InvalidPrice`] when matches exist but none parse
pub fn extract_product(url: &str, html: &str) -> Result<ScrapedProduct, ScrapeError> {
    let base = parse_url(url)?;
    let site = detect_site(url)?;
    let own = site.selectors();

    let document = Html::parse_document(html);

    let price = find_price(&document, &[own.price, GENERIC.price])?;
    let title = find_text(&document, &[own.title, GENERIC.title]);
    let image_url = find_attr(&document, &[own.image, GENERIC.image])
        .and_then(|src| base.join(&src).ok())
        .map(|resolved| resolved.to_string());

    Ok(ScrapedProduct {
        price,
        title,
        image_url,
    })
}
