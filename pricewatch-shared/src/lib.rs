//! # Pricewatch Shared Library
//!
//! Types, database access and domain logic used by both the Pricewatch API
//! server and the background scraping worker.
//!
//! ## Module Organization
//!
//! - `auth`: passwords, JWTs, TOTP and random tokens
//! - `db`: connection pool and migrations
//! - `models`: database models (users, products, price history, 2FA)
//! - `notify`: email and price alert delivery
//! - `scraper`: product page fetching and price extraction
//! - `stats`: price statistics over a product's history
//! - `tracking`: applying scrape results to products

pub mod auth;
pub mod db;
pub mod models;
pub mod notify;
pub mod scraper;
pub mod stats;
pub mod tracking;

/// Current version of the Pricewatch shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
