/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Account endpoints (register, login, tokens, email, password)
/// - `google`: Google sign-in
/// - `products`: Tracked products, refresh and price history
/// - `two_factor`: TOTP two-factor authentication

pub mod auth;
pub mod google;
pub mod health;
pub mod products;
pub mod two_factor;

use crate::error::ApiError;
use axum::http::Uri;

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Not found - {}", uri.path()))
}
