/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Per-client rate limiting
/// - Security headers

pub mod rate_limit;
pub mod security;
