/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /api/health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "OK",
///   "message": "Server is running",
///   "timestamp": "2025-01-01T00:00:00Z",
///   "version": "0.1.0",
///   "database": "connected"
/// }
/// ```
///
/// The endpoint answers 200 whenever the process is up; `database` reports
/// whether PostgreSQL answered within two seconds.

use crate::app::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use pricewatch_shared::db::pool::health_check as database_health_check;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "OK"
    pub status: String,

    pub message: String,

    pub timestamp: DateTime<Utc>,

    /// Application version
    pub version: String,

    /// "connected" or "disconnected"
    pub database: String,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = matches!(
        tokio::time::timeout(DATABASE_CHECK_TIMEOUT, database_health_check(&state.db)).await,
        Ok(Ok(()))
    );

    if !connected {
        tracing::warn!("Health check: database unreachable");
    }

    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Server is running".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
    })
}
