/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use pricewatch_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = pricewatch_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        rate_limit::{rate_limit, RateLimiter},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use pricewatch_shared::{
    auth::{
        jwt,
        middleware::{bearer_token, AuthContext, AuthError},
    },
    models::user::User,
    notify::{LogNotifier, Notifier},
    scraper::Scraper,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Rate limiters, one per route group
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub api: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub password_reset: Arc<RateLimiter>,
    pub verification: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        let limits = &config.rate_limit;
        let limiter = |name, rule| Arc::new(RateLimiter::new(name, rule, limits.trust_proxy));

        Self {
            api: limiter("api", limits.api),
            auth: limiter("auth", limits.auth),
            password_reset: limiter("password_reset", limits.password_reset),
            verification: limiter("verification", limits.verification),
        }
    }
}

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Product page scraper
    pub scraper: Scraper,

    /// Email and alert delivery
    pub notifier: Arc<dyn Notifier>,

    /// Per-client rate limiters
    pub limiters: RateLimiters,

    /// Outbound HTTP client (Google OAuth)
    pub http: reqwest::Client,
}

impl AppState {
    /// Creates new application state with the HTTP scraper and log notifier
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let scraper = Scraper::http(&config.scraper.fetcher_config())?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.scraper.timeout_secs))
            .build()?;

        Ok(Self {
            db,
            limiters: RateLimiters::from_config(&config),
            config: Arc::new(config),
            scraper,
            notifier: Arc::new(LogNotifier),
            http,
        })
    }

    /// Replaces the scraper
    pub fn with_scraper(mut self, scraper: Scraper) -> Self {
        self.scraper = scraper;
        self
    }

    /// Replaces the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /api
/// ├── GET  /health
/// ├── /auth
/// │   ├── POST /register, /login             (auth rate limit)
/// │   ├── POST /forgot-password, /reset-password (password rate limit)
/// │   ├── POST /refresh, /verify-email
/// │   ├── GET  /google, /google/callback
/// │   └── POST /logout, GET /me, POST /resend-verification (JWT)
/// ├── /products                              (JWT)
/// │   ├── GET, POST /
/// │   ├── GET, PATCH, DELETE /:id
/// │   ├── POST /:id/refresh
/// │   └── GET  /:id/history
/// └── /2fa                                   (JWT)
///     ├── POST /setup, /verify, /verify-backup, /disable
///     └── GET  /backup-codes
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Compression
/// 4. Logging (tower-http TraceLayer)
/// 5. General `/api` rate limit
/// 6. Authentication and route-group rate limits (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let limiters = state.limiters.clone();
    let auth_layer = || middleware::from_fn_with_state(state.clone(), jwt_auth_layer);

    let credential_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route_layer(middleware::from_fn_with_state(limiters.auth.clone(), rate_limit));

    let password_routes = Router::new()
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password))
        .route_layer(middleware::from_fn_with_state(
            limiters.password_reset.clone(),
            rate_limit,
        ));

    let account_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .merge(
            Router::new()
                .route("/resend-verification", post(routes::auth::resend_verification))
                .route_layer(middleware::from_fn_with_state(
                    limiters.verification.clone(),
                    rate_limit,
                )),
        )
        .route_layer(auth_layer());

    let auth_routes = Router::new()
        .merge(credential_routes)
        .merge(password_routes)
        .merge(account_routes)
        .route("/refresh", post(routes::auth::refresh))
        .route("/verify-email", post(routes::auth::verify_email))
        .route("/google", get(routes::google::google_login))
        .route("/google/callback", get(routes::google::google_callback));

    let product_routes = Router::new()
        .route(
            "/",
            get(routes::products::list_products).post(routes::products::create_product),
        )
        .route(
            "/:id",
            get(routes::products::get_product)
                .patch(routes::products::update_product)
                .delete(routes::products::delete_product),
        )
        .route("/:id/refresh", post(routes::products::refresh_product))
        .route("/:id/history", get(routes::products::price_history))
        .route_layer(auth_layer());

    let two_factor_routes = Router::new()
        .route("/setup", post(routes::two_factor::setup))
        .route("/verify", post(routes::two_factor::verify))
        .route("/verify-backup", post(routes::two_factor::verify_backup))
        .route("/disable", post(routes::two_factor::disable))
        .route("/backup-codes", get(routes::two_factor::backup_codes))
        .route_layer(auth_layer());

    let api_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/auth", auth_routes)
        .nest("/products", product_routes)
        .nest("/2fa", two_factor_routes)
        .layer(middleware::from_fn_with_state(limiters.api.clone(), rate_limit));

    // Configure CORS based on environment
    let origins = &state.config.frontend.cors_origins;
    let cors = if origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    // Combine all routes with middleware stack
    Router::new()
        .nest("/api", api_routes)
        .fallback(routes::not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer access token, checks the user still exists, then
/// injects [`AuthContext`] into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let claims = jwt::validate_access_token(token, state.jwt_secret()).map_err(AuthError::from)?;

    let user_exists = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .is_some();

    if !user_exists {
        return Err(AuthError::UserNotFound.into());
    }

    req.extensions_mut().insert(AuthContext::from_claims(claims));

    Ok(next.run(req).await)
}
