/// Google OAuth sign-in
///
/// Authorization code flow against Google's endpoints. The `state` parameter
/// is a short-lived signed token carrying a nonce, and the same nonce is set
/// in an `HttpOnly` cookie scoped to the Google routes. The callback only
/// proceeds when both match, so a state minted for one browser cannot finish
/// sign-in in another. After a successful callback the browser is redirected
/// to the frontend with a 7-day access token.
///
/// # Endpoints
///
/// - `GET /api/auth/google` - Redirect to the Google consent screen
/// - `GET /api/auth/google/callback` - Finish sign-in and redirect to the frontend

use crate::{
    app::AppState,
    config::GoogleOAuthConfig,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Duration;
use pricewatch_shared::{
    auth::{
        jwt::{self, Claims, TokenType, OAUTH_ACCESS_TTL_DAYS, OAUTH_STATE_TTL_MINUTES},
        tokens,
    },
    models::user::{CreateUser, User},
};
use reqwest::Url;
use serde::Deserialize;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

/// Cookie holding the nonce of the sign-in this browser started
pub const STATE_COOKIE: &str = "pricewatch_oauth_state";
const STATE_COOKIE_PATH: &str = "/api/auth/google";

/// Query string Google appends to the callback
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OpenID Connect userinfo
#[derive(Debug, Deserialize)]
struct GoogleProfile {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

/// Why a callback could not sign the user in
#[derive(Debug, thiserror::Error)]
enum CallbackError {
    /// Google or the user refused, or the request was tampered with
    #[error("authentication failed: {0}")]
    Rejected(String),

    #[error("server error: {0}")]
    Internal(String),
}

impl CallbackError {
    fn reason(&self) -> &'static str {
        match self {
            CallbackError::Rejected(_) => "auth_failed",
            CallbackError::Internal(_) => "server_error",
        }
    }
}

impl From<sqlx::Error> for CallbackError {
    fn from(err: sqlx::Error) -> Self {
        CallbackError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for CallbackError {
    fn from(err: reqwest::Error) -> Self {
        CallbackError::Internal(err.to_string())
    }
}

/// 302 Found that also sets a cookie
fn found_with_cookie(location: String, cookie: String) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location), (header::SET_COOKIE, cookie)],
    )
        .into_response()
}

/// `Set-Cookie` value carrying the sign-in nonce
pub fn state_cookie(nonce: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{STATE_COOKIE}={nonce}; Path={STATE_COOKIE_PATH}; Max-Age={}; HttpOnly; SameSite=Lax",
        OAUTH_STATE_TTL_MINUTES * 60
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the sign-in nonce
fn cleared_state_cookie() -> String {
    format!("{STATE_COOKIE}=; Path={STATE_COOKIE_PATH}; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// Sign-in nonce from the request's `Cookie` headers
pub fn cookie_nonce(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == STATE_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Google consent screen URL
pub fn authorization_url(google: &GoogleOAuthConfig, state: &str) -> ApiResult<Url> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", google.client_id.as_str()),
            ("redirect_uri", google.callback_url.as_str()),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("state", state),
            ("prompt", "select_account"),
        ],
    )
    .map_err(|e| ApiError::InternalError(format!("Invalid Google authorization URL: {}", e)))
}

/// Frontend page that receives the signed-in token
pub fn success_redirect(frontend_url: &str, token: &str) -> String {
    format!("{}/auth/callback?token={}", frontend_url.trim_end_matches('/'), token)
}

/// Frontend login page carrying an error reason
pub fn error_redirect(frontend_url: &str, reason: &str) -> String {
    format!("{}/login?error={}", frontend_url.trim_end_matches('/'), reason)
}

/// Starts Google sign-in
///
/// # Errors
///
/// - `400 Bad Request`: Google OAuth is not configured
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Response> {
    let google = state.config.google.as_ref().ok_or_else(|| {
        ApiError::BadRequest(
            "Google OAuth is not set up on this server. Please contact the administrator."
                .to_string(),
        )
    })?;

    let nonce = tokens::generate_token();
    let oauth_state = jwt::create_oauth_state(&nonce, &state.config.jwt.session_secret)?;
    let url = authorization_url(google, &oauth_state)?;

    Ok(found_with_cookie(
        url.into(),
        state_cookie(&nonce, state.config.api.production),
    ))
}

/// Finishes Google sign-in
///
/// Always answers with a redirect to the frontend: the token on success,
/// otherwise `/login?error=` with `oauth_not_configured`, `auth_failed` or
/// `server_error`. The state cookie is cleared either way.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let location = callback_location(&state, &headers, query).await;
    found_with_cookie(location, cleared_state_cookie())
}

async fn callback_location(
    state: &AppState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> String {
    let frontend = state.config.frontend.url.as_str();

    let Some(google) = state.config.google.as_ref() else {
        return error_redirect(frontend, "oauth_not_configured");
    };

    let signed_in = match sign_in(state, google, cookie_nonce(headers), query).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Google sign-in failed");
            return error_redirect(frontend, e.reason());
        }
    };

    let claims = Claims::with_expiration(
        signed_in.id,
        signed_in.email.clone(),
        TokenType::Access,
        Duration::days(OAUTH_ACCESS_TTL_DAYS),
    );

    match jwt::create_token(&claims, state.jwt_secret()) {
        Ok(token) => {
            tracing::info!(user_id = %signed_in.id, "Google sign-in succeeded");
            success_redirect(frontend, &token)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue token after Google sign-in");
            error_redirect(frontend, "server_error")
        }
    }
}

/// Validates the callback, talks to Google and resolves the local user
async fn sign_in(
    state: &AppState,
    google: &GoogleOAuthConfig,
    browser_nonce: Option<&str>,
    query: CallbackQuery,
) -> Result<User, CallbackError> {
    if let Some(error) = query.error {
        return Err(CallbackError::Rejected(error));
    }

    let oauth_state = query
        .state
        .ok_or_else(|| CallbackError::Rejected("missing state".to_string()))?;
    let claims = jwt::validate_oauth_state(&oauth_state, &state.config.jwt.session_secret)
        .map_err(|e| CallbackError::Rejected(e.to_string()))?;

    let same_browser =
        browser_nonce.is_some_and(|nonce| tokens::constant_time_compare(nonce, &claims.nonce));
    if !same_browser {
        return Err(CallbackError::Rejected(
            "state cookie missing or does not match".to_string(),
        ));
    }

    let code = query
        .code
        .ok_or_else(|| CallbackError::Rejected("missing code".to_string()))?;

    let token_response = state
        .http
        .post(TOKEN_URL)
        .form(&[
            ("code", code.as_str()),
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("redirect_uri", google.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !token_response.status().is_success() {
        return Err(CallbackError::Rejected(format!(
            "token exchange returned {}",
            token_response.status()
        )));
    }

    let tokens: TokenResponse = token_response.json().await?;

    let profile: GoogleProfile = state
        .http
        .get(USERINFO_URL)
        .bearer_auth(&tokens.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    resolve_user(state, profile).await
}

/// Finds the user by Google ID, then by email (linking the account), or
/// creates a new verified user
async fn resolve_user(state: &AppState, profile: GoogleProfile) -> Result<User, CallbackError> {
    if let Some(user) = User::find_by_google_id(&state.db, &profile.sub).await? {
        return Ok(user);
    }

    let email = profile
        .email
        .filter(|_| profile.email_verified)
        .ok_or_else(|| {
            CallbackError::Rejected("Google account has no verified email".to_string())
        })?;

    if let Some(existing) = User::find_by_email(&state.db, &email).await? {
        return User::link_google(&state.db, existing.id, &profile.sub, profile.picture)
            .await?
            .ok_or_else(|| CallbackError::Internal("user vanished while linking".to_string()));
    }

    let name = profile
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or("User").to_string());

    let user = User::create(
        &state.db,
        CreateUser::with_google(name, email, profile.sub, profile.picture),
    )
    .await?;

    tracing::info!(user_id = %user.id, "User created from Google sign-in");

    Ok(user)
}
