/// Authentication endpoints
///
/// This module provides user authentication endpoints:
/// - Registration and login (with an optional second factor)
/// - Token refresh and logout
/// - Email verification
/// - Password reset
///
/// # Endpoints
///
/// - `POST /api/auth/register` - Register new user
/// - `POST /api/auth/login` - Login and get tokens
/// - `POST /api/auth/refresh` - Refresh access token
/// - `POST /api/auth/logout` - Logout (tokens are stateless, the client drops them)
/// - `GET /api/auth/me` - Current user profile
/// - `POST /api/auth/verify-email` - Confirm an email verification token
/// - `POST /api/auth/resend-verification` - Send a new verification email
/// - `POST /api/auth/forgot-password` - Request a password reset email
/// - `POST /api/auth/reset-password` - Set a new password with a reset token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, AppJson, ValidationErrorDetail},
    routes::two_factor::verify_second_factor,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use pricewatch_shared::{
    auth::{
        jwt::{self, Claims, TokenType},
        middleware::AuthContext,
        password, tokens,
    },
    models::{
        two_factor::TwoFactorAuth,
        user::{CreateUser, User, UserProfile},
    },
    notify::{templates, EmailMessage},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifetime of a password reset token
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,

    /// Email address
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,

    /// Password (will be validated for strength)
    pub password: String,

    /// Must equal `password` when sent
    pub confirm_password: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,

    /// Password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// TOTP or backup code, required once 2FA is enabled
    pub two_factor_code: Option<String>,
}

/// Register and login response
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,

    /// Access token (24h)
    pub token: String,

    /// Refresh token (30d)
    pub refresh_token: String,

    pub user: UserProfile,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub token: String,
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: UserProfile,

    pub two_factor_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub password: String,
}

fn weak_password(message: String) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: "password".to_string(),
        message,
    }])
}

/// Issues an access and refresh token pair for a user
fn issue_tokens(state: &AppState, user: &User) -> ApiResult<(String, String)> {
    let access = Claims::new(user.id, user.email.clone(), TokenType::Access);
    let refresh = Claims::new(user.id, user.email.clone(), TokenType::Refresh);

    Ok((
        jwt::create_token(&access, state.jwt_secret())?,
        jwt::create_token(&refresh, state.jwt_secret())?,
    ))
}

/// Builds a frontend link carrying a one-time token
fn frontend_link(state: &AppState, path: &str, token: &str) -> String {
    format!(
        "{}/{}?token={}",
        state.config.frontend.url.trim_end_matches('/'),
        path,
        token
    )
}

/// Emails a verification link; delivery failures are logged, not returned
async fn send_verification(state: &AppState, user: &User, token: &str) {
    let link = frontend_link(state, "verify-email", token);
    let message = EmailMessage::new(&user.email, templates::verification_email(&user.name, &link));

    if let Err(e) = state.notifier.send_email(message).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to send verification email");
    }
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/register
/// Content-Type: application/json
///
/// {
///   "name": "Jane Doe",
///   "email": "jane@example.com",
///   "password": "SecureP@ss123"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "message": "User registered successfully",
///   "token": "eyJ...",
///   "refresh_token": "eyJ...",
///   "user": { "id": "uuid", "name": "Jane Doe", "email": "jane@example.com", ... }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed, or the email is already registered
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;

    if req
        .confirm_password
        .as_deref()
        .is_some_and(|confirm| confirm != req.password)
    {
        return Err(ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "confirm_password".to_string(),
            message: "Passwords do not match".to_string(),
        }]));
    }

    password::validate_password_strength(&req.password).map_err(weak_password)?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::BadRequest("User already exists".to_string()));
    }

    let password_hash = password::hash_password_async(req.password).await?;
    let verification_token = tokens::generate_token();

    let mut data = CreateUser::with_password(req.name, req.email, password_hash);
    data.verification_token = Some(tokens::hash_token(&verification_token));

    // The unique index still rejects a concurrent duplicate.
    let user = User::create(&state.db, data).await?;

    tracing::info!(user_id = %user.id, "User registered");

    send_verification(&state, &user, &verification_token).await;

    let (token, refresh_token) = issue_tokens(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            token,
            refresh_token,
            user: user.profile(),
        }),
    ))
}

/// Login with email and password
///
/// When 2FA is enabled the request must also carry `two_factor_code`, either
/// a current TOTP code or an unused backup code.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Invalid credentials, or missing/invalid second factor
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    // Google-only accounts have no password to check against.
    let hash = user.password_hash.clone().ok_or_else(invalid)?;
    if !password::verify_password_async(req.password, hash).await? {
        tracing::warn!(user_id = %user.id, "Login failed: wrong password");
        return Err(invalid());
    }

    if let Some(settings) = TwoFactorAuth::find_by_user(&state.db, user.id).await? {
        if settings.is_enabled {
            let code = req
                .two_factor_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ApiError::Unauthorized("Two-factor code required".to_string()))?;

            if !verify_second_factor(&state.db, &settings, code).await? {
                tracing::warn!(user_id = %user.id, "Login failed: invalid second factor");
                return Err(ApiError::Unauthorized("Invalid two-factor code".to_string()));
            }
        }
    }

    User::update_last_login(&state.db, user.id).await?;
    let (token, refresh_token) = issue_tokens(&state, &user)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        refresh_token,
        user: user.profile(),
    }))
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired, or non-refresh token
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(req): AppJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;
    Ok(Json(RefreshResponse { token }))
}

/// Logout
///
/// Tokens are not stored server side, so this only acknowledges the request.
pub async fn logout(Extension(auth): Extension<AuthContext>) -> Json<MessageResponse> {
    tracing::info!(user_id = %auth.user_id, "User logged out");
    MessageResponse::new("Logged out successfully")
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let two_factor_enabled = TwoFactorAuth::is_enabled_for(&state.db, user.id).await?;

    Ok(Json(MeResponse {
        profile: user.profile(),
        two_factor_enabled,
    }))
}

/// Confirms an email verification token
///
/// # Errors
///
/// - `400 Bad Request`: Unknown or already used token
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(req): AppJson<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let user = User::verify_email(&state.db, &tokens::hash_token(req.token.trim()))
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired verification token".to_string()))?;

    tracing::info!(user_id = %user.id, "Email verified");

    Ok(MessageResponse::new("Email verified successfully"))
}

/// Sends a fresh verification email to the current user
///
/// # Errors
///
/// - `400 Bad Request`: Email already verified
pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if user.email_verified {
        return Err(ApiError::BadRequest("Email already verified".to_string()));
    }

    let token = tokens::generate_token();
    User::set_verification_token(&state.db, user.id, &tokens::hash_token(&token)).await?;
    send_verification(&state, &user, &token).await;

    Ok(MessageResponse::new("Verification email sent"))
}

/// Starts a password reset
///
/// Always answers with the same message so the endpoint cannot be used to
/// find out which emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let generic = "If an account exists for that email, a reset link has been sent";

    let Some(user) = User::find_by_email(&state.db, &req.email).await? else {
        return Ok(MessageResponse::new(generic));
    };

    let token = tokens::generate_token();
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
    User::set_reset_token(&state.db, user.id, &tokens::hash_token(&token), expires_at).await?;

    let link = frontend_link(&state, "reset-password", &token);
    let message = EmailMessage::new(
        &user.email,
        templates::password_reset_email(&user.name, &link),
    );

    if let Err(e) = state.notifier.send_email(message).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to send password reset email");
    }

    Ok(MessageResponse::new(generic))
}

/// Sets a new password using a reset token
///
/// # Errors
///
/// - `400 Bad Request`: Weak password, or unknown/expired token
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;
    password::validate_password_strength(&req.password).map_err(weak_password)?;

    let password_hash = password::hash_password_async(req.password).await?;

    let token_hash = tokens::hash_token(req.token.trim());
    let user = User::reset_password(&state.db, &token_hash, &password_hash)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".to_string()))?;

    tracing::info!(user_id = %user.id, "Password reset");

    Ok(MessageResponse::new("Password has been reset successfully"))
}
