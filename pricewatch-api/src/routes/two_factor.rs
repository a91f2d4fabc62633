/// Two-factor authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/2fa/setup` - Generate a secret and backup codes (2FA stays off)
/// - `POST /api/2fa/verify` - Confirm a TOTP code and switch 2FA on
/// - `POST /api/2fa/verify-backup` - Consume a backup code
/// - `POST /api/2fa/disable` - Confirm a TOTP code and switch 2FA off
/// - `GET /api/2fa/backup-codes` - Remaining backup codes

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, AppJson},
};
use axum::{extract::State, Extension, Json};
use pricewatch_shared::{
    auth::{middleware::AuthContext, tokens, totp},
    models::two_factor::TwoFactorAuth,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

/// Setup response
#[derive(Debug, Serialize)]
pub struct SetupResponse {
    /// Base32 TOTP secret
    pub secret: String,

    /// `otpauth://` key URI for authenticator apps
    pub otpauth_url: String,

    /// Single-use backup codes
    pub backup_codes: Vec<String>,
}

/// Request carrying a TOTP code
#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Request carrying a backup code
#[derive(Debug, Deserialize, Validate)]
pub struct BackupCodeRequest {
    #[validate(length(min = 1, message = "Backup code is required"))]
    pub code: String,
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

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// Checks a second factor for a user with 2FA settings
///
/// Accepts a current TOTP code or one of the user's backup codes. A matching
/// backup code is consumed.
pub(crate) async fn verify_second_factor(
    db: &PgPool,
    settings: &TwoFactorAuth,
    code: &str,
) -> ApiResult<bool> {
    if totp::verify_code_now(&settings.secret, code)? {
        return Ok(true);
    }

    let backup = tokens::normalize_backup_code(code);
    if backup.is_empty() {
        return Ok(false);
    }

    let consumed = TwoFactorAuth::consume_backup_code(db, settings.user_id, &backup).await?;
    if consumed {
        tracing::info!(user_id = %settings.user_id, "Backup code consumed");
    }

    Ok(consumed)
}

async fn load_settings(db: &PgPool, auth: &AuthContext) -> ApiResult<TwoFactorAuth> {
    TwoFactorAuth::find_by_user(db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("2FA has not been set up".to_string()))
}

/// Starts 2FA setup
///
/// Replaces any previous secret and backup codes. 2FA is not enforced at
/// login until a code is confirmed through `/verify`.
///
/// # Response
///
/// ```json
/// {
///   "secret": "JBSWY3DPEHPK3PXP...",
///   "otpauth_url": "otpauth://totp/Price%20Tracker:user@example.com?secret=...",
///   "backup_codes": ["A1B2C3D4", "..."]
/// }
/// ```
pub async fn setup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SetupResponse>> {
    let secret = totp::generate_secret();
    let backup_codes = tokens::generate_backup_codes();

    TwoFactorAuth::upsert_setup(&state.db, auth.user_id, &secret, &backup_codes).await?;
    let otpauth_url = totp::otpauth_url(&secret, &auth.email)?;

    tracing::info!(user_id = %auth.user_id, "2FA setup started");

    Ok(Json(SetupResponse {
        secret,
        otpauth_url,
        backup_codes,
    }))
}

/// Confirms a TOTP code and enables 2FA
///
/// # Errors
///
/// - `400 Bad Request`: Setup not run, or the code does not match
pub async fn verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<TokenRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let settings = load_settings(&state.db, &auth).await?;
    if !totp::verify_code_now(&settings.secret, &req.token)? {
        return Err(ApiError::BadRequest("Invalid token".to_string()));
    }

    TwoFactorAuth::set_enabled(&state.db, auth.user_id, true).await?;
    tracing::info!(user_id = %auth.user_id, "2FA enabled");

    Ok(MessageResponse::new("2FA enabled successfully"))
}

/// Consumes one backup code
pub async fn verify_backup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<BackupCodeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let code = tokens::normalize_backup_code(&req.code);
    if !TwoFactorAuth::consume_backup_code(&state.db, auth.user_id, &code).await? {
        return Err(ApiError::BadRequest("Invalid backup code".to_string()));
    }

    Ok(MessageResponse::new("Backup code verified successfully"))
}

/// Confirms a TOTP code and disables 2FA
pub async fn disable(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<TokenRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let settings = load_settings(&state.db, &auth).await?;
    if !totp::verify_code_now(&settings.secret, &req.token)? {
        return Err(ApiError::BadRequest("Invalid token".to_string()));
    }

    TwoFactorAuth::set_enabled(&state.db, auth.user_id, false).await?;
    tracing::info!(user_id = %auth.user_id, "2FA disabled");

    Ok(MessageResponse::new("2FA disabled successfully"))
}

/// Lists unused backup codes
pub async fn backup_codes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<BackupCodesResponse>> {
    let backup_codes = TwoFactorAuth::backup_codes(&state.db, auth.user_id).await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}
