/// Two-factor authentication settings
///
/// One row per user. Setup writes a fresh secret and backup codes with
/// `is_enabled = false`; the first verified TOTP code flips it on.
///
/// Backup codes are single-use: [`TwoFactorAuth::consume_backup_code`] removes
/// the code in the same `UPDATE` that checks for it, so two requests racing
/// on one code cannot both succeed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Per-user TOTP configuration
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TwoFactorAuth {
    pub user_id: Uuid,

    /// Base32 TOTP secret
    #[serde(skip_serializing)]
    pub secret: String,

    pub is_enabled: bool,

    /// Remaining unused backup codes
    #[serde(skip_serializing)]
    pub backup_codes: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TwoFactorAuth {
    /// Creates or replaces a user's pending 2FA setup
    pub async fn upsert_setup(
        pool: &PgPool,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorAuth>(
            r#"
            INSERT INTO two_factor_auth (user_id, secret, is_enabled, backup_codes)
            VALUES ($1, $2, FALSE, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET secret = EXCLUDED.secret,
                is_enabled = FALSE,
                backup_codes = EXCLUDED.backup_codes,
                updated_at = NOW()
            RETURNING user_id, secret, is_enabled, backup_codes, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .bind(backup_codes)
        .fetch_one(pool)
        .await
    }

    /// Loads a user's 2FA settings
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorAuth>(
            r#"
            SELECT user_id, secret, is_enabled, backup_codes, created_at, updated_at
            FROM two_factor_auth
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Whether 2FA is switched on for a user
    pub async fn is_enabled_for(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT is_enabled FROM two_factor_auth WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(enabled.unwrap_or(false))
    }

    /// Enables or disables 2FA; false if the user never ran setup
    pub async fn set_enabled(
        pool: &PgPool,
        user_id: Uuid,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE two_factor_auth
            SET is_enabled = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically removes `code` if the user still holds it
    pub async fn consume_backup_code(
        pool: &PgPool,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE two_factor_auth
            SET backup_codes = array_remove(backup_codes, $2),
                updated_at = NOW()
            WHERE user_id = $1
              AND $2 = ANY(backup_codes)
            "#,
        )
        .bind(user_id)
        .bind(code)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remaining backup codes (empty if 2FA was never set up)
    pub async fn backup_codes(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        let codes: Option<Vec<String>> =
            sqlx::query_scalar("SELECT backup_codes FROM two_factor_auth WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(codes.unwrap_or_default())
    }
}
