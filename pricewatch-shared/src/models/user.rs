/// User model and database operations
///
/// A user signs up with email + password, with Google, or both once the
/// Google account is linked to an existing email. Emails are stored trimmed
/// and lowercased; the `users_email_lowercase` check constraint backs that up.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255),
///     name VARCHAR(255) NOT NULL,
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     google_id VARCHAR(255) UNIQUE,
///     avatar_url VARCHAR(1024),
///     verification_token VARCHAR(64),
///     reset_password_token VARCHAR(64),
///     reset_password_expires TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// Verification and reset tokens are stored as SHA-256 hex digests
/// (see `auth::tokens::hash_token`); lookups take the digest, never the raw
/// token.
///
/// # Example
///
/// ```no_run
/// use pricewatch_shared::models::user::{User, CreateUser};
/// # use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser::with_password(
///     "Ada",
///     "Ada@Example.com ",
///     "$argon2id$...".to_string(),
/// )).await?;
/// assert_eq!(user.email, "ada@example.com");
///
/// let found = User::find_by_email(&pool, "ADA@example.com").await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, name, is_verified, email_verified, \
    google_id, avatar_url, verification_token, reset_password_token, reset_password_expires, \
    created_at, updated_at, last_login_at";

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address (lowercase)
    pub email: String,

    /// Argon2id hash; None for accounts created through Google
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// Display name
    pub name: String,

    /// Account verified (email confirmed or signed in with Google)
    pub is_verified: bool,

    /// Email address confirmed
    pub email_verified: bool,

    /// Google account subject ID
    pub google_id: Option<String>,

    /// Profile picture URL
    pub avatar_url: Option<String>,

    #[serde(skip_serializing)]
    pub verification_token: Option<String>,

    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,

    #[serde(skip_serializing)]
    pub reset_password_expires: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// Public view of a user returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
}

/// Input for creating a new user
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    /// Email address (normalized on insert)
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: Option<String>,

    /// Display name
    pub name: String,

    /// Google subject ID for OAuth sign-ups
    pub google_id: Option<String>,

    /// Avatar URL
    pub avatar_url: Option<String>,

    /// Whether the email is already known to be verified
    pub email_verified: bool,

    /// Digest of the pending email verification token
    pub verification_token: Option<String>,
}

impl CreateUser {
    /// Input for a password registration
    pub fn with_password(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: String,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Input for a first Google sign-in; the email counts as verified
    pub fn with_google(
        name: impl Into<String>,
        email: impl Into<String>,
        google_id: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            google_id: Some(google_id.into()),
            avatar_url,
            email_verified: true,
            ..Default::default()
        }
    }
}

/// Trims and lowercases an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Public profile view
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            avatar_url: self.avatar_url.clone(),
            is_verified: self.is_verified,
        }
    }

    /// Whether the account can sign in with a password
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if the email or Google ID already exists.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, name, google_id, avatar_url,
                               email_verified, is_verified, verification_token)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(&data.email))
            .bind(data.password_hash)
            .bind(data.name.trim())
            .bind(data.google_id)
            .bind(data.avatar_url)
            .bind(data.email_verified)
            .bind(data.verification_token)
            .fetch_one(pool)
            .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email (normalized before lookup)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by Google subject ID
    pub async fn find_by_google_id(
        pool: &PgPool,
        google_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(google_id)
            .fetch_optional(pool)
            .await
    }

    /// Links a Google account to an existing user
    ///
    /// Google has confirmed the address, so the account becomes verified. An
    /// existing avatar is only replaced when Google supplies one.
    pub async fn link_google(
        pool: &PgPool,
        id: Uuid,
        google_id: &str,
        avatar_url: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET google_id = $2,
                avatar_url = COALESCE($3, avatar_url),
                email_verified = TRUE,
                is_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(google_id)
            .bind(avatar_url)
            .fetch_optional(pool)
            .await
    }

    /// Records a successful sign-in
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stores a pending email verification token digest
    pub async fn set_verification_token(
        pool: &PgPool,
        id: Uuid,
        token_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET verification_token = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks the owner of a verification token as verified
    ///
    /// The token is cleared in the same statement so it works once.
    pub async fn verify_email(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET email_verified = TRUE,
                is_verified = TRUE,
                verification_token = NULL,
                updated_at = NOW()
            WHERE verification_token = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Stores a password reset token digest and its expiry
    pub async fn set_reset_token(
        pool: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = $2,
                reset_password_expires = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the password of the user holding an unexpired reset token
    ///
    /// Returns None when the token is unknown or expired. The token is
    /// cleared on success.
    pub async fn reset_password(
        pool: &PgPool,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_password_token = NULL,
                reset_password_expires = NULL,
                updated_at = NOW()
            WHERE reset_password_token = $1
              AND reset_password_expires > NOW()
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(token_hash)
            .bind(password_hash)
            .fetch_optional(pool)
            .await
    }

    /// Deletes a user (products and 2FA settings cascade)
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_create_user_constructors() {
        let with_password = CreateUser::with_password("Ada", "ada@example.com", "hash".into());
        assert_eq!(with_password.password_hash.as_deref(), Some("hash"));
        assert!(with_password.google_id.is_none());
        assert!(!with_password.email_verified);

        let with_google = CreateUser::with_google("Ada", "ada@example.com", "g-123", None);
        assert!(with_google.password_hash.is_none());
        assert_eq!(with_google.google_id.as_deref(), Some("g-123"));
        assert!(with_google.email_verified);
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            name: "Ada".to_string(),
            is_verified: false,
            email_verified: false,
            google_id: None,
            avatar_url: None,
            verification_token: Some("digest".to_string()),
            reset_password_token: Some("digest".to_string()),
            reset_password_expires: Some(now),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("digest"));
        assert!(user.has_password());
        assert_eq!(user.profile().email, "ada@example.com");
    }
}
