/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access/refresh tokens and signed OAuth state
/// - [`totp`]: RFC 6238 one-time passwords for two-factor auth
/// - [`tokens`]: random verification/reset tokens and 2FA backup codes
/// - [`middleware`]: request auth context and errors
///
/// # Example
///
/// ```no_run
/// use pricewatch_shared::auth::password::{hash_password, verify_password};
/// use pricewatch_shared::auth::jwt::{create_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), "user@example.com", TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;
pub mod totp;
