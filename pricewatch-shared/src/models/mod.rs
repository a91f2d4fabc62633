/// Database models and their queries
///
/// - `user`: accounts (password and Google)
/// - `product`: tracked product URLs
/// - `price_history`: append-only price observations per product
/// - `two_factor`: TOTP secrets and backup codes
///
/// # Example
///
/// ```no_run
/// use pricewatch_shared::models::user::{User, CreateUser};
/// use pricewatch_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::new("postgresql://localhost/pricewatch", 5)).await?;
///
/// let user = User::create(&pool, CreateUser::with_password(
///     "Ada",
///     "ada@example.com",
///     "$argon2id$...".to_string(),
/// )).await?;
/// # Ok(())
/// # }
/// ```

pub mod price_history;
pub mod product;
pub mod two_factor;
pub mod user;
