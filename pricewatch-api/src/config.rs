/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `PORT` / `API_PORT`: Port to bind to (default: 3001)
/// - `PRODUCTION`: Enables HSTS and other production-only behaviour
/// - `JWT_SECRET`: Secret key for JWT signing (required, >= 32 chars)
/// - `SESSION_SECRET`: Signs the OAuth `state` parameter (default: JWT secret)
/// - `FRONTEND_URL`: Web client origin (default: http://localhost:5173)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: FRONTEND_URL)
/// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_CALLBACK_URL`:
///   Google sign-in; disabled unless both id and secret are set
/// - `SCRAPER_USER_AGENT`, `SCRAPER_TIMEOUT_SECS`: Product page fetching
/// - `RATE_LIMIT_{API,AUTH,PASSWORD_RESET,VERIFICATION}_{MAX,WINDOW_SECS}`:
///   Per-IP rate limits
/// - `RATE_LIMIT_TRUST_PROXY`: Key rate limits by `X-Forwarded-For`
/// - `RUST_LOG`: Log filter, `LOG_FORMAT=json` for JSON logs
///
/// # Example
///
/// ```no_run
/// use pricewatch_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use pricewatch_shared::scraper::fetcher::{FetcherConfig, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Frontend origin and CORS
    pub frontend: FrontendConfig,

    /// Google sign-in, None when not configured
    pub google: Option<GoogleOAuthConfig>,

    /// Product page scraping
    pub scraper: ScraperConfig,

    /// Per-IP rate limits
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Running in production
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Secret for signing OAuth state tokens
    pub session_secret: String,
}

/// Frontend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Base URL of the web client, used for redirects and email links
    pub url: String,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Google OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl ScraperConfig {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// One rate limit: `max_requests` per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Rate limits per endpoint group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Every `/api` route
    pub api: RateLimitRule,

    /// Register and login
    pub auth: RateLimitRule,

    /// Forgot and reset password
    pub password_reset: RateLimitRule,

    /// Resend verification email
    pub verification: RateLimitRule,

    /// Key clients by the first `X-Forwarded-For` address instead of the
    /// socket address; only safe behind a proxy that sets the header
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: RateLimitRule::new(1000, 15 * 60),
            auth: RateLimitRule::new(5, 15 * 60),
            password_reset: RateLimitRule::new(3, 60 * 60),
            verification: RateLimitRule::new(3, 60 * 60),
            trust_proxy: false,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {value}")),
        None => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn rate_limit_rule(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: RateLimitRule,
) -> anyhow::Result<RateLimitRule> {
    let rule = RateLimitRule {
        max_requests: parse_or(lookup, &format!("RATE_LIMIT_{name}_MAX"), default.max_requests)?,
        window_secs: parse_or(
            lookup,
            &format!("RATE_LIMIT_{name}_WINDOW_SECS"),
            default.window_secs,
        )?,
    };

    if rule.max_requests == 0 || rule.window_secs == 0 {
        anyhow::bail!("RATE_LIMIT_{name} values must be greater than zero");
    }

    Ok(rule)
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_host = non_empty(&lookup, "API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let api_port = match non_empty(&lookup, "PORT") {
            Some(_) => parse_or(&lookup, "PORT", 3001u16)?,
            None => parse_or(&lookup, "API_PORT", 3001u16)?,
        };

        let database_url = non_empty(&lookup, "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret = non_empty(&lookup, "JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let session_secret =
            non_empty(&lookup, "SESSION_SECRET").unwrap_or_else(|| jwt_secret.clone());

        let frontend_url = non_empty(&lookup, "FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origins = match non_empty(&lookup, "CORS_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![frontend_url.clone()],
        };

        let google = match (
            non_empty(&lookup, "GOOGLE_CLIENT_ID"),
            non_empty(&lookup, "GOOGLE_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                callback_url: non_empty(&lookup, "GOOGLE_CALLBACK_URL").unwrap_or_else(|| {
                    format!("http://localhost:{api_port}/api/auth/google/callback")
                }),
            }),
            _ => None,
        };

        let defaults = ScraperConfig::default();
        let scraper = ScraperConfig {
            user_agent: non_empty(&lookup, "SCRAPER_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout_secs: parse_or(&lookup, "SCRAPER_TIMEOUT_SECS", defaults.timeout_secs)?,
        };

        let limits = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            api: rate_limit_rule(&lookup, "API", limits.api)?,
            auth: rate_limit_rule(&lookup, "AUTH", limits.auth)?,
            password_reset: rate_limit_rule(&lookup, "PASSWORD_RESET", limits.password_reset)?,
            verification: rate_limit_rule(&lookup, "VERIFICATION", limits.verification)?,
            trust_proxy: parse_flag(lookup("RATE_LIMIT_TRUST_PROXY")),
        };

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                production: parse_flag(lookup("PRODUCTION")),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                session_secret,
            },
            frontend: FrontendConfig {
                url: frontend_url,
                cors_origins,
            },
            google,
            scraper,
            rate_limit,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgresql://localhost/pricewatch"),
            ("JWT_SECRET", SECRET),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = load(&minimal()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert!(!config.api.production);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.jwt.session_secret, SECRET);
        assert_eq!(config.frontend.url, "http://localhost:5173");
        assert_eq!(config.frontend.cors_origins, vec!["http://localhost:5173"]);
        assert!(config.google.is_none());
        assert_eq!(config.scraper.timeout_secs, 30);
        assert_eq!(config.rate_limit.auth, RateLimitRule::new(5, 900));
        assert_eq!(config.rate_limit.api, RateLimitRule::new(1000, 900));
    }

    #[test]
    fn test_required_variables() {
        let missing_db = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(missing_db.to_string().contains("DATABASE_URL"));

        let short_secret = load(&[
            ("DATABASE_URL", "postgresql://localhost/pricewatch"),
            ("JWT_SECRET", "short"),
        ])
        .unwrap_err();
        assert!(short_secret.to_string().contains("at least 32"));
    }

    #[test]
    fn test_port_precedence() {
        let mut vars = minimal();
        vars.push(("API_PORT", "8080"));
        assert_eq!(load(&vars).unwrap().api.port, 8080);

        vars.push(("PORT", "9000"));
        assert_eq!(load(&vars).unwrap().api.port, 9000);

        let mut bad = minimal();
        bad.push(("PORT", "not-a-port"));
        assert!(load(&bad).is_err());
    }

    #[test]
    fn test_google_requires_id_and_secret() {
        let mut vars = minimal();
        vars.push(("GOOGLE_CLIENT_ID", "client"));
        assert!(load(&vars).unwrap().google.is_none());

        vars.push(("GOOGLE_CLIENT_SECRET", "secret"));
        let google = load(&vars).unwrap().google.unwrap();
        assert_eq!(google.callback_url, "http://localhost:3001/api/auth/google/callback");
    }

    #[test]
    fn test_overrides() {
        let mut vars = minimal();
        vars.extend([
            ("FRONTEND_URL", "https://app.example.com/"),
            ("CORS_ORIGINS", "https://a.example.com, https://b.example.com"),
            ("PRODUCTION", "true"),
            ("SESSION_SECRET", "session"),
            ("RATE_LIMIT_AUTH_MAX", "50"),
            ("SCRAPER_TIMEOUT_SECS", "5"),
        ]);

        let config = load(&vars).unwrap();

        assert_eq!(config.frontend.url, "https://app.example.com");
        assert_eq!(
            config.frontend.cors_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert!(config.api.production);
        assert_eq!(config.jwt.session_secret, "session");
        assert_eq!(config.rate_limit.auth, RateLimitRule::new(50, 900));
        assert_eq!(config.scraper.fetcher_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut vars = minimal();
        vars.push(("RATE_LIMIT_API_MAX", "0"));
        assert!(load(&vars).is_err());
    }
}
