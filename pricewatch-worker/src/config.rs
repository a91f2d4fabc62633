/// Worker configuration
///
/// Loaded from environment variables (and `.env` in development).
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required)
/// - `DATABASE_MAX_CONNECTIONS` (default 5)
/// - `SCRAPE_INTERVAL_SECS` (default 3600)
/// - `SCRAPER_USER_AGENT`, `SCRAPER_TIMEOUT_SECS` (default 30)

use anyhow::Context;
use pricewatch_shared::scraper::FetcherConfig;
use std::env;
use std::time::Duration;

/// Default time between batch runs
pub const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Time between the starts of two batch runs
    pub scrape_interval: Duration,
    pub fetcher: FetcherConfig,
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value}")),
        None => Ok(default),
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let interval_secs =
            parse_or(&lookup, "SCRAPE_INTERVAL_SECS", DEFAULT_SCRAPE_INTERVAL_SECS)?;
        if interval_secs == 0 {
            anyhow::bail!("SCRAPE_INTERVAL_SECS must be greater than zero");
        }

        let defaults = FetcherConfig::default();
        let fetcher = FetcherConfig {
            user_agent: lookup("SCRAPER_USER_AGENT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "SCRAPER_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        };

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?,
            scrape_interval: Duration::from_secs(interval_secs),
            fetcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<WorkerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/pw")]).unwrap();

        assert_eq!(config.scrape_interval, Duration::from_secs(3600));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.fetcher.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/pw"),
            ("SCRAPE_INTERVAL_SECS", "600"),
            ("SCRAPER_TIMEOUT_SECS", "5"),
            ("SCRAPER_USER_AGENT", "pw-test"),
        ])
        .unwrap();

        assert_eq!(config.scrape_interval, Duration::from_secs(600));
        assert_eq!(config.fetcher.timeout, Duration::from_secs(5));
        assert_eq!(config.fetcher.user_agent, "pw-test");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("SCRAPE_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("SCRAPE_INTERVAL_SECS", "hourly")]).is_err());
    }
}
