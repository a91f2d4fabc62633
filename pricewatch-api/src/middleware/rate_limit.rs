/// Per-client rate limiting
///
/// GCRA rate limiting keyed by client IP, backed by `governor`'s in-memory
/// keyed state. Each [`RateLimiter`] enforces one [`RateLimitRule`] and is
/// attached to a group of routes with `axum::middleware::from_fn_with_state`.
///
/// # Quota
///
/// A rule of `max_requests` per `window_secs` allows a burst of
/// `max_requests` and then replenishes one request every
/// `window_secs / max_requests`.
///
/// # Headers
///
/// Response includes rate limit headers:
/// - `X-RateLimit-Limit`: Requests allowed per window
/// - `X-RateLimit-Remaining`: Requests left in the current burst
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// When limiters are nested, the innermost one (the tightest route group)
/// sets the headers.
///
/// # Example
///
/// ```no_run
/// use pricewatch_api::config::RateLimitRule;
/// use pricewatch_api::middleware::rate_limit::{rate_limit, RateLimiter};
/// use axum::{middleware, routing::post, Router};
/// use std::sync::Arc;
///
/// let limiter = Arc::new(RateLimiter::new("login", RateLimitRule::new(5, 900), false));
///
/// let app: Router = Router::new()
///     .route("/api/auth/login", post(handler))
///     .route_layer(middleware::from_fn_with_state(limiter, rate_limit));
/// # async fn handler() {}
/// ```

use crate::config::RateLimitRule;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota,
};
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Client keys kept before keys back at full burst are dropped
const MAX_TRACKED_CLIENTS: usize = 10_000;

type KeyedLimiter = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether request is allowed
    pub allowed: bool,

    /// Requests left in the current burst
    pub remaining: u32,

    /// Seconds until the next request is allowed (0 when allowed)
    pub retry_after: u64,
}

/// `burst` requests, then one more every `window / burst`
fn quota_for(rule: RateLimitRule) -> Quota {
    let burst = NonZeroU32::new(rule.max_requests).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_secs(rule.window_secs.max(1)) / burst.get();

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

/// In-memory keyed limiter for one route group
pub struct RateLimiter {
    name: &'static str,
    rule: RateLimitRule,
    trust_proxy: bool,
    limiter: KeyedLimiter,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(name: &'static str, rule: RateLimitRule, trust_proxy: bool) -> Self {
        Self {
            name,
            rule,
            trust_proxy,
            limiter: governor::RateLimiter::keyed(quota_for(rule))
                .with_middleware::<StateInformationMiddleware>(),
        }
    }

    pub fn rule(&self) -> RateLimitRule {
        self.rule
    }

    /// Takes one request from `client`'s budget
    pub fn check(&self, client: &str) -> RateLimitDecision {
        if self.limiter.len() >= MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }

        match self.limiter.check_key(&client.to_string()) {
            Ok(snapshot) => RateLimitDecision {
                allowed: true,
                remaining: snapshot.remaining_burst_capacity(),
                retry_after: 0,
            },
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after: wait.as_secs_f64().ceil().max(1.0) as u64,
                }
            }
        }
    }

    /// Identifies the client a request comes from
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.trust_proxy {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());

            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }

        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Rate limiting middleware
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = limiter.client_key(request.headers(), peer);

    let decision = limiter.check(&client);

    if !decision.allowed {
        tracing::warn!(
            limiter = limiter.name,
            client = %client,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );

        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: "Too many requests, please try again later".to_string(),
        });
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if !headers.contains_key(LIMIT_HEADER) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.rule.max_requests));
        headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new("test", RateLimitRule::new(max_requests, window_secs), false)
    }

    #[test]
    fn test_burst_then_blocked() {
        let limiter = limiter(5, 900);

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let blocked = limiter.check("1.2.3.4");
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        // one request every 180 seconds
        assert!(blocked.retry_after > 170 && blocked.retry_after <= 180);

        // other clients are unaffected
        assert!(limiter.check("5.6.7.8").allowed);
    }

    #[test]
    fn test_quota_spreads_window_over_burst() {
        let quota = quota_for(RateLimitRule::new(1000, 900));
        assert_eq!(quota.burst_size().get(), 1000);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(900));
    }

    #[test]
    fn test_client_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();

        let direct = limiter(1, 1);
        assert_eq!(direct.client_key(&headers, Some(peer)), "192.0.2.1");
        assert_eq!(direct.client_key(&headers, None), "unknown");

        let proxied = RateLimiter::new("test", RateLimitRule::new(1, 1), true);
        assert_eq!(proxied.client_key(&headers, Some(peer)), "203.0.113.7");
        assert_eq!(proxied.client_key(&HeaderMap::new(), Some(peer)), "192.0.2.1");
    }

    #[tokio::test]
    async fn test_inner_limit_headers_win() {
        let outer = Arc::new(limiter(1000, 900));
        let inner = Arc::new(limiter(3, 900));

        let app = Router::new()
            .route("/login", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(inner, rate_limit))
            .layer(middleware::from_fn_with_state(outer, rate_limit));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers()[LIMIT_HEADER], "3");
        assert_eq!(response.headers()[REMAINING_HEADER], "2");
    }
}
