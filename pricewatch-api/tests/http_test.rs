//! HTTP tests that never reach the database
//!
//! The app runs against a lazy pool pointed at a closed port, so these cover
//! routing, middleware and request validation only.

mod common;

use axum::http::StatusCode;
use common::{request, TestContext};
use serde_json::json;

#[tokio::test]
async fn test_health_reports_database_down() {
    let ctx = TestContext::offline();

    let response = ctx.get("/api/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "OK");
    assert_eq!(response.body["message"], "Server is running");
    assert_eq!(response.body["database"], "disconnected");
    assert!(response.body["timestamp"].is_string());
}

#[tokio::test]
async fn test_products_require_token() {
    let ctx = TestContext::offline();

    let response = ctx.get("/api/products", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "unauthorized");
    assert_eq!(response.body["message"], "Not authorized, no token");
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let ctx = TestContext::offline();

    for uri in ["/api/products", "/api/auth/me", "/api/2fa/backup-codes"] {
        let response = ctx.get(uri, Some("not.a.jwt")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_register_validation() {
    let ctx = TestContext::offline();

    let bad_email = ctx
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Jo", "email": "nope", "password": common::PASSWORD }),
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_email.body["error"], "validation_error");
    assert_eq!(bad_email.body["details"][0]["field"], "email");

    let weak = ctx
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Jo", "email": "jo@example.com", "password": "password" }),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert_eq!(weak.body["details"][0]["field"], "password");

    let mismatch = ctx
        .post(
            "/api/auth/register",
            None,
            json!({
                "name": "Jo",
                "email": "jo@example.com",
                "password": common::PASSWORD,
                "confirm_password": "something else",
            }),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
    assert_eq!(mismatch.body["message"], "Passwords do not match");
}

#[tokio::test]
async fn test_register_missing_field_is_json_400() {
    let ctx = TestContext::offline();

    let response = ctx
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Jo", "email": "jo@example.com" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["details"][0]["field"], "password");
    assert_eq!(response.body["message"], "password is required");
}

#[tokio::test]
async fn test_login_wrong_type_is_json_400() {
    let ctx = TestContext::offline();

    let response = ctx
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "jo@example.com", "password": 12345 }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_malformed_json_is_json_400() {
    let ctx = TestContext::offline();

    let response = ctx
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{\"email\": "))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "bad_request");
    assert_eq!(response.body["message"], "Request body is not valid JSON");
}

#[tokio::test]
async fn test_login_rate_limited_after_burst() {
    let ctx = TestContext::offline_with(&[("RATE_LIMIT_AUTH_MAX", "3")]);
    let body = json!({ "email": "not-an-email", "password": "x" });

    for _ in 0..3 {
        let response = ctx.post("/api/auth/login", None, body.clone()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.headers["x-ratelimit-limit"], "3");
    }

    let limited = ctx.post("/api/auth/login", None, body).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.body["error"], "rate_limit_exceeded");
    assert!(limited.headers.contains_key("retry-after"));

    // Other route groups keep their own budget
    let health = ctx.get("/api/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_and_login_share_a_limit() {
    let ctx = TestContext::offline_with(&[("RATE_LIMIT_AUTH_MAX", "1")]);

    let first = ctx
        .post("/api/auth/register", None, json!({ "name": "J", "email": "x", "password": "x" }))
        .await;
    assert_eq!(first.status, StatusCode::BAD_REQUEST);

    let second = ctx
        .post("/api/auth/login", None, json!({ "email": "x", "password": "x" }))
        .await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_google_login_not_configured() {
    let ctx = TestContext::offline();

    let response = ctx.get("/api/auth/google", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("Google OAuth is not set up"));

    let callback = ctx.get("/api/auth/google/callback?code=abc", None).await;
    assert_eq!(callback.status, StatusCode::FOUND);
    assert_eq!(
        callback.headers["location"],
        "http://localhost:5173/login?error=oauth_not_configured"
    );
}

#[tokio::test]
async fn test_google_login_redirects_to_consent() {
    let ctx = TestContext::offline_with(&[
        ("GOOGLE_CLIENT_ID", "client-123"),
        ("GOOGLE_CLIENT_SECRET", "shh"),
    ]);

    let response = ctx.get("/api/auth/google", None).await;
    assert_eq!(response.status, StatusCode::FOUND);

    let location = response.headers["location"].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(location.contains("client_id=client-123"));
    assert!(location.contains("state="));

    let cookie = response.headers["set-cookie"].to_str().unwrap();
    assert!(cookie.starts_with("pricewatch_oauth_state="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_google_callback_requires_state_cookie() {
    let ctx = TestContext::offline_with(&[
        ("GOOGLE_CLIENT_ID", "client-123"),
        ("GOOGLE_CLIENT_SECRET", "shh"),
    ]);

    let login = ctx.get("/api/auth/google", None).await;
    let location = reqwest::Url::parse(login.headers["location"].to_str().unwrap()).unwrap();
    let state = location
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    let uri = format!("/api/auth/google/callback?code=abc&state={state}");

    // A genuine state replayed from a browser that never started sign-in
    let without_cookie = ctx.get(&uri, None).await;
    assert_eq!(
        without_cookie.headers["location"],
        "http://localhost:5173/login?error=auth_failed"
    );

    let mut replayed = request("GET", &uri, None, None);
    replayed.headers_mut().insert(
        "cookie",
        "pricewatch_oauth_state=someone-elses-nonce".parse().unwrap(),
    );
    let wrong_cookie = ctx.send(replayed).await;
    assert_eq!(wrong_cookie.status, StatusCode::FOUND);
    assert_eq!(
        wrong_cookie.headers["location"],
        "http://localhost:5173/login?error=auth_failed"
    );
    let cleared = wrong_cookie.headers["set-cookie"].to_str().unwrap();
    assert!(cleared.starts_with("pricewatch_oauth_state=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_google_callback_rejects_forged_state() {
    let ctx = TestContext::offline_with(&[
        ("GOOGLE_CLIENT_ID", "client-123"),
        ("GOOGLE_CLIENT_SECRET", "shh"),
    ]);

    let response = ctx
        .get("/api/auth/google/callback?code=abc&state=forged", None)
        .await;

    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(
        response.headers["location"],
        "http://localhost:5173/login?error=auth_failed"
    );
}

#[tokio::test]
async fn test_security_headers_and_not_found() {
    let ctx = TestContext::offline();

    let response = ctx.get("/api/nothing-here", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
    assert_eq!(response.body["message"], "Not found - /api/nothing-here");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert!(!response.headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_hsts_in_production() {
    let ctx = TestContext::offline_with(&[("PRODUCTION", "true")]);

    let response = ctx.get("/api/health", None).await;
    assert!(response.headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend() {
    let ctx = TestContext::offline();

    let preflight = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/api/products")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = ctx.send(preflight).await;
    assert_eq!(
        response.headers["access-control-allow-origin"],
        "http://localhost:5173"
    );

    // Unknown origins get no CORS grant
    let mut other = request("GET", "/api/health", None, None);
    other
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    let response = ctx.send(other).await;
    assert!(!response.headers.contains_key("access-control-allow-origin"));
}
