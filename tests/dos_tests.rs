//! `DoS` and input-limit tests for the HTTP API
//!
//! These drive the real router in-process and check that oversized or
//! malformed requests are rejected before any engine runs, and that every
//! response carries the browser hardening headers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use loan_matcher::utils::validation::{
    validate_request, ValidationError, MAX_DESCRIPTION_CHARS, MAX_PARTIAL_QUERY_CHARS,
};
use loan_matcher::web::server::{create_router, MAX_REQUEST_BODY_BYTES};
use loan_matcher::{Collaborators, InMemoryDirectory, MatcherConfig, SmartSuggestionService};
use rust_decimal_macros::dec;
use tower::ServiceExt;

fn service() -> Arc<SmartSuggestionService> {
    let directory = Arc::new(InMemoryDirectory::new());
    Arc::new(SmartSuggestionService::build_default(
        &Collaborators::from_directory(directory),
        &MatcherConfig::default(),
    ))
}

fn router(service: Arc<SmartSuggestionService>) -> Router {
    create_router(service).expect("router should build")
}

/// Requests need a peer address for the IP rate limiter
fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("request should build");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    request
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[test]
fn test_description_length_limits() {
    let longest = "a".repeat(MAX_DESCRIPTION_CHARS);
    assert!(validate_request(&longest, dec!(1)).is_ok());

    let too_long = "a".repeat(MAX_DESCRIPTION_CHARS + 1);
    assert_eq!(
        validate_request(&too_long, dec!(1)),
        Err(ValidationError::DescriptionTooLong)
    );

    // Limits count characters, not bytes
    let cyrillic = "ж".repeat(MAX_DESCRIPTION_CHARS);
    assert!(cyrillic.len() > MAX_DESCRIPTION_CHARS);
    assert!(validate_request(&cyrillic, dec!(1)).is_ok());
}

#[test]
fn test_limits_are_reasonable() {
    assert!(MAX_PARTIAL_QUERY_CHARS < MAX_DESCRIPTION_CHARS);
    assert!(MAX_DESCRIPTION_CHARS * 4 < MAX_REQUEST_BODY_BYTES);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let service = service();
    let padding = "x".repeat(MAX_REQUEST_BODY_BYTES + 1);
    let body = format!(r#"{{"description":"{padding}","amount":"10"}}"#);

    let response = router(service.clone())
        .oneshot(request(Method::POST, "/api/suggestions", Body::from(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(service.performance_report().iter().all(|p| p.total_runs == 0));
}

#[tokio::test]
async fn test_long_description_is_bad_request() {
    let service = service();
    let description = "a".repeat(MAX_DESCRIPTION_CHARS + 1);
    let body = serde_json::json!({"description": description, "amount": "10"}).to_string();

    let response = router(service.clone())
        .oneshot(request(Method::POST, "/api/suggestions", Body::from(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "invalid_input");
    assert!(json["details"].is_null());
    assert!(service.performance_report().iter().all(|p| p.total_runs == 0));
}

#[tokio::test]
async fn test_non_positive_amount_is_bad_request() {
    let body = serde_json::json!({"description": "Office rent payment", "amount": "-5"}).to_string();
    let response = router(service())
        .oneshot(request(Method::POST, "/api/suggestions", Body::from(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let response = router(service())
        .oneshot(request(
            Method::POST,
            "/api/suggestions",
            Body::from(r#"{"description": "unterminated"#),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_long_quick_query_returns_nothing() {
    let query = "a".repeat(MAX_PARTIAL_QUERY_CHARS + 1);
    let response = router(service())
        .oneshot(request(
            Method::GET,
            &format!("/api/suggestions/quick?q={query}"),
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_unknown_suggestion_does_not_leak_details() {
    let response = router(service())
        .oneshot(request(
            Method::GET,
            "/api/suggestions/phone_priority_deadbeef0000",
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "suggestion_not_found");
    assert!(json["details"].is_null());
}

#[tokio::test]
async fn test_invalid_feedback_target_is_bad_request() {
    let body = serde_json::json!({
        "suggestion_id": "phone_priority_deadbeef0000",
        "was_correct": false,
        "actual_target_id": "customer:12",
    })
    .to_string();
    let response = router(service())
        .oneshot(request(Method::POST, "/api/feedback", Body::from(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_type"], "invalid_target");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = router(service());
    for (method, uri) in [
        (Method::GET, "/api/stats"),
        (Method::GET, "/api/suggestions/unknown_id"),
        (Method::POST, "/api/engines/nope/disable"),
    ] {
        let response = app
            .clone()
            .oneshot(request(method, uri, Body::empty()))
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert_eq!(headers["x-frame-options"], "DENY", "{uri}");
        assert_eq!(headers["referrer-policy"], "no-referrer", "{uri}");
        assert_eq!(headers["cache-control"], "no-store", "{uri}");
    }
}

#[tokio::test]
async fn test_rate_limit_kicks_in_after_burst() {
    let app = router(service());
    let mut limited = false;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/stats", Body::empty()))
            .await
            .unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited = true;
            break;
        }
    }
    assert!(limited, "burst of 200 requests should be rate limited");
}

#[tokio::test]
async fn test_pattern_refresh_route() {
    let response = router(service())
        .oneshot(request(Method::POST, "/api/patterns/refresh", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["refreshed_transactions"], 0);
}
