use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::cli::ServeArgs;
use crate::core::types::{MatchMode, TargetId};
use crate::engines::recurring::PatternSnapshot;
use crate::matching::confidence::CalibrationSnapshot;
use crate::matching::{SmartSuggestionService, SuggestionError};

/// Security configuration constants to prevent `DoS` attacks
pub const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024; // 8MB, large pattern imports
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_CONCURRENT_REQUESTS: usize = 100;
pub const RATE_LIMIT_PER_SECOND: u64 = 10;
pub const RATE_LIMIT_BURST: u32 = 50;

/// Default number of autocomplete entries
const DEFAULT_QUICK_LIMIT: usize = 5;

/// Shared application state
pub struct AppState {
    pub service: Arc<SmartSuggestionService>,
}

/// Enhanced error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionRequest {
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub mode: MatchMode,
}

#[derive(Debug, Deserialize)]
struct QuickParams {
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub suggestion_id: String,
    pub was_correct: bool,
    /// `loan:<id>` or `account:<code>`
    pub actual_target_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LearnRequest {
    pub description: String,
    pub account: String,
}

/// Create a safe error response that prevents information disclosure
/// while logging detailed errors server-side for debugging
pub fn create_safe_error_response(
    error_type: &str,
    user_message: &str,
    internal_error: Option<&str>,
) -> ErrorResponse {
    // Log detailed error server-side for debugging (not exposed to client)
    if let Some(internal_msg) = internal_error {
        tracing::error!("Internal error ({}): {}", error_type, internal_msg);
    }

    ErrorResponse {
        error: user_message.to_string(),
        error_type: error_type.to_string(),
        details: None, // Never expose internal details to prevent information disclosure
    }
}

fn error_response(
    status: StatusCode,
    error_type: &str,
    user_message: &str,
    internal_error: Option<&str>,
) -> Response {
    (
        status,
        Json(create_safe_error_response(error_type, user_message, internal_error)),
    )
        .into_response()
}

/// Map a service error to a status code and a sanitised body
fn service_error_response(error: &SuggestionError) -> Response {
    match error {
        SuggestionError::InvalidInput(e) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_input", &e.to_string(), None)
        }
        SuggestionError::NotFound(_) => error_response(
            StatusCode::NOT_FOUND,
            "suggestion_not_found",
            "Suggestion not found or expired",
            None,
        ),
        SuggestionError::Registry(e) => {
            error_response(StatusCode::NOT_FOUND, "unknown_engine", &e.to_string(), None)
        }
        SuggestionError::Calibration(e) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_calibration",
            "Calibration snapshot rejected",
            Some(&e.to_string()),
        ),
        SuggestionError::Pattern(e) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_pattern",
            "Pattern rejected",
            Some(&e.to_string()),
        ),
        SuggestionError::PatternsUnavailable => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "patterns_unavailable",
            "No recurring pattern engine is configured",
            None,
        ),
        SuggestionError::PatternRefresh(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "pattern_refresh_failed",
            "Pattern history is unavailable",
            Some(&e.to_string()),
        ),
    }
}

/// Run the web server
///
/// # Errors
///
/// Returns an error if the data cannot be loaded, the tokio runtime cannot
/// be created or the server fails to start.
pub fn run(args: ServeArgs) -> anyhow::Result<()> {
    let service = Arc::new(args.data.build_service(false)?);

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move { run_server(args, service).await })
}

/// Create the application router with all routes and middleware configured.
///
/// # Errors
///
/// Returns an error if the rate limiter configuration is rejected.
pub fn create_router(service: Arc<SmartSuggestionService>) -> anyhow::Result<Router> {
    let state = Arc::new(AppState { service });

    // Configure IP-based rate limiting
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(RATE_LIMIT_PER_SECOND)
        .burst_size(RATE_LIMIT_BURST)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;

    // Build router with comprehensive security layers
    let app = Router::new()
        .route("/api/suggestions", post(suggestions_handler))
        .route("/api/suggestions/quick", get(quick_handler))
        .route("/api/suggestions/{id}", get(suggestion_details_handler))
        .route("/api/feedback", post(feedback_handler))
        .route("/api/engines", get(engines_handler))
        .route("/api/engines/self-test", get(self_test_handler))
        .route("/api/engines/{name}/enable", post(enable_engine_handler))
        .route("/api/engines/{name}/disable", post(disable_engine_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route(
            "/api/calibration",
            get(export_calibration_handler).post(import_calibration_handler),
        )
        .route("/api/calibration/weights", get(weight_proposals_handler))
        .route(
            "/api/calibration/weights/apply",
            post(apply_weights_handler),
        )
        .route("/api/calibration/trends", get(trends_handler))
        .route(
            "/api/patterns",
            get(export_patterns_handler).post(import_patterns_handler),
        )
        .route("/api/patterns/learn", post(learn_pattern_handler))
        .route("/api/patterns/refresh", post(refresh_patterns_handler))
        .route("/api/patterns/stats", get(pattern_stats_handler))
        .route("/api/stats", get(stats_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Security headers for browser protection
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-frame-options"),
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("referrer-policy"),
                    HeaderValue::from_static("no-referrer"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("cache-control"),
                    HeaderValue::from_static("no-store"),
                ))
                // IP-based rate limiting to prevent abuse
                .layer(GovernorLayer {
                    config: Arc::new(governor_conf),
                })
                // Request timeout to prevent slow client attacks
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(REQUEST_TIMEOUT_SECS),
                ))
                // Limit concurrent requests to prevent DOS
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES)),
        );

    Ok(app)
}

async fn run_server(args: ServeArgs, service: Arc<SmartSuggestionService>) -> anyhow::Result<()> {
    let app = create_router(service)?;

    let addr = format!("{}:{}", args.address, args.port);
    println!("Starting loan-matcher API at http://{addr}");

    if args.open {
        let _ = open::that(format!("http://{addr}/api/stats"));
    }

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn suggestions_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SuggestionRequest>,
) -> Response {
    match state
        .service
        .get_suggestions(&request.description, request.amount, request.mode)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn quick_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuickParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_QUICK_LIMIT);
    Json(state.service.get_quick_suggestions(&params.q, limit)).into_response()
}

async fn suggestion_details_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.service.get_suggestion_details(&id) {
        Some(details) => Json(details).into_response(),
        None => service_error_response(&SuggestionError::NotFound(id)),
    }
}

async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Response {
    let actual_target = match request.actual_target_id.as_deref().map(str::parse::<TargetId>) {
        None => None,
        Some(Ok(target)) => Some(target),
        Some(Err(e)) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_target", &e, None);
        }
    };

    match state
        .service
        .provide_feedback(&request.suggestion_id, request.was_correct, actual_target)
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn engines_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.performance_report()).into_response()
}

async fn self_test_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.self_test()).into_response()
}

async fn enable_engine_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.service.enable_engine(&name) {
        Ok(()) => Json(serde_json::json!({"engine": name, "enabled": true})).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn disable_engine_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.service.disable_engine(&name) {
        Ok(()) => Json(serde_json::json!({"engine": name, "enabled": false})).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Response {
    let removed = state.service.clear_cache();
    Json(serde_json::json!({"cache_cleared": true, "removed": removed})).into_response()
}

async fn export_calibration_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.export_calibration()).into_response()
}

async fn import_calibration_handler(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<CalibrationSnapshot>,
) -> Response {
    match state.service.import_calibration(snapshot) {
        Ok(imported) => Json(serde_json::json!({"imported_feedback": imported})).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn weight_proposals_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.weight_proposals()).into_response()
}

async fn apply_weights_handler(State(state): State<Arc<AppState>>) -> Response {
    let applied = state.service.apply_weight_proposals();
    Json(serde_json::json!({
        "applied": applied,
        "engine_weights": state.service.calculator().engine_weights(),
    }))
    .into_response()
}

async fn trends_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({
        "trends": state.service.confidence_trends(),
        "accuracy": state.service.engine_accuracy(),
    }))
    .into_response()
}

async fn export_patterns_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.export_patterns() {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn import_patterns_handler(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<PatternSnapshot>,
) -> Response {
    match state.service.import_patterns(snapshot) {
        Ok(imported) => Json(serde_json::json!({"imported_patterns": imported})).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn learn_pattern_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnRequest>,
) -> Response {
    match state
        .service
        .learn_pattern(&request.description, &request.account)
    {
        Ok(learned) => Json(learned).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn refresh_patterns_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.refresh_patterns() {
        Ok(learned) => Json(serde_json::json!({"refreshed_transactions": learned})).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn pattern_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.pattern_statistics() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => service_error_response(&e),
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.statistics()).into_response()
}
