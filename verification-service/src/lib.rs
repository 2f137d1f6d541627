pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use service_core::error::AppError;
use service_core::middleware::{
    body_limit::body_size_limit_middleware, rate_limit::ip_rate_limit_middleware,
    rate_limit::IpRateLimiter, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};

use crate::config::{ServerProfile, VerificationConfig};
use crate::services::{FakeDelayService, JwtService, SessionService, TanService, TestResultClient};
use crate::storage::{SessionStore, TanStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: VerificationConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub tans: Arc<dyn TanStore>,
    pub session_service: SessionService,
    pub tan_service: TanService,
    pub result_client: Arc<dyn TestResultClient>,
    pub jwt: JwtService,
    pub fake_delay: Arc<FakeDelayService>,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire up the services over the given stores and collaborators.
    pub fn new(
        config: VerificationConfig,
        sessions: Arc<dyn SessionStore>,
        tans: Arc<dyn TanStore>,
        result_client: Arc<dyn TestResultClient>,
        jwt: JwtService,
    ) -> Self {
        let session_service =
            SessionService::new(sessions.clone(), config.app_session.tan_counter_max);
        let tan_service = TanService::new(tans.clone(), config.tan.clone());
        let fake_delay = Arc::new(FakeDelayService::new(
            config.fake_delay.initial_ms,
            config.fake_delay.moving_average_samples,
        ));
        let ip_rate_limiter = service_core::middleware::rate_limit::create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config,
            sessions,
            tans,
            session_service,
            tan_service,
            result_client,
            jwt,
            fake_delay,
            ip_rate_limiter,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let api = match state.config.profile {
        ServerProfile::External => Router::new()
            .route(
                "/version/v1/registrationToken",
                post(handlers::registration::generate_registration_token),
            )
            .route("/version/v1/tan", post(handlers::tan::generate_tan))
            .route(
                "/version/v1/testresult",
                post(handlers::test_result::get_test_result),
            ),
        ServerProfile::Internal => Router::new()
            .route("/version/v1/tan/verify", post(handlers::internal::verify_tan))
            .route(
                "/version/v1/tan/teletan",
                post(handlers::internal::create_tele_tan),
            )
            .route(
                "/version/v1/testresult",
                post(handlers::internal::get_test_result),
            ),
    };

    let ip_limiter = state.ip_rate_limiter.clone();
    let size_limit = state.config.request.size_limit_bytes;

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Reject oversized bodies before reading them
        .layer(from_fn_with_state(size_limit, body_size_limit_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::POST, axum::http::Method::GET])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "profile": format!("{:?}", state.config.profile),
    }))
}
