//! API routes.

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::checkout::create_checkout;
use crate::handlers::profile::{get_profile, update_profile};
use crate::handlers::scan::{create_scan, list_scans};
use crate::handlers::usage::get_usage;
use crate::handlers::webhook::stripe_webhook;
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let scan_routes = Router::new()
        .route("/scan", post(create_scan))
        .route("/scans", get(list_scans))
        .route("/usage", get(get_usage));

    let profile_routes = Router::new()
        .route("/profile", get(get_profile))
        .route("/profile", patch(update_profile));

    let billing_routes = Router::new().route("/checkout", post(create_checkout));

    // Webhooks authenticate via signature, not bearer token, and get their
    // own tighter rate limit
    let webhook_rate_limiter = std::sync::Arc::new(RateLimiterCache::new(5));
    let webhook_routes = Router::new()
        .route("/webhooks/stripe", post(stripe_webhook))
        .layer(middleware::from_fn_with_state(
            webhook_rate_limiter,
            rate_limit_middleware,
        ));

    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(scan_routes)
        .merge(profile_routes)
        .merge(billing_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .merge(webhook_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Body size cap; scan images arrive base64-encoded in JSON
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
