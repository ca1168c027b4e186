//! Axum HTTP API server.
//!
//! This crate provides:
//! - Scan endpoint with usage metering (admin bypass, subscription credits,
//!   daily free quota)
//! - Firebase ID token verification
//! - Stripe checkout and webhook fulfillment
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{EntitlementService, EntitlementStore};
pub use state::AppState;
