//! authgate - a thin OAuth front-end over a GoTrue-compatible identity backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Session gate middleware (protected paths)                │
//! │  - Login page / provider redirect / OAuth callback          │
//! │  - Protected pages, health, metrics                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Identity boundary                          │
//! │  - IdentityClient (per request, built from cookies)         │
//! │  - IdentityBackend trait, GoTrue HTTP implementation        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! authgate never validates a session itself: a request is authenticated
//! exactly when the identity backend reports a principal for it.
//!
//! # Modules
//!
//! - `api`: protected pages and metrics endpoint
//! - `auth`: login flow, session cookie, session gate
//! - `identity`: identity backend boundary
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod views;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Everything in here is immutable and safe to share between requests.
/// Per-request identity clients are built from it, never stored in it.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Identity backend handle
    pub identity: Arc<dyn identity::IdentityBackend>,
}

impl AppState {
    /// Initialize application state with the GoTrue backend
    ///
    /// # Errors
    /// Returns error if the HTTP client or backend cannot be built
    pub fn new(config: config::AppConfig) -> error::Result<Self> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("authgate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(
                config.identity.timeout_seconds.max(1),
            ))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let backend = identity::GoTrueBackend::new(&config.identity, Arc::new(http_client))?;
        tracing::info!(url = %config.identity.url, "Identity backend configured");

        Ok(Self::with_identity_backend(config, Arc::new(backend)))
    }

    /// Initialize application state with any identity backend
    pub fn with_identity_backend(
        config: config::AppConfig,
        identity: Arc<dyn identity::IdentityBackend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            identity,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    const MAX_BODY_BYTES: usize = 16 * 1024;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::pages_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_gate,
        ))
        .layer(middleware::from_fn(api::track_http_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
