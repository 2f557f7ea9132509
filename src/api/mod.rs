//! API layer
//!
//! HTTP handlers for:
//! - Protected pages
//! - Metrics (Prometheus)

pub mod metrics;
mod pages;

pub use metrics::{metrics_router, track_http_metrics};
pub use pages::pages_router;
