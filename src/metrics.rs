//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_http_requests_total", "Total number of HTTP requests"),
        &["method", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "authgate_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method"]
    ).expect("metric can be created");

    // Session gate
    pub static ref GATE_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_gate_decisions_total", "Session gate decisions"),
        &["decision"]
    ).expect("metric can be created");

    // OAuth flow
    pub static ref LOGIN_REDIRECTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_login_redirects_total", "OAuth flows started"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref CALLBACK_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_callback_outcomes_total", "OAuth callback outcomes"),
        &["outcome"]
    ).expect("metric can be created");

    // Identity backend
    pub static ref IDENTITY_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_identity_errors_total", "Identity backend failures"),
        &["operation"]
    ).expect("metric can be created");
    pub static ref IDENTITY_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "authgate_identity_request_duration_seconds",
            "Identity backend request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
            .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(GATE_DECISIONS_TOTAL.clone()))
            .expect("GATE_DECISIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LOGIN_REDIRECTS_TOTAL.clone()))
            .expect("LOGIN_REDIRECTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CALLBACK_OUTCOMES_TOTAL.clone()))
            .expect("CALLBACK_OUTCOMES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(IDENTITY_ERRORS_TOTAL.clone()))
            .expect("IDENTITY_ERRORS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(IDENTITY_REQUEST_DURATION_SECONDS.clone()))
            .expect("IDENTITY_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();

        GATE_DECISIONS_TOTAL.with_label_values(&["continue"]).inc();
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"authgate_gate_decisions_total".to_string()));
    }
}
