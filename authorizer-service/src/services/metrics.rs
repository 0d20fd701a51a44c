use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static LOGINS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PERMISSION_SYNC_BATCHES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Login outcomes recorded under `authorizer_logins_total{outcome}`.
pub const LOGIN_ISSUED: &str = "issued";
pub const LOGIN_REUSED: &str = "reused";
pub const LOGIN_REJECTED: &str = "rejected";

pub const BATCH_COMMITTED: &str = "committed";
pub const BATCH_FAILED: &str = "failed";

/// Register all collectors. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let logins_total = IntCounterVec::new(
        Opts::new("authorizer_logins_total", "Login attempts by outcome"),
        &["outcome"],
    )?;
    let sync_batches_total = IntCounterVec::new(
        Opts::new(
            "authorizer_permission_sync_batches_total",
            "Permission sync batches by result",
        ),
        &["result"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(logins_total.clone()))?;
    registry.register(Box::new(sync_batches_total.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = LOGINS_TOTAL.set(logins_total);
    let _ = PERMISSION_SYNC_BATCHES_TOTAL.set(sync_batches_total);
    Ok(())
}

pub fn record_login(outcome: &str) {
    if let Some(counter) = LOGINS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_sync_batch(result: &str) {
    if let Some(counter) = PERMISSION_SYNC_BATCHES_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
