//! Prometheus metrics for ubsa
//!
//! Defines metrics for:
//! - Storage operation counts by provider, operation and status
//! - Storage operation duration

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;
use std::sync::Once;
use tracing::debug;

use crate::config::Provider;
use crate::errors::Result;

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Storage operation counter by provider, operation and status
    pub static ref STORAGE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("ubsa_storage_operations_total", "Total storage operations"),
        &["provider", "operation", "status"]
    )
    .expect("Failed to create STORAGE_OPERATIONS metric");

    /// Storage operation duration histogram
    pub static ref STORAGE_OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ubsa_storage_operation_duration_seconds",
            "Storage operation duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["provider", "operation"]
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric");
}

static INIT: Once = Once::new();

/// Register metrics with the crate registry. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        for collector in [
            Box::new(STORAGE_OPERATIONS.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(STORAGE_OPERATION_DURATION.clone()),
        ] {
            if let Err(e) = REGISTRY.register(collector) {
                debug!(error = %e, "metric already registered");
            }
        }
    });
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        debug!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Run one adapter operation, recording its outcome and latency.
pub(crate) async fn track<T, F>(provider: Provider, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timer = STORAGE_OPERATION_DURATION
        .with_label_values(&[provider.as_str(), operation])
        .start_timer();
    let result = fut.await;
    timer.observe_duration();

    let status = match &result {
        Ok(_) => "ok",
        Err(e) => {
            debug!(provider = %provider, operation, error = %e, "storage operation failed");
            "error"
        }
    };
    STORAGE_OPERATIONS
        .with_label_values(&[provider.as_str(), operation, status])
        .inc();
    result
}
