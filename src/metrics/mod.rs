//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status and polling progress
//! - Requests and blob payloads processed
//! - Transaction submission outcomes and latency

use crate::error::{SubmitterError, SubmitterResult};
use crate::events::ContractEvent;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: Gauge = register_gauge!(
        "blob_relayer_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)"
    ).unwrap();

    pub static ref CHAIN_BLOCK_HEIGHT: Gauge = register_gauge!(
        "blob_relayer_chain_block_height",
        "Last block whose logs were processed"
    ).unwrap();

    // Event metrics
    pub static ref EVENTS_RECEIVED: CounterVec = register_counter_vec!(
        "blob_relayer_events_received_total",
        "Total events received by type",
        &["event_type"]
    ).unwrap();

    // Pipeline metrics
    pub static ref REQUESTS_PROCESSED: CounterVec = register_counter_vec!(
        "blob_relayer_requests_processed_total",
        "Requests run through the pipeline by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref BLOBS_ENCODED: Counter = register_counter!(
        "blob_relayer_blobs_encoded_total",
        "Total blobs produced by the encoder"
    ).unwrap();

    pub static ref PIPELINE_LATENCY: Histogram = register_histogram!(
        "blob_relayer_pipeline_latency_seconds",
        "Time from request pickup to submission",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: Counter = register_counter!(
        "blob_relayer_transactions_submitted_total",
        "Total transactions accepted by the node"
    ).unwrap();

    pub static ref TX_REJECTED: Counter = register_counter!(
        "blob_relayer_transactions_rejected_total",
        "Total transactions rejected by the node"
    ).unwrap();

    pub static ref TX_TIMED_OUT: Counter = register_counter!(
        "blob_relayer_transactions_timed_out_total",
        "Total submissions with no answer before the timeout"
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: Counter = register_counter!(
        "blob_relayer_health_check_success_total",
        "Total successful health checks"
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: Counter = register_counter!(
        "blob_relayer_health_check_failure_total",
        "Total failed health checks"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> SubmitterResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| SubmitterError::Config(format!("Cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| SubmitterError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Text exposition of every registered metric
pub fn render() -> SubmitterResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| SubmitterError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| SubmitterError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_chain_health(healthy: bool) {
    CHAIN_CONNECTED.set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_blocks_processed(block_number: u64) {
    CHAIN_BLOCK_HEIGHT.set(block_number as f64);
}

pub fn record_event(event: &ContractEvent) {
    EVENTS_RECEIVED.with_label_values(&[event.name()]).inc();
}

pub fn record_request_processed(success: bool) {
    let outcome = if success { "submitted" } else { "failed" };
    REQUESTS_PROCESSED.with_label_values(&[outcome]).inc();
}

pub fn record_blobs_encoded(count: usize) {
    BLOBS_ENCODED.inc_by(count as f64);
}

pub fn record_pipeline_latency(latency_secs: f64) {
    PIPELINE_LATENCY.observe(latency_secs);
}

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_tx_rejected() {
    TX_REJECTED.inc();
}

/// Outcome unknown: the node may still include the transaction
pub fn record_tx_timed_out() {
    TX_TIMED_OUT.inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        record_blobs_encoded(2);
        record_tx_submitted();
        let text = render().unwrap();
        assert!(text.contains("blob_relayer_blobs_encoded_total"));
        assert!(text.contains("blob_relayer_transactions_submitted_total"));
    }
}
