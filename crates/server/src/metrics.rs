//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Queueline server:
//! - HTTP request metrics (latency, counts, in flight)
//! - WebSocket connection metrics
//! - Ticket counts and running dispatchers (collected dynamically)
//!
//! Dispatcher, publisher and notifier counters live in the core crate and are
//! registered here.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use queueline_core::TicketStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "queueline_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("queueline_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "queueline_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "queueline_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "queueline_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics (collected dynamically)
// =============================================================================

/// Tickets by queue and status.
pub static TICKETS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "queueline_tickets_by_status",
            "Current ticket count by queue and status",
        ),
        &["queue_id", "status"],
    )
    .unwrap()
});

/// Queues with at least one running dispatcher.
pub static DISPATCHERS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "queueline_dispatchers_running",
        "Number of queues with a running dispatcher",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();

    // Queues
    registry
        .register(Box::new(TICKETS_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(DISPATCHERS_RUNNING.clone()))
        .unwrap();

    // Core metrics (dispatcher, publisher, notifier)
    for metric in queueline_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Ticket counts are gathered for every configured or running queue.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let running = state.supervisor().running_queues().await;
    DISPATCHERS_RUNNING.set(running.len() as i64);

    let mut queues = state.config().dispatcher.queues.clone();
    queues.extend(running);
    queues.sort_unstable();
    queues.dedup();

    for queue_id in queues {
        let stats = match state.service().queue_stats(queue_id).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!("Skipping ticket counts for queue {}: {}", queue_id, e);
                continue;
            }
        };
        let queue_label = queue_id.to_string();
        for (status, count) in [
            (TicketStatus::Waiting, stats.waiting),
            (TicketStatus::Processing, stats.processing),
            (TicketStatus::Done, stats.done),
        ] {
            TICKETS_BY_STATUS
                .with_label_values(&[&queue_label, status.as_str()])
                .set(count);
        }
    }
}

static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Applied twice: adjacent numeric segments share a slash.
    let result = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
