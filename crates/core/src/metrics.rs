//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Tickets (creation, status updates, archival)
//! - Dispatchers (passes, reservations, store errors)
//! - Publishing (durable appends, delivery gaps, broadcasts)
//! - Live notifier (forwarded messages, pings, lag)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Tickets
// =============================================================================

/// Tickets created total by queue.
pub static TICKETS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("queueline_tickets_created_total", "Total tickets created"),
        &["queue_id"],
    )
    .unwrap()
});

/// Conditional status updates by result.
pub static STATUS_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "queueline_status_updates_total",
            "Total conditional status updates",
        ),
        &["result"], // "applied", "conflict", "rejected", "error"
    )
    .unwrap()
});

/// Tickets moved to history.
pub static TICKETS_ARCHIVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "queueline_tickets_archived_total",
        "Total tickets moved to history",
    )
    .unwrap()
});

// =============================================================================
// Dispatchers
// =============================================================================

/// Drain passes by queue.
pub static DRAIN_PASSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("queueline_drain_passes_total", "Total dispatcher drain passes"),
        &["queue_id"],
    )
    .unwrap()
});

/// Successful reservations by queue.
pub static RESERVATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("queueline_reservations_total", "Total tickets reserved"),
        &["queue_id"],
    )
    .unwrap()
});

/// Failed reservation attempts by queue.
pub static RESERVE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "queueline_reserve_errors_total",
            "Total reservation attempts that failed in the store",
        ),
        &["queue_id"],
    )
    .unwrap()
});

/// Reservation attempts that found the write lock taken, by queue.
pub static RESERVE_CONTENDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "queueline_reserve_contended_total",
            "Total reservation attempts that yielded to another writer",
        ),
        &["queue_id"],
    )
    .unwrap()
});

// =============================================================================
// Publishing
// =============================================================================

/// Durable appends that landed.
pub static DURABLE_APPENDS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "queueline_durable_appends_total",
        "Total events appended to durable logs",
    )
    .unwrap()
});

/// Durable append duration in seconds.
pub static DURABLE_APPEND_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "queueline_durable_append_duration_seconds",
            "Duration of durable log appends",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5]),
    )
    .unwrap()
});

/// Durable deliveries that did not happen, by reason.
pub static DELIVERY_GAPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "queueline_delivery_gaps_total",
            "Total events missing from durable logs",
        ),
        &["reason"], // "timeout", "log_error", "queue_full", "closed", "worker"
    )
    .unwrap()
});

/// Broadcast attempts by result.
pub static BROADCASTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("queueline_broadcasts_total", "Total broadcast attempts"),
        &["result"], // "delivered", "no_subscribers", "error"
    )
    .unwrap()
});

// =============================================================================
// Live notifier
// =============================================================================

pub static NOTIFIER_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "queueline_notifier_messages_total",
        "Total messages relayed to observers",
    )
    .unwrap()
});

pub static NOTIFIER_PINGS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("queueline_notifier_pings_total", "Total keepalive pings sent").unwrap()
});

/// Messages observers missed by falling behind.
pub static NOTIFIER_LAGGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "queueline_notifier_lagged_messages_total",
        "Total messages dropped for lagging observers",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Tickets
        Box::new(TICKETS_CREATED.clone()),
        Box::new(STATUS_UPDATES.clone()),
        Box::new(TICKETS_ARCHIVED.clone()),
        // Dispatchers
        Box::new(DRAIN_PASSES.clone()),
        Box::new(RESERVATIONS.clone()),
        Box::new(RESERVE_ERRORS.clone()),
        Box::new(RESERVE_CONTENDED.clone()),
        // Publishing
        Box::new(DURABLE_APPENDS.clone()),
        Box::new(DURABLE_APPEND_DURATION.clone()),
        Box::new(DELIVERY_GAPS.clone()),
        Box::new(BROADCASTS.clone()),
        // Live notifier
        Box::new(NOTIFIER_MESSAGES.clone()),
        Box::new(NOTIFIER_PINGS.clone()),
        Box::new(NOTIFIER_LAGGED.clone()),
    ]
}
