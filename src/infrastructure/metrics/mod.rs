//! Prometheus Metrics Module
//!
//! Provides relay metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Ingested events by kind
//! - Published, dropped (unattributed), and failed events by kind and path
//! - Heartbeat outcomes
//! - Connected upstream rooms gauge

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Events received from the ingestion collaborator
pub static EVENTS_INGESTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_ingested_total", "Total number of ingested live events")
            .namespace("live_relay"),
        &["kind"],
    )
    .expect("Failed to create EVENTS_INGESTED_TOTAL metric")
});

/// Events handed to the message bus, by delivery path
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_published_total", "Total number of published events")
            .namespace("live_relay"),
        &["kind", "path"], // path: "drain", "live"
    )
    .expect("Failed to create EVENTS_PUBLISHED_TOTAL metric")
});

/// Events dropped because no entity could be attributed
pub static EVENTS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_dropped_total", "Total number of unattributed events")
            .namespace("live_relay"),
        &["kind"],
    )
    .expect("Failed to create EVENTS_DROPPED_TOTAL metric")
});

/// Events whose publish call failed
pub static EVENTS_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_failed_total", "Total number of failed publishes")
            .namespace("live_relay"),
        &["kind", "path"],
    )
    .expect("Failed to create EVENTS_FAILED_TOTAL metric")
});

/// Heartbeat pushes by outcome
pub static HEARTBEATS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("heartbeats_total", "Total number of heartbeat pushes").namespace("live_relay"),
        &["outcome"], // "ok", "error"
    )
    .expect("Failed to create HEARTBEATS_TOTAL metric")
});

/// Upstream rooms currently in CONNECTED state
pub static CONNECTED_ROOMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("connected_rooms", "Upstream rooms currently connected").namespace("live_relay"),
    )
    .expect("Failed to create CONNECTED_ROOMS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(EVENTS_INGESTED_TOTAL.clone()))
        .expect("Failed to register EVENTS_INGESTED_TOTAL");
    registry
        .register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("Failed to register EVENTS_PUBLISHED_TOTAL");
    registry
        .register(Box::new(EVENTS_DROPPED_TOTAL.clone()))
        .expect("Failed to register EVENTS_DROPPED_TOTAL");
    registry
        .register(Box::new(EVENTS_FAILED_TOTAL.clone()))
        .expect("Failed to register EVENTS_FAILED_TOTAL");
    registry
        .register(Box::new(HEARTBEATS_TOTAL.clone()))
        .expect("Failed to register HEARTBEATS_TOTAL");
    registry
        .register(Box::new(CONNECTED_ROOMS.clone()))
        .expect("Failed to register CONNECTED_ROOMS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record an ingested event
pub fn record_ingested(kind: &str) {
    Lazy::force(&REGISTRY);
    EVENTS_INGESTED_TOTAL.with_label_values(&[kind]).inc();
}

/// Helper to record a publish outcome
pub fn record_publish(kind: &str, path: &str, ok: bool) {
    Lazy::force(&REGISTRY);
    if ok {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind, path]).inc();
    } else {
        EVENTS_FAILED_TOTAL.with_label_values(&[kind, path]).inc();
    }
}

/// Helper to record an unattributed event
pub fn record_dropped(kind: &str) {
    Lazy::force(&REGISTRY);
    EVENTS_DROPPED_TOTAL.with_label_values(&[kind]).inc();
}

/// Helper to record a heartbeat outcome
pub fn record_heartbeat(ok: bool) {
    Lazy::force(&REGISTRY);
    HEARTBEATS_TOTAL
        .with_label_values(&[if ok { "ok" } else { "error" }])
        .inc();
}

/// Helper to update the connected room gauge
pub fn set_connected_rooms(count: usize) {
    Lazy::force(&REGISTRY);
    CONNECTED_ROOMS.set(count as i64);
}
