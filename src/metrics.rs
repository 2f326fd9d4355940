// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the cr-syncer daemon.
//!
//! This module provides metrics collection with the namespace prefix
//! `cr_syncer_cloudrobotics_com` (prometheus-safe version of
//! "cr-syncer.cloudrobotics.com").
//!
//! # Metrics Categories
//!
//! - **Sync Step Metrics** - Track sync steps per kind and direction
//! - **Object Lifecycle Metrics** - Track objects created, updated, deleted
//! - **Reconciler Metrics** - Track the size of the per-kind worker fleet
//! - **Diagnostics** - Track suspected split-brain observations

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all syncer metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "cr_syncer_cloudrobotics_com";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total number of sync steps by kind, direction and outcome
///
/// Labels:
/// - `kind`: Kind of synchronized resource
/// - `direction`: `spec` or `status`
/// - `outcome`: `success`, `error` or `skipped`
pub static SYNC_STEPS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_sync_steps_total"),
        "Total number of sync steps by kind, direction and outcome",
    );
    let counter = CounterVec::new(opts, &["kind", "direction", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of sync steps in seconds
///
/// Labels:
/// - `kind`: Kind of synchronized resource
/// - `direction`: `spec` or `status`
pub static SYNC_STEP_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_sync_step_duration_seconds"),
        "Duration of sync steps in seconds by kind and direction",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["kind", "direction"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of objects created by the syncer
///
/// Labels:
/// - `kind`: Kind of synchronized resource
/// - `cluster`: `cloud` or `robot`
pub static OBJECTS_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_objects_created_total"),
        "Total number of objects created by kind and cluster",
    );
    let counter = CounterVec::new(opts, &["kind", "cluster"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of objects updated by the syncer
///
/// Labels:
/// - `kind`: Kind of synchronized resource
/// - `cluster`: `cloud` or `robot`
pub static OBJECTS_UPDATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_objects_updated_total"),
        "Total number of objects updated by kind and cluster",
    );
    let counter = CounterVec::new(opts, &["kind", "cluster"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of objects deleted by the syncer
///
/// Labels:
/// - `kind`: Kind of synchronized resource
/// - `cluster`: `cloud` or `robot`
pub static OBJECTS_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_objects_deleted_total"),
        "Total number of objects deleted by kind and cluster",
    );
    let counter = CounterVec::new(opts, &["kind", "cluster"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of currently running per-kind reconcilers
pub static RECONCILERS_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconcilers_active"),
        "Number of currently running per-kind reconcilers",
    );
    let gauge = Gauge::with_opts(opts).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of suspected split-brain observations
///
/// Labels:
/// - `kind`: Kind of synchronized resource
pub static SPLIT_BRAIN_WARNINGS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_split_brain_warnings_total"),
        "Total number of suspected split-brain observations by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful sync step
pub fn record_sync_success(kind: &str, direction: &str, duration: Duration) {
    SYNC_STEPS_TOTAL
        .with_label_values(&[kind, direction, "success"])
        .inc();
    SYNC_STEP_DURATION_SECONDS
        .with_label_values(&[kind, direction])
        .observe(duration.as_secs_f64());
}

/// Record a failed sync step
pub fn record_sync_error(kind: &str, direction: &str, duration: Duration) {
    SYNC_STEPS_TOTAL
        .with_label_values(&[kind, direction, "error"])
        .inc();
    SYNC_STEP_DURATION_SECONDS
        .with_label_values(&[kind, direction])
        .observe(duration.as_secs_f64());
}

/// Record a sync step skipped over a malformed object
pub fn record_sync_skipped(kind: &str, direction: &str) {
    SYNC_STEPS_TOTAL
        .with_label_values(&[kind, direction, "skipped"])
        .inc();
}

/// Record object creation
pub fn record_object_created(kind: &str, cluster: &str) {
    OBJECTS_CREATED_TOTAL
        .with_label_values(&[kind, cluster])
        .inc();
}

/// Record object update
pub fn record_object_updated(kind: &str, cluster: &str) {
    OBJECTS_UPDATED_TOTAL
        .with_label_values(&[kind, cluster])
        .inc();
}

/// Record object deletion
pub fn record_object_deleted(kind: &str, cluster: &str) {
    OBJECTS_DELETED_TOTAL
        .with_label_values(&[kind, cluster])
        .inc();
}

/// Record a reconciler start
pub fn record_reconciler_started() {
    RECONCILERS_ACTIVE.inc();
}

/// Record a reconciler stop
pub fn record_reconciler_stopped() {
    RECONCILERS_ACTIVE.dec();
}

/// Record a suspected split-brain observation
pub fn record_split_brain(kind: &str) {
    SPLIT_BRAIN_WARNINGS_TOTAL.with_label_values(&[kind]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
