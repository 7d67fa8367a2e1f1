//! Prometheus metrics for scans and solves.
//!
//! This module provides metrics for:
//! - Markets scanned and order books fetched
//! - Opportunities detected, by direction
//! - Projection runs, failures and latency
//! - Scan latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::arbitrage::Direction;

// === Metric Name Constants ===

/// Markets scanned counter metric name.
pub const METRIC_MARKETS_SCANNED: &str = "markets_scanned_total";
/// Order books fetched counter metric name.
pub const METRIC_BOOKS_FETCHED: &str = "orderbooks_fetched_total";
/// Order book fetch failures counter metric name.
pub const METRIC_BOOK_FETCH_FAILURES: &str = "orderbook_fetch_failures_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Projections run counter metric name.
pub const METRIC_PROJECTIONS: &str = "projections_total";
/// Projection failures counter metric name.
pub const METRIC_PROJECTION_FAILURES: &str = "projection_failures_total";
/// Scan latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "scan_latency_ms";
/// Projection latency metric name.
pub const METRIC_PROJECTION_LATENCY: &str = "projection_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and register descriptions.
///
/// Idempotent: later calls return the handle from the first one. Returns
/// `None` if another recorder was installed first.
pub fn install() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_try_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|_| warn!("Metrics recorder already installed"))?;
            init_metrics();
            Ok::<_, ()>(handle)
        })
        .ok()
        .cloned()
}

/// Render the current metrics in Prometheus text format.
///
/// Empty when no recorder has been installed.
pub fn render() -> String {
    PROMETHEUS.get().map(|h| h.render()).unwrap_or_default()
}

/// Initialize all metric descriptions.
pub fn init_metrics() {
    describe_histogram!(METRIC_SCAN_LATENCY, "Full scan latency in milliseconds");
    describe_histogram!(
        METRIC_PROJECTION_LATENCY,
        "Bregman projection latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDERBOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );

    describe_counter!(METRIC_MARKETS_SCANNED, "Total number of markets scanned");
    describe_counter!(METRIC_BOOKS_FETCHED, "Total number of order books fetched");
    describe_counter!(
        METRIC_BOOK_FETCH_FAILURES,
        "Total number of order book fetches that failed"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total number of arbitrage opportunities detected"
    );
    describe_counter!(METRIC_PROJECTIONS, "Total number of projections run");
    describe_counter!(
        METRIC_PROJECTION_FAILURES,
        "Total number of projections that did not converge"
    );

    debug!("Metrics initialized");
}

/// Record order book fetch latency.
pub fn record_orderbook_fetch_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY).record(latency_ms);
}

/// Record one projection: latency, count and failure.
pub fn record_projection(start: Instant, success: bool) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_PROJECTION_LATENCY).record(latency_ms);
    counter!(METRIC_PROJECTIONS).increment(1);
    if !success {
        counter!(METRIC_PROJECTION_FAILURES).increment(1);
    }
}

/// Increment markets scanned counter.
pub fn inc_markets_scanned(count: u64) {
    counter!(METRIC_MARKETS_SCANNED).increment(count);
}

/// Increment order books fetched counter.
pub fn inc_books_fetched() {
    counter!(METRIC_BOOKS_FETCHED).increment(1);
}

/// Increment order book fetch failures counter.
pub fn inc_book_fetch_failures() {
    counter!(METRIC_BOOK_FETCH_FAILURES).increment(1);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected(direction: Direction) {
    counter!(METRIC_OPPORTUNITIES_DETECTED, "direction" => direction.to_string()).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a full scan.
pub fn timer_scan() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_LATENCY)
}
