//! Prometheus metrics for kdesk.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Broker call attempts per transport.
/// Labels: transport, outcome (ok/api_error/transport_error)
pub static TRANSPORT_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kdesk_transport_attempts_total",
        "Broker call attempts per transport",
        &["transport", "outcome"]
    )
    .unwrap()
});

/// Broker call latency in milliseconds.
pub static BROKER_REQUEST_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "kdesk_broker_request_duration_ms",
        "Broker call latency in milliseconds, across all transports",
        &["endpoint"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Order placement results.
/// Labels: outcome (placed/market_closed/rejected/failed)
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("kdesk_orders_total", "Order placement results", &["outcome"]).unwrap()
});

/// Broker session state (1 = connected).
pub static SESSION_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "kdesk_session_connected",
        "Broker session state (1=connected)"
    )
    .unwrap()
});

/// Position monitor ticks.
/// Labels: outcome (updated/fetch_failed/stopped)
pub static MONITOR_TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kdesk_monitor_ticks_total",
        "Position monitor ticks",
        &["outcome"]
    )
    .unwrap()
});

/// Number of deployments with an active monitor.
pub static DEPLOYMENTS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "kdesk_deployments_running",
        "Deployments with an active position monitor"
    )
    .unwrap()
});

/// Relay requests.
/// Labels: method, status
pub static RELAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kdesk_relay_requests_total",
        "Requests forwarded by the relay",
        &["method", "status"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record one transport attempt.
    pub fn transport_attempt(transport: &str, outcome: &str) {
        TRANSPORT_ATTEMPTS_TOTAL
            .with_label_values(&[transport, outcome])
            .inc();
    }

    /// Record broker call latency.
    pub fn broker_request_duration(endpoint: &str, duration_ms: f64) {
        BROKER_REQUEST_DURATION_MS
            .with_label_values(&[endpoint])
            .observe(duration_ms);
    }

    /// Record an order placement outcome.
    pub fn order(outcome: &str) {
        ORDERS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn session_connected(connected: bool) {
        SESSION_CONNECTED.set(if connected { 1 } else { 0 });
    }

    /// Record a monitor tick outcome.
    pub fn monitor_tick(outcome: &str) {
        MONITOR_TICKS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn deployments_running(count: usize) {
        DEPLOYMENTS_RUNNING.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record a relayed request.
    pub fn relay_request(method: &str, status: u16) {
        RELAY_REQUESTS_TOTAL
            .with_label_values(&[method, &status.to_string()])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
