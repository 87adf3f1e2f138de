//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_http_requests_total` (counter): requests by method, status
//! - `gateway_invocations_total` (counter): handler invocations by function, outcome
//! - `gateway_invocation_duration_seconds` (histogram): handler latency by function
//! - `gateway_websocket_connections` (gauge): tracked connections
//! - `gateway_websocket_messages_total` (counter): inbound frames by route key
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - The Prometheus exporter is opt-in and serves its own scrape listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with a scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            register_descriptions();
            tracing::info!(address = %addr, "Prometheus exporter listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

fn register_descriptions() {
    describe_counter!(
        "gateway_http_requests_total",
        Unit::Count,
        "HTTP requests handled by the gateway"
    );
    describe_counter!(
        "gateway_invocations_total",
        Unit::Count,
        "Handler invocations"
    );
    describe_histogram!(
        "gateway_invocation_duration_seconds",
        Unit::Seconds,
        "Handler invocation latency"
    );
    describe_gauge!(
        "gateway_websocket_connections",
        Unit::Count,
        "Tracked WebSocket connections"
    );
    describe_counter!(
        "gateway_websocket_messages_total",
        Unit::Count,
        "Inbound WebSocket messages"
    );
}

pub fn record_http_request(method: &str, status: u16) {
    counter!(
        "gateway_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_invocation(function: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "gateway_invocations_total",
        "function" => function.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "gateway_invocation_duration_seconds",
        "function" => function.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn set_websocket_connections(count: usize) {
    gauge!("gateway_websocket_connections").set(count as f64);
}

pub fn record_websocket_message(route_key: &str) {
    counter!(
        "gateway_websocket_messages_total",
        "route_key" => route_key.to_string()
    )
    .increment(1);
}
