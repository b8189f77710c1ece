//! Metrics collection and export for palaver.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const POSTS_TOTAL: &str = "palaver_posts_total";
    pub const EVENTS_DELIVERED_TOTAL: &str = "palaver_events_delivered_total";
    pub const ATTRIBUTE_CHANGES_TOTAL: &str = "palaver_attribute_changes_total";
    pub const SESSIONS_ACTIVE: &str = "palaver_sessions_active";
    pub const STATUS_LINES_TOTAL: &str = "palaver_status_lines_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::POSTS_TOTAL, "Total number of chat posts");
    metrics::describe_counter!(
        names::EVENTS_DELIVERED_TOTAL,
        "Total number of chat events handed to the delivery engine"
    );
    metrics::describe_counter!(
        names::ATTRIBUTE_CHANGES_TOTAL,
        "Total number of attribute change notifications"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of active sessions");
    metrics::describe_counter!(
        names::STATUS_LINES_TOTAL,
        "Total number of session status lines emitted"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a chat post.
pub fn record_post() {
    counter!(names::POSTS_TOTAL).increment(1);
}

/// Record a delivered chat event.
pub fn record_event_delivered() {
    counter!(names::EVENTS_DELIVERED_TOTAL).increment(1);
}

/// Record an attribute change notification.
pub fn record_attribute_change() {
    counter!(names::ATTRIBUTE_CHANGES_TOTAL).increment(1);
}

/// Update the active session count.
pub fn set_active_sessions(count: usize) {
    gauge!(names::SESSIONS_ACTIVE).set(count as f64);
}

/// Record an emitted session status line.
pub fn record_status_line() {
    counter!(names::STATUS_LINES_TOTAL).increment(1);
}
