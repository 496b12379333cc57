//! Metrics collection and export for Parlor.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use parlor_transport::{CloseReason, FrameSink, FrameStream, TransportError};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parlor_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parlor_connections_active";
    pub const AUTH_FAILURES_TOTAL: &str = "parlor_auth_failures_total";
    pub const MESSAGES_TOTAL: &str = "parlor_messages_total";
    pub const MESSAGES_BYTES: &str = "parlor_messages_bytes";
    pub const ERRORS_TOTAL: &str = "parlor_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Connections rejected by session validation"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames on the wire");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames on the wire");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a rejected session.
pub fn record_auth_failure() {
    counter!(names::AUTH_FAILURES_TOTAL).increment(1);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

/// A [`FrameSink`] that counts outbound frames.
pub struct MeteredSink<S>(pub S);

#[async_trait]
impl<S: FrameSink> FrameSink for MeteredSink<S> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let len = text.len();
        self.0.send_text(text).await?;
        record_message(len, "outbound");
        Ok(())
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        self.0.close(reason).await
    }
}

/// A [`FrameStream`] that counts inbound frames.
pub struct MeteredStream<R>(pub R);

#[async_trait]
impl<R: FrameStream> FrameStream for MeteredStream<R> {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        let received = self.0.recv().await;
        match &received {
            Ok(Some(data)) => record_message(data.len(), "inbound"),
            Ok(None) => {}
            Err(_) => record_error("transport"),
        }
        received
    }
}
