//! Prometheus metrics for the purchase pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use flashgate_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a
    /// warning and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "flashsale_requests_rejected_total",
        "Requests turned away by the access guard, by endpoint and reason"
    );
    describe_counter!(
        "flashsale_admissions_total",
        "Stock gate decisions, by outcome"
    );
    describe_counter!(
        "flashsale_lock_acquire_total",
        "Per-item lock acquisitions, by outcome"
    );
    describe_counter!(
        "flashsale_commits_total",
        "Authoritative commit attempts, by outcome"
    );
    describe_histogram!(
        "flashsale_commit_duration_seconds",
        "Time spent in the authoritative commit transaction"
    );
    describe_counter!(
        "flashsale_compensations_total",
        "Advisory counter units returned after a failed commit"
    );
    describe_counter!(
        "flashsale_dispatch_total",
        "Dispatch worker results, by outcome"
    );
    describe_counter!(
        "flashsale_dead_letters_total",
        "Purchase messages routed to the dead-letter path"
    );
}

/// Access guard metrics recorder.
pub struct AccessMetrics;

impl AccessMetrics {
    /// Record a rejected request.
    pub fn record_rejection(endpoint: &'static str, reason: &'static str) {
        counter!("flashsale_requests_rejected_total", "endpoint" => endpoint, "reason" => reason)
            .increment(1);
    }
}

/// Stock gate metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record an admission decision.
    pub fn record(outcome: &'static str) {
        counter!("flashsale_admissions_total", "outcome" => outcome).increment(1);
    }
}

/// Lock manager metrics recorder.
pub struct LockMetrics;

impl LockMetrics {
    /// Record an acquisition attempt result.
    pub fn record(outcome: &'static str) {
        counter!("flashsale_lock_acquire_total", "outcome" => outcome).increment(1);
    }
}

/// Order committer metrics recorder.
pub struct CommitMetrics;

impl CommitMetrics {
    /// Record a commit attempt.
    pub fn record(outcome: &'static str, duration: Duration) {
        counter!("flashsale_commits_total", "outcome" => outcome).increment(1);
        histogram!("flashsale_commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a counter compensation.
    pub fn record_compensation() {
        counter!("flashsale_compensations_total").increment(1);
    }
}

/// Dispatch worker metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a processed delivery.
    pub fn record(outcome: &'static str) {
        counter!("flashsale_dispatch_total", "outcome" => outcome).increment(1);
    }

    /// Record a dead-lettered message.
    pub fn record_dead_letter() {
        counter!("flashsale_dead_letters_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn server_starts_without_handle() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn start_tolerates_existing_recorder() {
        let mut first = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let mut second = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(first.start().is_ok());
        assert!(second.start().is_ok());
    }
}
