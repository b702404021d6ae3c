//! Observability infrastructure for the detection pipeline
//!
//! Provides:
//! - Prometheus metrics (iterations, stage errors, anomalies, history size, training latency)
//! - Structured JSON logging with tracing

use crate::models::Anomaly;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for model fit latency (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    iterations: IntCounter,
    iteration_failures: IntCounter,
    collection_errors: IntCounter,
    training_errors: IntCounter,
    dispatch_errors: IntCounter,
    anomalies_detected: IntCounter,
    alerts_sent: IntCounter,
    history_snapshots: IntGauge,
    devices_observed: IntGauge,
    training_latency_seconds: Histogram,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            iterations: register_int_counter!(
                "netsentry_iterations_total",
                "Detection loop iterations started"
            )
            .expect("Failed to register iterations_total"),

            iteration_failures: register_int_counter!(
                "netsentry_iteration_failures_total",
                "Iterations that ended in the recovery interval"
            )
            .expect("Failed to register iteration_failures_total"),

            collection_errors: register_int_counter!(
                "netsentry_collection_errors_total",
                "Failed metrics collection passes"
            )
            .expect("Failed to register collection_errors_total"),

            training_errors: register_int_counter!(
                "netsentry_training_errors_total",
                "Failed model fits"
            )
            .expect("Failed to register training_errors_total"),

            dispatch_errors: register_int_counter!(
                "netsentry_dispatch_errors_total",
                "Failed alert deliveries"
            )
            .expect("Failed to register dispatch_errors_total"),

            anomalies_detected: register_int_counter!(
                "netsentry_anomalies_detected_total",
                "Devices flagged as anomalous"
            )
            .expect("Failed to register anomalies_detected_total"),

            alerts_sent: register_int_counter!(
                "netsentry_alerts_sent_total",
                "Alerts accepted by the alert sink"
            )
            .expect("Failed to register alerts_sent_total"),

            history_snapshots: register_int_gauge!(
                "netsentry_history_snapshots",
                "Snapshots currently held in the training window"
            )
            .expect("Failed to register history_snapshots"),

            devices_observed: register_int_gauge!(
                "netsentry_devices_observed",
                "Devices in the most recent snapshot"
            )
            .expect("Failed to register devices_observed"),

            training_latency_seconds: register_histogram!(
                "netsentry_training_latency_seconds",
                "Time spent fitting the outlier model",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn inc_iterations(&self) {
        self.inner().iterations.inc();
    }

    pub fn inc_iteration_failures(&self) {
        self.inner().iteration_failures.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_training_errors(&self) {
        self.inner().training_errors.inc();
    }

    pub fn inc_dispatch_errors(&self) {
        self.inner().dispatch_errors.inc();
    }

    pub fn add_anomalies_detected(&self, count: usize) {
        self.inner().anomalies_detected.inc_by(count as u64);
    }

    pub fn add_alerts_sent(&self, count: usize) {
        self.inner().alerts_sent.inc_by(count as u64);
    }

    pub fn set_history_snapshots(&self, count: usize) {
        self.inner().history_snapshots.set(count as i64);
    }

    pub fn set_devices_observed(&self, count: usize) {
        self.inner().devices_observed.set(count as i64);
    }

    pub fn observe_training_latency(&self, duration_secs: f64) {
        self.inner().training_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for pipeline events
///
/// Emits event-tagged records for anomalies, startup and shutdown.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log a detected anomaly
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        warn!(
            event = "anomaly_detected",
            node = %self.node_name,
            device = %anomaly.device,
            traffic = anomaly.traffic,
            errors = anomaly.errors,
            score = anomaly.score,
            "Anomaly on {}: Traffic={:.2}, Errors={:.2}, Score={:.4}",
            anomaly.device,
            anomaly.traffic,
            anomaly.errors,
            anomaly.score
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, interval_secs: u64, history_capacity: usize) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            interval_secs,
            history_capacity,
            "Starting network anomaly detection service"
        );
    }

    /// Log a configuration reload
    pub fn log_config_reload(&self, success: bool, detail: &str) {
        if success {
            info!(
                event = "config_reloaded",
                node = %self.node_name,
                detail = %detail,
                "Configuration reloaded"
            );
        } else {
            warn!(
                event = "config_reload_failed",
                node = %self.node_name,
                detail = %detail,
                "Configuration reload failed, keeping previous configuration"
            );
        }
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Network anomaly detection service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceKey;
    use chrono::Utc;

    #[test]
    fn test_pipeline_metrics_creation() {
        // Metrics live in the global registry; repeated handles share them.
        let metrics = PipelineMetrics::new();
        let again = PipelineMetrics::new();

        metrics.inc_iterations();
        metrics.add_anomalies_detected(3);
        metrics.set_history_snapshots(12);
        metrics.observe_training_latency(0.02);
        again.inc_dispatch_errors();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "netsentry_history_snapshots"));
    }

    #[test]
    fn test_structured_logger() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
        logger.log_anomaly(&Anomaly {
            device: DeviceKey::new("host", "eth0"),
            traffic: 1.0,
            errors: 0.0,
            score: -0.1,
            timestamp: Utc::now(),
        });
    }
}
