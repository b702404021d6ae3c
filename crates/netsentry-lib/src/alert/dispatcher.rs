//! Anomaly to alert conversion and batch delivery

use super::{AlertSink, AlertmanagerAlert};
use crate::error::DispatchResult;
use crate::models::Anomaly;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const ALERT_NAME: &str = "NetworkTrafficAnomaly";
pub const ALERT_SEVERITY: &str = "warning";
pub const STARTS_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Build the Alertmanager alert for one anomaly
pub fn alert_for(anomaly: &Anomaly) -> AlertmanagerAlert {
    let mut labels = HashMap::new();
    labels.insert("alertname".to_string(), ALERT_NAME.to_string());
    labels.insert("severity".to_string(), ALERT_SEVERITY.to_string());
    labels.insert("device".to_string(), anomaly.device.to_string());

    let mut annotations = HashMap::new();
    annotations.insert(
        "summary".to_string(),
        format!("Anomalous network traffic detected on {}", anomaly.device),
    );
    annotations.insert(
        "description".to_string(),
        format!(
            "Traffic: {:.2} bytes/sec, Errors: {:.2}/sec, Anomaly score: {:.4}",
            anomaly.traffic, anomaly.errors, anomaly.score
        ),
    );

    AlertmanagerAlert {
        labels,
        annotations,
        starts_at: anomaly.timestamp.format(STARTS_AT_FORMAT).to_string(),
    }
}

/// Sends anomaly batches to the configured sink
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Deliver all anomalies as one batch. Returns the number of alerts
    /// sent; an empty input makes no outbound call.
    pub async fn dispatch(&self, anomalies: &[Anomaly]) -> DispatchResult<usize> {
        if anomalies.is_empty() {
            return Ok(0);
        }

        let alerts: Vec<AlertmanagerAlert> = anomalies.iter().map(alert_for).collect();
        self.sink.send(&alerts).await?;

        info!(count = alerts.len(), "Sent alerts to Alertmanager");
        Ok(alerts.len())
    }
}
