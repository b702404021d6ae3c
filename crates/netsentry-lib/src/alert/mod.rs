//! Alert emission for detected anomalies
//!
//! Handles:
//! - Formatting anomalies as Alertmanager alerts
//! - Delivering a batch to an [`AlertSink`] in one call

mod alertmanager;
mod dispatcher;

pub use alertmanager::{AlertmanagerClient, ALERTS_PATH};
pub use dispatcher::{alert_for, AlertDispatcher, ALERT_NAME, ALERT_SEVERITY, STARTS_AT_FORMAT};

use crate::error::DispatchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alertmanager alert format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time, UTC, second precision
    pub starts_at: String,
}

/// Receiver of alert batches
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver the whole batch in one outbound call
    async fn send(&self, alerts: &[AlertmanagerAlert]) -> DispatchResult<()>;
}
