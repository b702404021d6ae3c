//! Core data models for the detection pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Label value used when a sample lacks `instance` or `device`
pub const UNKNOWN_LABEL: &str = "unknown";

/// One observation returned by the metrics store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub metric_name: String,
    pub labels: HashMap<String, String>,
    /// `(unix timestamp, value)`; `None` when the store returned no value
    pub value: Option<(f64, f64)>,
}

impl RawSample {
    pub fn new(
        metric_name: impl Into<String>,
        labels: HashMap<String, String>,
        value: Option<(f64, f64)>,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            labels,
            value,
        }
    }

    /// Look up a label, falling back to [`UNKNOWN_LABEL`]
    pub fn label_or_unknown(&self, name: &str) -> &str {
        self.labels
            .get(name)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// The value as a feature field: `None` when the store returned no
    /// value, `0.0` when it returned NaN or an infinity
    pub fn feature_value(&self) -> Option<f64> {
        self.value
            .map(|(_, v)| if v.is_finite() { v } else { 0.0 })
    }

    /// Identity of the interface this sample belongs to
    pub fn device_key(&self) -> DeviceKey {
        DeviceKey::new(self.label_or_unknown("instance"), self.label_or_unknown("device"))
    }
}

/// The four raw collections gathered in one collection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetrics {
    pub receive: Vec<RawSample>,
    pub transmit: Vec<RawSample>,
    pub rx_errors: Vec<RawSample>,
    pub tx_errors: Vec<RawSample>,
}

impl RawMetrics {
    pub fn sample_count(&self) -> usize {
        self.receive.len() + self.transmit.len() + self.rx_errors.len() + self.tx_errors.len()
    }
}

/// Composite identity of a network interface: `{instance}_{device}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(instance: &str, device: &str) -> Self {
        Self(format!("{}_{}", instance, device))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-device feature row
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub receive_bytes: f64,
    pub transmit_bytes: f64,
    pub rx_errors: f64,
    pub tx_errors: f64,
    pub total_traffic: f64,
    pub total_errors: f64,
}

impl FeatureRecord {
    pub fn new(receive_bytes: f64, transmit_bytes: f64, rx_errors: f64, tx_errors: f64) -> Self {
        Self {
            receive_bytes,
            transmit_bytes,
            rx_errors,
            tx_errors,
            total_traffic: receive_bytes + transmit_bytes,
            total_errors: rx_errors + tx_errors,
        }
    }

    /// Projection into the model's feature space
    pub fn point(&self) -> FeaturePoint {
        [self.total_traffic, self.total_errors]
    }
}

/// Number of dimensions the outlier model works in
pub const FEATURE_DIMS: usize = 2;

/// `(total_traffic, total_errors)`
pub type FeaturePoint = [f64; FEATURE_DIMS];

/// Point-in-time table of per-device features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub collected_at: DateTime<Utc>,
    rows: BTreeMap<DeviceKey, FeatureRecord>,
}

impl FeatureSnapshot {
    pub fn new(collected_at: DateTime<Utc>, rows: BTreeMap<DeviceKey, FeatureRecord>) -> Self {
        Self { collected_at, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&FeatureRecord> {
        self.rows.get(key)
    }

    /// Rows in DeviceKey order
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &FeatureRecord)> {
        self.rows.iter()
    }

    pub fn points(&self) -> impl Iterator<Item = FeaturePoint> + '_ {
        self.rows.values().map(FeatureRecord::point)
    }
}

/// A device flagged by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub device: DeviceKey,
    pub traffic: f64,
    pub errors: f64,
    /// Model decision value; negative means anomalous
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}
