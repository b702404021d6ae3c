//! Scores the current snapshot against the trained model

use super::TrainedModel;
use crate::models::{Anomaly, FeatureSnapshot};
use chrono::{DateTime, Utc};

/// Anomalies in `snapshot`, in snapshot row order
pub fn detect(model: Option<&TrainedModel>, snapshot: &FeatureSnapshot) -> Vec<Anomaly> {
    detect_at(model, snapshot, Utc::now())
}

/// Same as [`detect`] with an explicit detection time
pub fn detect_at(
    model: Option<&TrainedModel>,
    snapshot: &FeatureSnapshot,
    detected_at: DateTime<Utc>,
) -> Vec<Anomaly> {
    let Some(trained) = model else {
        return Vec::new();
    };

    snapshot
        .iter()
        .filter_map(|(device, record)| {
            let point = record.point();
            if !trained.model.is_outlier(&point) {
                return None;
            }
            Some(Anomaly {
                device: device.clone(),
                traffic: record.total_traffic,
                errors: record.total_errors,
                score: trained.model.decision(&point),
                timestamp: detected_at,
            })
        })
        .collect()
}
