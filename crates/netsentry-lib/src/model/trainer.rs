//! Batch model training over the history window

use super::{OutlierEstimator, OutlierModel};
use crate::error::{TrainingError, TrainingResult};
use crate::history::HistoryBuffer;
use crate::models::FeaturePoint;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Minimum buffered snapshots before a fit is attempted
pub const MIN_TRAINING_SNAPSHOTS: usize = 5;

/// A model together with what it was trained on
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: Arc<dyn OutlierModel>,
    pub estimator: String,
    pub trained_at: DateTime<Utc>,
    pub snapshots: usize,
    pub training_rows: usize,
}

/// Refits a model from scratch on every call
#[derive(Clone)]
pub struct ModelTrainer {
    estimator: Arc<dyn OutlierEstimator>,
    min_snapshots: usize,
}

impl ModelTrainer {
    pub fn new(estimator: Arc<dyn OutlierEstimator>) -> Self {
        Self {
            estimator,
            min_snapshots: MIN_TRAINING_SNAPSHOTS,
        }
    }

    pub fn min_snapshots(&self) -> usize {
        self.min_snapshots
    }

    /// Fails with `InsufficientData` below the minimum history
    pub fn check_history(&self, snapshots: usize) -> TrainingResult<()> {
        if snapshots < self.min_snapshots {
            return Err(TrainingError::InsufficientData {
                available: snapshots,
                required: self.min_snapshots,
            });
        }
        Ok(())
    }

    /// Train on every snapshot in `history`
    pub fn train(&self, history: &HistoryBuffer) -> TrainingResult<TrainedModel> {
        self.check_history(history.len())?;
        self.fit(history.training_rows(), history.len())
    }

    /// Fit on rows already pooled from `snapshots` snapshots
    fn fit(&self, rows: Vec<FeaturePoint>, snapshots: usize) -> TrainingResult<TrainedModel> {
        let start = Instant::now();
        let model = self.estimator.fit(&rows)?;

        debug!(
            elapsed_ms = start.elapsed().as_millis(),
            "Model fit complete"
        );
        info!(
            estimator = self.estimator.name(),
            snapshots,
            rows = rows.len(),
            "Anomaly detection model trained"
        );

        Ok(TrainedModel {
            model: Arc::from(model),
            estimator: self.estimator.name().to_string(),
            trained_at: Utc::now(),
            snapshots,
            training_rows: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IsolationForest;
    use crate::models::{DeviceKey, FeatureRecord, FeatureSnapshot};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Estimator that counts fits and never flags anything
    #[derive(Default)]
    struct CountingEstimator {
        fits: AtomicUsize,
    }

    #[derive(Debug)]
    struct NeverOutlier;

    impl OutlierModel for NeverOutlier {
        fn decision(&self, _point: &FeaturePoint) -> f64 {
            1.0
        }
    }

    impl OutlierEstimator for CountingEstimator {
        fn fit(&self, _rows: &[FeaturePoint]) -> TrainingResult<Box<dyn OutlierModel>> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NeverOutlier))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn history_of(values: &[(f64, f64)]) -> HistoryBuffer {
        let mut history = HistoryBuffer::new();
        for &(traffic, errors) in values {
            let mut rows = BTreeMap::new();
            rows.insert(
                DeviceKey::new("host", "eth0"),
                FeatureRecord::new(traffic, 0.0, errors, 0.0),
            );
            history.push(Arc::new(FeatureSnapshot::new(Utc::now(), rows)), 100);
        }
        history
    }

    #[test]
    fn test_insufficient_history_never_fits() {
        let estimator = Arc::new(CountingEstimator::default());
        let trainer = ModelTrainer::new(estimator.clone());

        for n in 0..MIN_TRAINING_SNAPSHOTS {
            let history = history_of(&vec![(1.0, 0.0); n]);
            let err = trainer.train(&history).unwrap_err();
            assert!(err.is_insufficient_data());
        }
        assert_eq!(estimator.fits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trains_at_threshold() {
        let estimator = Arc::new(CountingEstimator::default());
        let trainer = ModelTrainer::new(estimator.clone());

        let history = history_of(&[(1.0, 0.0); 5]);
        let trained = trainer.train(&history).unwrap();

        assert_eq!(trained.snapshots, 5);
        assert_eq!(trained.training_rows, 5);
        assert_eq!(trained.estimator, "counting");
        assert_eq!(estimator.fits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fit_failure_surfaces() {
        let trainer = ModelTrainer::new(Arc::new(IsolationForest::default()));
        let history = history_of(&[(0.0, 0.0); 6]);
        assert_eq!(
            trainer.train(&history).unwrap_err(),
            TrainingError::DegenerateFeatures { rows: 6 }
        );
    }
}
