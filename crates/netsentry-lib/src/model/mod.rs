//! Outlier model training and scoring
//!
//! The pipeline only depends on the [`OutlierEstimator`] / [`OutlierModel`]
//! pair; [`IsolationForest`] is the default implementation.

mod detector;
mod isolation_forest;
mod trainer;

pub use detector::{detect, detect_at};
pub use isolation_forest::{
    IsolationForest, IsolationForestModel, IsolationForestParams, DEFAULT_CONTAMINATION,
    DEFAULT_MAX_SAMPLES, DEFAULT_N_TREES, DEFAULT_SEED,
};
pub use trainer::{ModelTrainer, TrainedModel, MIN_TRAINING_SNAPSHOTS};

use crate::error::TrainingResult;
use crate::models::FeaturePoint;
use std::fmt::Debug;

/// A fitted outlier scorer over `(total_traffic, total_errors)`
pub trait OutlierModel: Send + Sync + Debug {
    /// Continuous decision value; negative values are outliers
    fn decision(&self, point: &FeaturePoint) -> f64;

    /// Binary label: `true` for the rare (outlier) class
    fn is_outlier(&self, point: &FeaturePoint) -> bool {
        self.decision(point) < 0.0
    }
}

/// Fits a fresh [`OutlierModel`] from a pooled training set
pub trait OutlierEstimator: Send + Sync {
    fn fit(&self, rows: &[FeaturePoint]) -> TrainingResult<Box<dyn OutlierModel>>;

    /// Name used in logs
    fn name(&self) -> &str;
}
