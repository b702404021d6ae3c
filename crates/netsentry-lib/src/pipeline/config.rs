//! Live configuration of the detection loop

use crate::error::ConfigError;
use crate::history::history_capacity;
use crate::model::IsolationForestParams;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TRAINING_PERIOD_HOURS: u64 = 24;
pub const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 60;

/// Values the loop re-reads at the start of every iteration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sleep between successful iterations
    pub interval: Duration,
    /// Span of history used for training
    pub training_period: Duration,
    /// Sleep after an iteration that failed outside any stage
    pub recovery_interval: Duration,
    /// Parameters of the default outlier model
    pub forest: IsolationForestParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            training_period: Duration::from_secs(DEFAULT_TRAINING_PERIOD_HOURS * 3600),
            recovery_interval: Duration::from_secs(DEFAULT_RECOVERY_INTERVAL_SECS),
            forest: IsolationForestParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.as_secs() == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.training_period.as_secs() == 0 {
            return Err(ConfigError::ZeroTrainingPeriod);
        }
        let contamination = self.forest.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(ConfigError::InvalidContamination(contamination));
        }
        if self.forest.n_trees == 0 {
            return Err(ConfigError::NoTrees);
        }
        Ok(())
    }

    /// Maximum number of buffered snapshots
    pub fn history_capacity(&self) -> usize {
        history_capacity(self.training_period, self.interval)
    }

    /// Recovery sleep, never shorter than one second
    pub fn recovery_delay(&self) -> Duration {
        if self.recovery_interval.is_zero() {
            Duration::from_secs(DEFAULT_RECOVERY_INTERVAL_SECS)
        } else {
            self.recovery_interval
        }
    }
}
