//! Detection control loop
//!
//! Handles:
//! - Running collect, build, train, detect and dispatch once per interval
//! - Isolating stage failures so the loop never stops on its own
//! - Picking up configuration changes between iterations

mod config;
mod r#loop;


pub use config::{
    PipelineConfig, DEFAULT_INTERVAL_SECS, DEFAULT_RECOVERY_INTERVAL_SECS,
    DEFAULT_TRAINING_PERIOD_HOURS,
};
pub use r#loop::{DetectionLoop, DetectionLoopBuilder, IterationReport, StageOutcome};
