//! Error types for each pipeline stage
//!
//! Every stage returns its own error type so the control loop can decide,
//! in one place, how an iteration recovers.

use thiserror::Error;

/// Metrics query failed; the iteration continues without data
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("metrics query `{query}` failed: {source}")]
    Transport {
        query: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metrics query `{query}` returned HTTP {status}")]
    Status { query: String, status: u16 },

    #[error("metrics query `{query}` was rejected: {message}")]
    Rejected { query: String, message: String },

    #[error("could not decode response for `{query}`: {message}")]
    Decode { query: String, message: String },
}

/// Model fit failed or was not attempted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// Guarded precondition rather than a failure
    #[error("insufficient history: {available} snapshots, need {required}")]
    InsufficientData { available: usize, required: usize },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set contains non-finite values")]
    NonFiniteFeatures,

    #[error("all {rows} training rows are identical")]
    DegenerateFeatures { rows: usize },

    #[error("contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),
}

impl TrainingError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, TrainingError::InsufficientData { .. })
    }

    /// Every training row is identical
    pub fn is_degenerate(&self) -> bool {
        matches!(self, TrainingError::DegenerateFeatures { .. })
    }
}

/// Alert delivery failed; never retried
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("alert sink request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("alert sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("training period must be greater than zero")]
    ZeroTrainingPeriod,

    #[error("contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("model must have at least one tree")]
    NoTrees,
}

/// Failure not handled by any stage; triggers the recovery interval
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("training task aborted: {0}")]
    TrainingAborted(String),
}

pub type CollectionResult<T> = Result<T, CollectionError>;
pub type TrainingResult<T> = Result<T, TrainingError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
