//! Network anomaly detection library
//!
//! This crate provides the core functionality for:
//! - Collecting per-interface traffic and error rates from Prometheus
//! - Building per-device feature snapshots and a bounded training history
//! - Fitting an outlier model and scoring the current snapshot
//! - Sending anomalies to Alertmanager
//! - Health checks and observability

pub mod alert;
pub mod collector;
pub mod error;
pub mod features;
pub mod health;
pub mod history;
pub mod model;
pub mod models;
pub mod observability;
pub mod pipeline;

pub use error::{CollectionError, ConfigError, DispatchError, PipelineError, TrainingError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{DetectionLoop, DetectionLoopBuilder, PipelineConfig};
