//! Detection loop
//!
//! Runs one iteration at a time. Each stage returns its own result type and
//! the loop decides here, and only here, how to continue after a failure.

use super::PipelineConfig;
use crate::alert::AlertDispatcher;
use crate::collector::SampleCollector;
use crate::error::PipelineError;
use crate::features::build_snapshot;
use crate::health::{components, HealthRegistry};
use crate::history::HistoryBuffer;
use crate::model::{detect, IsolationForest, ModelTrainer, OutlierEstimator, TrainedModel};
use crate::observability::{PipelineMetrics, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// How a stage ended in one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageOutcome {
    /// Not reached or precondition not met
    #[default]
    Skipped,
    Completed,
    Failed,
}

/// Summary of one iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    pub collection: StageOutcome,
    pub training: StageOutcome,
    pub dispatch: StageOutcome,
    /// Devices in the current snapshot
    pub devices: usize,
    pub history_len: usize,
    pub anomalies: usize,
    pub alerts_sent: usize,
}

/// Owns every pipeline stage together with the history and the model
pub struct DetectionLoop {
    collector: SampleCollector,
    /// Overrides the isolation forest built from configuration
    estimator: Option<Arc<dyn OutlierEstimator>>,
    dispatcher: AlertDispatcher,
    history: HistoryBuffer,
    last_model: Option<TrainedModel>,
    config: watch::Receiver<PipelineConfig>,
    metrics: PipelineMetrics,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl DetectionLoop {
    pub fn new(
        collector: SampleCollector,
        dispatcher: AlertDispatcher,
        config: watch::Receiver<PipelineConfig>,
    ) -> Self {
        Self {
            collector,
            estimator: None,
            dispatcher,
            history: HistoryBuffer::new(),
            last_model: None,
            config,
            metrics: PipelineMetrics::new(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("netsentry"),
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Most recently trained model, kept across failed fits
    pub fn last_model(&self) -> Option<&TrainedModel> {
        self.last_model.as_ref()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Run until a shutdown signal arrives. Only stops between iterations.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.config.borrow().clone();
        self.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            config.interval.as_secs(),
            config.history_capacity(),
        );
        self.health.set_ready(true).await;

        loop {
            let result = self.run_iteration().await;
            let delay = self.next_delay(&result);

            if let Err(e) = &result {
                self.metrics.inc_iteration_failures();
                error!(
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Detection iteration failed"
                );
            }
            self.health.mark_iteration().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down detection loop");
                    break;
                }
            }
        }

        self.health.set_ready(false).await;
    }

    /// Sleep before the next iteration
    pub fn next_delay(&self, result: &Result<IterationReport, PipelineError>) -> Duration {
        let config = self.config.borrow();
        match result {
            Ok(_) => config.interval,
            Err(_) => config.recovery_delay(),
        }
    }

    /// Run one iteration. Stage failures are logged and reported; only
    /// failures no stage handles come back as `Err`.
    pub async fn run_iteration(&mut self) -> Result<IterationReport, PipelineError> {
        let config = self.config.borrow_and_update().clone();
        self.metrics.inc_iterations();
        config.validate()?;

        let capacity = config.history_capacity();
        let mut report = IterationReport::default();
        info!(
            history = self.history.len(),
            capacity, "Starting detection iteration"
        );

        let raw = match self.collector.collect().await {
            Ok(raw) => {
                self.health.set_healthy(components::COLLECTOR).await;
                report.collection = StageOutcome::Completed;
                raw
            }
            Err(e) => {
                error!(error = %e, "Failed to collect network metrics");
                self.metrics.inc_collection_errors();
                self.health.record(components::COLLECTOR, Err(&e)).await;
                report.collection = StageOutcome::Failed;
                self.history.set_capacity(capacity);
                report.history_len = self.history.len();
                return Ok(report);
            }
        };

        let snapshot = Arc::new(build_snapshot(&raw));
        report.devices = snapshot.len();
        self.metrics.set_devices_observed(snapshot.len());

        if snapshot.is_empty() {
            warn!("No network metrics returned, skipping iteration");
            self.history.set_capacity(capacity);
            report.history_len = self.history.len();
            self.metrics.set_history_snapshots(self.history.len());
            return Ok(report);
        }

        self.history.push(Arc::clone(&snapshot), capacity);
        report.history_len = self.history.len();
        self.metrics.set_history_snapshots(self.history.len());

        let trainer = self.trainer(&config);
        if let Err(e) = trainer.check_history(self.history.len()) {
            debug!(reason = %e, "Not enough history to train");
            return Ok(report);
        }

        let history = self.history.clone();
        let start = Instant::now();
        let fit = tokio::task::spawn_blocking(move || trainer.train(&history)).await;

        let trained = match fit {
            Ok(Ok(trained)) => trained,
            Ok(Err(e)) if e.is_degenerate() => {
                warn!(reason = %e, "Training data has no spread, skipping detection");
                self.health.set_healthy(components::TRAINER).await;
                return Ok(report);
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to train anomaly detection model");
                self.metrics.inc_training_errors();
                self.health.record(components::TRAINER, Err(&e)).await;
                report.training = StageOutcome::Failed;
                return Ok(report);
            }
            Err(e) => {
                self.metrics.inc_training_errors();
                self.health
                    .set_unhealthy(components::TRAINER, e.to_string())
                    .await;
                return Err(PipelineError::TrainingAborted(e.to_string()));
            }
        };
        self.metrics
            .observe_training_latency(start.elapsed().as_secs_f64());
        self.health.set_healthy(components::TRAINER).await;
        report.training = StageOutcome::Completed;
        let trained: &TrainedModel = self.last_model.insert(trained);

        let anomalies = detect(Some(trained), &snapshot);
        report.anomalies = anomalies.len();
        if anomalies.is_empty() {
            return Ok(report);
        }

        warn!(count = anomalies.len(), "Detected network anomalies");
        for anomaly in &anomalies {
            self.logger.log_anomaly(anomaly);
        }
        self.metrics.add_anomalies_detected(anomalies.len());

        match self.dispatcher.dispatch(&anomalies).await {
            Ok(sent) => {
                self.metrics.add_alerts_sent(sent);
                self.health.set_healthy(components::DISPATCHER).await;
                report.dispatch = StageOutcome::Completed;
                report.alerts_sent = sent;
            }
            Err(e) => {
                error!(error = %e, "Failed to send alerts to Alertmanager");
                self.metrics.inc_dispatch_errors();
                self.health.record(components::DISPATCHER, Err(&e)).await;
                report.dispatch = StageOutcome::Failed;
            }
        }

        Ok(report)
    }

    fn trainer(&self, config: &PipelineConfig) -> ModelTrainer {
        let estimator = match &self.estimator {
            Some(estimator) => Arc::clone(estimator),
            None => Arc::new(IsolationForest::new(config.forest.clone())),
        };
        ModelTrainer::new(estimator)
    }
}

/// Builder for the detection loop
pub struct DetectionLoopBuilder {
    collector: Option<SampleCollector>,
    dispatcher: Option<AlertDispatcher>,
    estimator: Option<Arc<dyn OutlierEstimator>>,
    config: Option<watch::Receiver<PipelineConfig>>,
    metrics: Option<PipelineMetrics>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            collector: None,
            dispatcher: None,
            estimator: None,
            config: None,
            metrics: None,
            health: None,
            logger: None,
        }
    }

    pub fn collector(mut self, collector: SampleCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Use a custom outlier estimator instead of the configured forest
    pub fn estimator(mut self, estimator: Arc<dyn OutlierEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Follow configuration published on a watch channel
    pub fn config_updates(mut self, config: watch::Receiver<PipelineConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Fixed configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        let (_tx, rx) = watch::channel(config);
        self.config = Some(rx);
        self
    }

    pub fn metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<DetectionLoop> {
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Collector is required"))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| anyhow::anyhow!("Dispatcher is required"))?;
        let config = self
            .config
            .unwrap_or_else(|| watch::channel(PipelineConfig::default()).1);

        let mut detection = DetectionLoop::new(collector, dispatcher, config);
        detection.estimator = self.estimator;
        if let Some(metrics) = self.metrics {
            detection.metrics = metrics;
        }
        if let Some(health) = self.health {
            detection.health = health;
        }
        if let Some(logger) = self.logger {
            detection.logger = logger;
        }
        Ok(detection)
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
