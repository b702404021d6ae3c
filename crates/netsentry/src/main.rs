//! netsentry - network interface traffic anomaly detection
//!
//! Polls Prometheus for per-interface traffic and error rates, retrains an
//! outlier model over a sliding window of history and sends anomalous
//! interfaces to Alertmanager.

use anyhow::{Context, Result};
use clap::Parser;
use netsentry_lib::{
    alert::{AlertDispatcher, AlertmanagerClient},
    collector::{NetworkQueries, PrometheusClient, SampleCollector},
    DetectionLoopBuilder, HealthRegistry, PipelineConfig, PipelineMetrics, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::{AgentConfig, Args};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    let config = AgentConfig::load(&args)?;
    info!(
        node_name = %config.node_name,
        prometheus_url = %config.prometheus_url,
        alertmanager_url = %config.alertmanager_url,
        "Agent configured"
    );

    let prometheus = PrometheusClient::new(&config.prometheus_url, config.request_timeout())
        .context("Failed to create Prometheus client")?;
    let alertmanager =
        AlertmanagerClient::new(&config.alertmanager_url, config.request_timeout())
            .context("Failed to create Alertmanager client")?;

    let health_registry = HealthRegistry::for_pipeline().await;
    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let (config_tx, config_rx) = watch::channel(config.pipeline_config());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let detection = DetectionLoopBuilder::new()
        .collector(
            SampleCollector::new(Arc::new(prometheus))
                .with_queries(NetworkQueries::with_window(&config.rate_window)),
        )
        .dispatcher(AlertDispatcher::new(Arc::new(alertmanager)))
        .config_updates(config_rx)
        .metrics(metrics)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let loop_handle = tokio::spawn(detection.run(shutdown_tx.subscribe()));

    let reason = wait_for_shutdown(&args, &config_tx, &logger).await?;
    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Detection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Reload configuration into the running loop. URLs, rate window and API
/// port are only read at startup.
#[cfg(unix)]
fn reload(args: &Args, config_tx: &watch::Sender<PipelineConfig>, logger: &StructuredLogger) {
    match AgentConfig::load(args) {
        Ok(config) => {
            let pipeline = config.pipeline_config();
            let detail = format!(
                "interval={}s history_capacity={}",
                pipeline.interval.as_secs(),
                pipeline.history_capacity()
            );
            config_tx.send_replace(pipeline);
            logger.log_config_reload(true, &detail);
        }
        Err(e) => logger.log_config_reload(false, &format!("{:#}", e)),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(
    args: &Args,
    config_tx: &watch::Sender<PipelineConfig>,
    logger: &StructuredLogger,
) -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                return Ok("SIGINT received");
            }
            _ = sigterm.recv() => return Ok("SIGTERM received"),
            _ = sighup.recv() => reload(args, config_tx, logger),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(
    _args: &Args,
    _config_tx: &watch::Sender<PipelineConfig>,
    _logger: &StructuredLogger,
) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    Ok("SIGINT received")
}
