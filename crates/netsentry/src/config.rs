//! Agent configuration
//!
//! Sources, lowest precedence first: field defaults, an optional TOML file,
//! `NETSENTRY_*` environment variables, command line flags.

use anyhow::{Context, Result};
use clap::Parser;
use netsentry_lib::model::{IsolationForestParams, DEFAULT_MAX_SAMPLES};
use netsentry_lib::PipelineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "NETSENTRY";

/// Network Traffic Anomaly Detection
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "netsentry", version, about)]
pub struct Args {
    /// Prometheus URL
    #[arg(long, alias = "prometheus_url")]
    pub prometheus_url: Option<String>,

    /// Alertmanager URL
    #[arg(long, alias = "alertmanager_url")]
    pub alertmanager_url: Option<String>,

    /// Sampling interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Training period in hours
    #[arg(long, alias = "training_period")]
    pub training_period: Option<u64>,

    /// Port for the health and metrics server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "NETSENTRY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_alertmanager_url")]
    pub alertmanager_url: String,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_training_period")]
    pub training_period_hours: u64,

    /// Sleep after a failed iteration
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,

    /// Timeout for each Prometheus and Alertmanager request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Range window of the rate queries
    #[serde(default = "default_rate_window")]
    pub rate_window: String,

    /// Expected share of outliers in the training set
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "netsentry".to_string())
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_alertmanager_url() -> String {
    "http://localhost:9093".to_string()
}

fn default_interval() -> u64 {
    300
}

fn default_training_period() -> u64 {
    24
}

fn default_recovery_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_window() -> String {
    "5m".to_string()
}

fn default_contamination() -> f64 {
    0.05
}

fn default_n_trees() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load from the configured file and the process environment, then
    /// apply command line overrides
    pub fn load(args: &Args) -> Result<Self> {
        let env = config::Environment::with_prefix(ENV_PREFIX).try_parsing(true);
        let mut config = Self::load_with(args.config.as_deref(), env)?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn load_with(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.prometheus_url {
            self.prometheus_url = url.clone();
        }
        if let Some(url) = &args.alertmanager_url {
            self.alertmanager_url = url.clone();
        }
        if let Some(interval) = args.interval {
            self.interval_secs = interval;
        }
        if let Some(hours) = args.training_period {
            self.training_period_hours = hours;
        }
        if let Some(port) = args.api_port {
            self.api_port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline_config()
            .validate()
            .context("Invalid pipeline configuration")?;
        url::Url::parse(&self.prometheus_url).context("Invalid Prometheus URL")?;
        url::Url::parse(&self.alertmanager_url).context("Invalid Alertmanager URL")?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The subset the detection loop re-reads every iteration
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            interval: Duration::from_secs(self.interval_secs),
            training_period: Duration::from_secs(self.training_period_hours * 3600),
            recovery_interval: Duration::from_secs(self.recovery_interval_secs),
            forest: IsolationForestParams {
                n_trees: self.n_trees,
                max_samples: DEFAULT_MAX_SAMPLES,
                contamination: self.contamination,
                seed: self.seed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::load_with(None, env(&[])).unwrap();

        assert_eq!(config.prometheus_url, "http://localhost:9090");
        assert_eq!(config.alertmanager_url, "http://localhost:9093");
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.training_period_hours, 24);
        assert_eq!(config.recovery_interval_secs, 60);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_window, "5m");
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.pipeline_config().history_capacity(), 288);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_then_env_then_args() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
prometheus_url = "http://prom.internal:9090"
interval_secs = 60
contamination = 0.1
"#
        )
        .unwrap();

        let env = env(&[("NETSENTRY_INTERVAL_SECS", "120")]);
        let mut config = AgentConfig::load_with(Some(file.path()), env).unwrap();
        assert_eq!(config.prometheus_url, "http://prom.internal:9090");
        assert_eq!(config.interval_secs, 120);
        assert_eq!(config.contamination, 0.1);

        config.apply_args(&Args {
            interval: Some(30),
            training_period: Some(1),
            alertmanager_url: Some("http://am:9093".to_string()),
            ..Default::default()
        });
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.alertmanager_url, "http://am:9093");
        assert_eq!(config.pipeline_config().history_capacity(), 120);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result =
            AgentConfig::load_with(Some(Path::new("/nonexistent/netsentry.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AgentConfig::load_with(None, env(&[])).unwrap();
        config.interval_secs = 0;
        assert!(config.validate().is_err());

        config.interval_secs = 300;
        config.contamination = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = AgentConfig::load_with(None, env(&[])).unwrap();
        config.alertmanager_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_accept_underscore_flags() {
        let args = Args::parse_from([
            "netsentry",
            "--prometheus_url",
            "http://p:9090",
            "--training-period",
            "12",
            "--interval",
            "600",
        ]);
        assert_eq!(args.prometheus_url.as_deref(), Some("http://p:9090"));
        assert_eq!(args.training_period, Some(12));
        assert_eq!(args.interval, Some(600));
    }
}
