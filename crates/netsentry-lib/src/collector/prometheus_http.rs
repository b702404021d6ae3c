//! Prometheus HTTP API client
//!
//! Issues instant queries against `/api/v1/query` and converts the vector
//! result into [`RawSample`]s.

use super::{async_trait, MetricsQuery};
use crate::error::{CollectionError, CollectionResult};
use crate::models::RawSample;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const QUERY_PATH: &str = "api/v1/query";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: Vec<VectorSeries>,
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
}

/// Client for a Prometheus server
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
}

impl PrometheusClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = Url::parse(base_url).context("Invalid Prometheus URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base.join(QUERY_PATH).context("Invalid Prometheus URL")?;

        Ok(Self { client, query_url })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    fn decode(query: &str, body: QueryResponse) -> CollectionResult<Vec<RawSample>> {
        if body.status != "success" {
            return Err(CollectionError::Rejected {
                query: query.to_string(),
                message: format!(
                    "{}: {}",
                    body.error_type.unwrap_or_else(|| body.status.clone()),
                    body.error.unwrap_or_default()
                ),
            });
        }

        let data = body.data.ok_or_else(|| CollectionError::Decode {
            query: query.to_string(),
            message: "missing data".to_string(),
        })?;
        if data.result_type != "vector" {
            return Err(CollectionError::Decode {
                query: query.to_string(),
                message: format!("unexpected result type {}", data.result_type),
            });
        }

        data.result
            .into_iter()
            .map(|series| {
                let value = match series.value {
                    Some((ts, raw)) => {
                        let parsed = raw.parse::<f64>().map_err(|_| CollectionError::Decode {
                            query: query.to_string(),
                            message: format!("invalid sample value {:?}", raw),
                        })?;
                        Some((ts, parsed))
                    }
                    None => None,
                };
                let metric_name = series
                    .metric
                    .get("__name__")
                    .cloned()
                    .unwrap_or_else(|| query.to_string());
                Ok(RawSample::new(metric_name, series.metric, value))
            })
            .collect()
    }
}

#[async_trait]
impl MetricsQuery for PrometheusClient {
    async fn query(&self, query: &str) -> CollectionResult<Vec<RawSample>> {
        let transport = |source| CollectionError::Transport {
            query: query.to_string(),
            source,
        };

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", query)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectionError::Status {
                query: query.to_string(),
                status: status.as_u16(),
            });
        }

        let body: QueryResponse = response.json().await.map_err(|e| CollectionError::Decode {
            query: query.to_string(),
            message: e.to_string(),
        })?;

        Self::decode(query, body)
    }
}
